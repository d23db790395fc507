// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fixed-rate tick driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::registry::Registry;
use crate::scheduler::Scheduler;

/// Tick period for a rate in hertz.
pub fn tick_period(tick_hz: f64) -> Result<Duration> {
    if !tick_hz.is_finite() || tick_hz <= 0.0 {
        return Err(Error::Config(format!(
            "tick_hz must be finite and > 0, got {tick_hz}"
        )));
    }
    Ok(Duration::from_secs_f64(1.0 / tick_hz))
}

/// Call [`Scheduler::tick`] every `1 / tick_hz` seconds until `shutdown`
/// becomes `true` or its sender is dropped.
///
/// Late ticks are skipped rather than bursted. Integration runs on the
/// blocking pool so the runtime stays responsive. Returns the number of
/// ticks driven.
pub async fn run_fixed_rate(
    scheduler: Arc<Scheduler>,
    registry: Arc<Registry>,
    tick_hz: f64,
    mut shutdown: watch::Receiver<bool>,
) -> Result<u64> {
    let period = tick_period(tick_hz)?;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(tick_hz, period_ms = period.as_secs_f64() * 1e3, "Starting tick driver");

    let mut driven = 0u64;
    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                let scheduler = Arc::clone(&scheduler);
                let registry = Arc::clone(&registry);
                let report = tokio::task::spawn_blocking(move || scheduler.tick(&registry))
                    .await
                    .map_err(|e| Error::Io(std::io::Error::other(e)))?;
                driven += 1;
                if report.elapsed > period {
                    warn!(
                        tick = report.tick,
                        elapsed_ms = report.elapsed.as_secs_f64() * 1e3,
                        "Tick overran its period"
                    );
                }
                debug!(tick = report.tick, epoch = report.epoch, "Tick");
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!(ticks = driven, "Tick driver stopped");
    Ok(driven)
}
