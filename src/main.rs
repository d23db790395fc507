// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Biome Engine CLI
//!
//! Drives a demo set of biomes at a fixed tick rate and reports their
//! observables as new epochs are published.
//!
//! # Usage
//!
//! ```bash
//! # Run the demo for 100 ticks
//! biome-engine run --ticks 100
//!
//! # Run with custom config and write final snapshots
//! biome-engine run --config biome.yaml --snapshot biomes.json
//!
//! # Show effective configuration
//! biome-engine config
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use ndarray::Array2;
use num_complex::Complex64;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use biome_engine::lindblad::{embed_qubit_operator, Dissipator};
use biome_engine::observables::Observables;
use biome_engine::{
    driver, DensityMatrix, EngineConfig, Registry, Result, Scheduler, SystemId, SystemSpec,
    VERSION,
};

/// Batched Lindblad evolution engine
#[derive(Parser)]
#[command(name = "biome-engine")]
#[command(author = "Biome Engine Contributors")]
#[command(version = VERSION)]
#[command(about = "Batched Lindblad evolution for many independent quantum systems")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the demo biomes
    Run {
        /// Number of ticks to drive
        #[arg(long, default_value_t = 100)]
        ticks: u64,

        /// Tick rate override (Hz)
        #[arg(long, env = "BIOME_TICK_HZ")]
        tick_hz: Option<f64>,

        /// Write final snapshots as JSON
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Show effective configuration
    Config,

    /// Validate configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = EngineConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    init_logging(&config.logging.level, &config.logging.format);

    match cli.command {
        Commands::Run {
            ticks,
            tick_hz,
            snapshot,
        } => {
            if let Some(hz) = tick_hz {
                config.scheduler.tick_hz = hz;
            }
            config.validate()?;
            run(&config, ticks, snapshot.as_deref()).await?;
        }

        Commands::Config => {
            println!("{}", config.to_yaml()?);
        }

        Commands::Validate => match config.validate() {
            Ok(()) => {
                println!("Configuration is valid");
            }
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}

/// Initialize logging with tracing.
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

async fn run(config: &EngineConfig, ticks: u64, snapshot: Option<&Path>) -> Result<()> {
    let registry = Arc::new(Registry::new(config)?);
    let scheduler = Arc::new(Scheduler::new(&config.scheduler)?);
    let ids = register_demo(&registry)?;

    info!(
        version = VERSION,
        systems = ids.len(),
        tick_hz = config.scheduler.tick_hz,
        ticks,
        "Starting biome engine"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let ctrl_c_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received shutdown signal");
            let _ = ctrl_c_tx.send(true);
        }
    });

    let presenter = tokio::spawn(present(
        Arc::clone(&registry),
        ids.clone(),
        shutdown_rx.clone(),
    ));

    let driver = tokio::spawn(driver::run_fixed_rate(
        Arc::clone(&scheduler),
        Arc::clone(&registry),
        config.scheduler.tick_hz,
        shutdown_rx.clone(),
    ));

    // Host loop: one frame of real time per tick for every biome.
    let period = driver::tick_period(config.scheduler.tick_hz)?;
    let mut frames = tokio::time::interval(period);
    let mut stop = shutdown_rx;
    for _ in 0..ticks {
        tokio::select! {
            _ = frames.tick() => {
                for id in &ids {
                    registry.submit(*id, period.as_secs_f64())?;
                }
            }
            _ = stop.changed() => break,
        }
    }
    frames.tick().await;
    let _ = shutdown_tx.send(true);

    match driver.await {
        Ok(Ok(driven)) => info!(ticks = driven, epoch = registry.epoch(), "Driver finished"),
        Ok(Err(e)) => error!(error = %e, "Driver failed"),
        Err(e) => error!(error = %e, "Driver task panicked"),
    }
    let _ = presenter.await;

    for id in &ids {
        let info = registry.info(*id)?;
        let obs = registry.observables(*id)?;
        println!(
            "{} d={} scale={} t={:.3} purity={:.4} status={:?}",
            info.id, info.dimension, info.time_scale, info.simulated_time, obs.purity, info.status
        );
    }

    for (id, preview) in scheduler.lookahead_all(&registry, period.as_secs_f64(), 5)? {
        match preview {
            Ok(p) => info!(
                system = %id,
                steps = p.frames.len(),
                purity = p.observables.purity,
                mutual_information = ?p.observables.mutual_information,
                "Lookahead"
            ),
            Err(e) => error!(system = %id, error = %e, "Lookahead failed"),
        }
    }

    if let Some(path) = snapshot {
        let json = serde_json::to_string_pretty(&registry.snapshot_all())?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "Wrote snapshots");
    }

    Ok(())
}

/// Log observables for each biome whenever a new epoch is published.
async fn present(registry: Arc<Registry>, ids: Vec<SystemId>, mut shutdown: watch::Receiver<bool>) {
    let mut ready = registry.subscribe();
    loop {
        tokio::select! {
            changed = ready.changed() => {
                if changed.is_err() {
                    break;
                }
                let epoch = *ready.borrow_and_update();
                for id in &ids {
                    match registry.observables(*id) {
                        Ok(Observables { populations, purity, .. }) => {
                            info!(epoch, system = %id, purity, ?populations, "Observables");
                        }
                        Err(e) => error!(system = %id, error = %e, "Observables unavailable"),
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Register the demo set: a driven qubit, a damped ladder, and a dephasing
/// qubit pair running at double speed.
fn register_demo(registry: &Registry) -> Result<Vec<SystemId>> {
    let half = Complex64::new(0.5, 0.0);
    let sigma_x = Array2::from_shape_vec(
        (2, 2),
        vec![Complex64::new(0.0, 0.0), half, half, Complex64::new(0.0, 0.0)],
    )
    .map_err(|e| biome_engine::Error::Config(e.to_string()))?;

    let rabi = registry.register(SystemSpec::new(2, sigma_x.clone()))?;

    let ladder = Array2::from_diag(&ndarray::Array1::from_iter(
        (0..4).map(|n| Complex64::new(n as f64, 0.0)),
    ));
    let damped = registry.register(
        SystemSpec::new(4, ladder)
            .with_dissipator(Dissipator::lowering(4, 0.5)?)
            .with_initial_state(DensityMatrix::basis(4, 3)?),
    )?;

    let coupling = embed_qubit_operator(&sigma_x, 2, 0)? + embed_qubit_operator(&sigma_x, 2, 1)?;
    let pair = registry.register(
        SystemSpec::new(4, coupling)
            .with_dissipator(Dissipator::qubit_dephasing(2, 0, 0.2)?)
            .with_dissipator(Dissipator::qubit_damping(2, 1, 0.1)?)
            .with_time_scale(2.0),
    )?;

    Ok(vec![rabi, damped, pair])
}
