// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Configuration management for the engine.
//!
//! Configuration is loaded from multiple sources with the following priority
//! (later sources override earlier ones):
//!
//! 1. Built-in defaults
//! 2. biome.yaml file
//! 3. Environment variables (BIOME_*)
//! 4. CLI arguments

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::error::{Error, Result};
use crate::scheduler::FlushPolicy;

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Integrator numerics
    #[serde(default)]
    pub integrator: IntegratorConfig,

    /// Tick rate and batching
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Registry capacity limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from file and environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Self::from_file(config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Defaults overlaid with the YAML file, without environment overrides.
    ///
    /// A missing explicit path yields the defaults.
    pub fn from_file(config_path: Option<&Path>) -> Result<Self> {
        let mut config = EngineConfig::default();

        if let Some(path) = config_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                config = serde_yaml::from_str(&content)?;
            }
        } else {
            for path in &["biome.yaml", "biome.yml"] {
                let path = Path::new(path);
                if path.exists() {
                    let content = std::fs::read_to_string(path)?;
                    config = serde_yaml::from_str(&content)?;
                    break;
                }
            }
        }

        Ok(config)
    }

    /// Apply environment variable overrides. Unparseable values are ignored.
    fn apply_env_overrides(&mut self) {
        if let Some(v) = parsed_env("BIOME_MAX_SUBSTEP") {
            self.integrator.max_substep = v;
        }
        if let Some(v) = parsed_env("BIOME_EPSILON") {
            self.integrator.epsilon = v;
        }
        if let Some(v) = parsed_env("BIOME_TICK_HZ") {
            self.scheduler.tick_hz = v;
        }
        if let Some(v) = parsed_env("BIOME_MAX_PENDING") {
            self.scheduler.max_pending = v;
        }
        if let Some(v) = parsed_env("BIOME_WORKER_THREADS") {
            self.scheduler.worker_threads = v;
        }
        if let Ok(val) = env::var("BIOME_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = env::var("BIOME_LOG_FORMAT") {
            self.logging.format = val;
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        let i = &self.integrator;
        for (name, value) in [
            ("integrator.max_substep", i.max_substep),
            ("integrator.epsilon", i.epsilon),
            ("integrator.hard_tolerance", i.hard_tolerance),
            ("scheduler.tick_hz", self.scheduler.tick_hz),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::Config(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        if i.epsilon >= i.hard_tolerance {
            return Err(Error::Config(format!(
                "integrator.epsilon ({}) must be below integrator.hard_tolerance ({})",
                i.epsilon, i.hard_tolerance
            )));
        }
        if self.scheduler.max_pending == 0 {
            return Err(Error::Config("scheduler.max_pending cannot be 0".into()));
        }
        if self.scheduler.flush_every_ticks == 0 {
            return Err(Error::Config("scheduler.flush_every_ticks cannot be 0".into()));
        }
        if self.limits.max_systems == 0 {
            return Err(Error::Config("limits.max_systems cannot be 0".into()));
        }
        if !self.limits.max_dimension.is_power_of_two() {
            return Err(Error::Config(format!(
                "limits.max_dimension must be a power of two, got {}",
                self.limits.max_dimension
            )));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(Error::Config(format!(
                "logging.format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            )));
        }
        if self.scheduler.tick_hz > 1000.0 {
            tracing::warn!(
                tick_hz = self.scheduler.tick_hz,
                "Tick rate above 1 kHz; dispatch may not keep up"
            );
        }
        Ok(())
    }

    /// Render the effective configuration as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

fn parsed_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Integrator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegratorConfig {
    /// Largest RK4 sub-step in simulated time units
    #[serde(default = "default_max_substep")]
    pub max_substep: f64,

    /// Invariant drift repaired silently (ε)
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    /// Invariant violation treated as divergence
    #[serde(default = "default_hard_tolerance")]
    pub hard_tolerance: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            max_substep: default_max_substep(),
            epsilon: default_epsilon(),
            hard_tolerance: default_hard_tolerance(),
        }
    }
}

fn default_max_substep() -> f64 {
    0.02
}

fn default_epsilon() -> f64 {
    1e-6
}

fn default_hard_tolerance() -> f64 {
    1e-3
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Fixed tick rate in Hz
    #[serde(default = "default_tick_hz")]
    pub tick_hz: f64,

    /// Maximum distinct systems pending between dispatches
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,

    /// Dispatch every N ticks (1 = every tick)
    #[serde(default = "default_flush_every_ticks")]
    pub flush_every_ticks: u64,

    /// Integration worker threads (0 = one per core)
    #[serde(default)]
    pub worker_threads: usize,
}

impl SchedulerConfig {
    pub fn flush_policy(&self) -> FlushPolicy {
        match self.flush_every_ticks {
            0 | 1 => FlushPolicy::EveryTick,
            n => FlushPolicy::EveryNTicks(n),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            max_pending: default_max_pending(),
            flush_every_ticks: default_flush_every_ticks(),
            worker_threads: 0,
        }
    }
}

fn default_tick_hz() -> f64 {
    20.0
}

fn default_max_pending() -> usize {
    256
}

fn default_flush_every_ticks() -> u64 {
    1
}

/// Registry limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum Hilbert space dimension
    #[serde(default = "default_max_dimension")]
    pub max_dimension: usize,

    /// Maximum concurrently registered systems
    #[serde(default = "default_max_systems")]
    pub max_systems: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            max_systems: default_max_systems(),
        }
    }
}

fn default_max_dimension() -> usize {
    64
}

fn default_max_systems() -> usize {
    256
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}
