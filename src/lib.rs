// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Biome Engine
//!
//! Batched Lindblad evolution for many independent open quantum systems
//! ("biomes"), each advanced in simulated time at its own rate.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Host / presentation loop          │
//! │   submit(id, real_dt)   watch(epoch)     │
//! ├─────────────────────────────────────────┤
//! │   Registry (time scale, pending queue)   │
//! ├─────────────────────────────────────────┤
//! │   Scheduler (fixed tick, rayon batch)    │
//! ├─────────────────────────────────────────┤
//! │   Lindblad integrator (RK4 + repair)     │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`density`]: Density matrix type and invariant checks
//! - [`lindblad`]: Generator, integrator and state repair
//! - [`registry`]: System registry and time controller
//! - [`scheduler`]: Pending queue and batch dispatch
//! - [`driver`]: Fixed-rate tokio tick loop
//! - [`observables`]: Purity, Bloch vectors, entropies
//! - [`config`]: Configuration management
//! - [`validation`]: Input validation utilities
//! - [`error`]: Error types

pub mod config;
pub mod density;
pub mod driver;
pub mod error;
pub mod lindblad;
pub mod matrix;
pub mod observables;
pub mod registry;
pub mod scheduler;
pub mod validation;

pub use config::EngineConfig;
pub use density::DensityMatrix;
pub use error::{Error, Result};
pub use lindblad::{Dissipator, Dynamics, Integrator};
pub use registry::{Registry, SystemId, SystemSpec};
pub use scheduler::{FlushPolicy, Preview, Scheduler, TickReport};

#[cfg(test)]
pub mod test_utils;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
