// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Single-system Lindblad evolution.
//!
//! Implements the Gorini–Kossakowski–Sudarshan–Lindblad (GKSL) master equation:
//!
//!   dρ/dt = −i[H, ρ] + Σ_k γ_k (L_k ρ L_k† − ½{L_k†L_k, ρ})
//!
//! This module provides:
//! - [`Dissipator`] channels (lowering, per-qubit damping and dephasing, sparse)
//! - [`Dynamics`], the closed/open variant resolved once at registration
//! - [`Integrator`], sub-stepped RK4 with invariant repair after every sub-step
//!
//! # Example
//!
//! ```
//! use biome_engine::density::DensityMatrix;
//! use biome_engine::lindblad::{Dissipator, Dynamics, Integrator};
//! use ndarray::Array2;
//!
//! let damping = Dissipator::lowering(4, 1.0).unwrap();
//! let dynamics = Dynamics::new(Array2::zeros((4, 4)), &[damping]).unwrap();
//! let top = DensityMatrix::basis(4, 3).unwrap();
//!
//! let out = Integrator::default().advance(&top, &dynamics, 0.5).unwrap();
//! assert_eq!(out.substeps, 25);
//! assert!(out.state.population(3) < 1.0);
//! ```
//!
//! # References
//!
//! - Lindblad, G. (1976). Commun. Math. Phys. 48, 119.
//!   DOI: 10.1007/BF01608499
//! - Gorini, V., Kossakowski, A., & Sudarshan, E. C. G. (1976). J. Math. Phys. 17, 821.
//!   DOI: 10.1063/1.522979
//! - Breuer, H.-P. & Petruccione, F. (2002). "The Theory of Open Quantum Systems." Oxford.

pub mod generator;
pub mod integrate;
pub mod repair;
pub mod types;

pub use generator::lindblad_rhs;
pub use integrate::{evolve_unitary, Evolution, Integrator, StepError};
pub use repair::{Divergence, RepairStats};
pub use types::{embed_qubit_operator, CachedDissipator, Dissipator, Dynamics};
