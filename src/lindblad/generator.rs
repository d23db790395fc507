// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Lindblad generator 𝓛(ρ).
//!
//! Computes dρ/dt = −i[H, ρ] + Σₖ γₖ (Lₖ ρ Lₖ† − ½{Lₖ†Lₖ, ρ}) using the
//! L† and L†L cached in [`Dynamics::Open`].
//!
//! Ref: Breuer & Petruccione, "The Theory of Open Quantum Systems" (2002), Ch. 3.

use ndarray::Array2;
use num_complex::Complex64;

use super::types::{CachedDissipator, Dynamics};
use crate::error::Result;
use crate::matrix::{anticommutator, commutator, multiply, I};

/// Contribution of a single dissipator:
///
/// D[L](ρ) = γ (L ρ L† − ½ L†L ρ − ½ ρ L†L)
pub fn dissipator_term(op: &CachedDissipator, rho: &Array2<Complex64>) -> Result<Array2<Complex64>> {
    if op.rate == 0.0 {
        return Ok(Array2::zeros(rho.raw_dim()));
    }
    let jump = multiply(&multiply(&op.l, rho)?, &op.l_dag)?;
    let decay = anticommutator(&op.l_dag_l, rho)?;
    Ok((jump - decay * Complex64::new(0.5, 0.0)) * Complex64::new(op.rate, 0.0))
}

/// Full generator 𝓛(ρ) for the given dynamics.
pub fn lindblad_rhs(dynamics: &Dynamics, rho: &Array2<Complex64>) -> Result<Array2<Complex64>> {
    // −i[H, ρ]
    let mut drho = commutator(dynamics.hamiltonian(), rho)? * -I;
    if let Dynamics::Open { dissipators, .. } = dynamics {
        for op in dissipators {
            drho += &dissipator_term(op, rho)?;
        }
    }
    Ok(drho)
}
