// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Post-step invariant repair and divergence detection.
//!
//! Every RK4 sub-step is followed by [`repair`]: Hermitize, renormalize the
//! trace when it drifts beyond ε, and clip eigenvalues below −ε. Violations
//! too large to repair (beyond the hard tolerance) are reported as a
//! [`Divergence`] instead.

use std::fmt;

use ndarray::{Array1, Array2};
use num_complex::Complex64;
use tracing::trace;

use crate::matrix::{eigh, hermitian_defect, hermitian_part};

/// A fatal invariant violation in one sub-step.
#[derive(Debug, Clone, PartialEq)]
pub struct Divergence {
    /// Zero-based sub-step index within the current advance.
    pub substep: usize,
    pub reason: String,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-step {}: {}", self.substep, self.reason)
    }
}

impl std::error::Error for Divergence {}

/// Which repairs a sub-step needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairStats {
    /// Sub-steps whose trace drifted beyond ε.
    pub trace_renormalized: usize,
    /// Sub-steps with eigenvalues below −ε.
    pub eigenvalues_clipped: usize,
}

impl RepairStats {
    pub fn merge(&mut self, other: RepairStats) {
        self.trace_renormalized += other.trace_renormalized;
        self.eigenvalues_clipped += other.eigenvalues_clipped;
    }

    pub fn total(&self) -> usize {
        self.trace_renormalized + self.eigenvalues_clipped
    }
}

/// Tolerances used by [`repair`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    /// Drift ε repaired silently.
    pub epsilon: f64,
    /// Violations beyond this are divergence.
    pub hard: f64,
}

/// Repair `rho` in place after a sub-step.
///
/// On success the matrix is Hermitian, has unit trace within ε, and has no
/// eigenvalue below −ε. Returns the repairs applied, or the reason the state
/// could not be repaired.
pub fn repair(
    rho: &mut Array2<Complex64>,
    tol: Tolerances,
) -> std::result::Result<RepairStats, String> {
    let mut stats = RepairStats::default();

    if rho.iter().any(|z| !(z.re.is_finite() && z.im.is_finite())) {
        return Err("non-finite matrix entry".into());
    }

    let defect = hermitian_defect(rho).map_err(|e| e.to_string())?;
    if defect > tol.hard {
        return Err(format!(
            "Hermiticity defect {defect:.3e} exceeds {:.1e}",
            tol.hard
        ));
    }
    *rho = hermitian_part(rho);

    // Hermitian, so the trace is real up to rounding
    let tr = rho.diag().sum();
    if tr.im.abs() > tol.hard || tr.re <= tol.hard {
        return Err(format!("trace {tr} cannot be renormalized"));
    }
    if (tr.re - 1.0).abs() > tol.epsilon {
        trace!(trace = tr.re, "renormalizing trace");
        rho.mapv_inplace(|z| z / tr.re);
        stats.trace_renormalized += 1;
    }

    let eig = eigh(rho).map_err(|e| e.to_string())?;
    let min = eig.min_value();
    if min < -tol.epsilon {
        trace!(min_eigenvalue = min, "clipping negative eigenvalues");
        let clipped: Array1<f64> = eig.values.mapv(|v| v.max(0.0));
        let total = clipped.sum();
        if !(total > tol.hard) {
            return Err(format!("no positive spectrum left after clipping (sum {total:.3e})"));
        }
        *rho = hermitian_part(&eig.compose(&(clipped / total)));
        stats.eigenvalues_clipped += 1;
    }

    let residual = (rho.diag().sum().re - 1.0).abs();
    if !(residual <= tol.hard) {
        return Err(format!("trace error {residual:.3e} after repair"));
    }
    Ok(stats)
}
