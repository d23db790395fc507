// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Density matrix state type.
//!
//! A [`DensityMatrix`] is a d×d complex matrix that is Hermitian, has unit
//! trace, and is positive semidefinite within a tolerance. Constructors
//! that accept caller data validate these invariants; the integrator is the
//! only code that builds states without re-validating, and it repairs them
//! after every sub-step instead.

use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::matrix::{self, ONE};

/// Default invariant tolerance ε.
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// A validated quantum state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityMatrix {
    matrix: Array2<Complex64>,
}

/// Measured distance of a matrix from the density-matrix invariants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InvariantReport {
    /// |Tr ρ − 1| (including any imaginary part)
    pub trace_error: f64,
    /// ‖ρ − ρ†‖_F
    pub hermitian_defect: f64,
    /// Smallest eigenvalue of the Hermitian part
    pub min_eigenvalue: f64,
}

impl InvariantReport {
    /// Whether every invariant holds within `tolerance`.
    pub fn holds(&self, tolerance: f64) -> bool {
        self.trace_error < tolerance
            && self.hermitian_defect < tolerance
            && self.min_eigenvalue >= -tolerance
    }
}

impl DensityMatrix {
    /// Pure state |k⟩⟨k| in a `dim`-dimensional space.
    pub fn basis(dim: usize, k: usize) -> Result<Self> {
        if k >= dim {
            return Err(ValidationError::Field {
                field: "basis_index".into(),
                message: format!("index {k} out of range for dimension {dim}"),
            }
            .into());
        }
        let mut m = Array2::zeros((dim, dim));
        m[[k, k]] = ONE;
        Ok(Self { matrix: m })
    }

    /// Ground state |0⟩⟨0|, the default initial state.
    pub fn ground(dim: usize) -> Self {
        let mut m = Array2::zeros((dim, dim));
        if dim > 0 {
            m[[0, 0]] = ONE;
        }
        Self { matrix: m }
    }

    /// Maximally mixed state I/d.
    pub fn maximally_mixed(dim: usize) -> Self {
        let p = Complex64::new(1.0 / dim.max(1) as f64, 0.0);
        Self {
            matrix: Array2::from_diag_elem(dim, p),
        }
    }

    /// Pure state |ψ⟩⟨ψ| from (not necessarily normalized) amplitudes.
    pub fn from_pure(amplitudes: &[Complex64]) -> Result<Self> {
        let norm_sqr: f64 = amplitudes.iter().map(|a| a.norm_sqr()).sum();
        if !(norm_sqr.is_finite() && norm_sqr > 0.0) {
            return Err(ValidationError::InvalidState("state vector has zero norm".into()).into());
        }
        let n = amplitudes.len();
        let matrix = Array2::from_shape_fn((n, n), |(i, j)| {
            amplitudes[i] * amplitudes[j].conj() / norm_sqr
        });
        Ok(Self { matrix })
    }

    /// Wrap a caller-supplied matrix, validating it at [`DEFAULT_EPSILON`].
    pub fn from_matrix(matrix: Array2<Complex64>) -> Result<Self> {
        Self::from_matrix_with_tolerance(matrix, DEFAULT_EPSILON)
    }

    /// Wrap a caller-supplied matrix, validating it at `tolerance`.
    pub fn from_matrix_with_tolerance(matrix: Array2<Complex64>, tolerance: f64) -> Result<Self> {
        matrix::ensure_square("density matrix", &matrix)?;
        if matrix.iter().any(|z| !(z.re.is_finite() && z.im.is_finite())) {
            return Err(ValidationError::InvalidState("non-finite entry".into()).into());
        }
        let state = Self { matrix };
        let report = state.invariants()?;
        if !report.holds(tolerance) {
            return Err(ValidationError::InvalidState(format!(
                "trace error {:.3e}, Hermitian defect {:.3e}, min eigenvalue {:.3e}",
                report.trace_error, report.hermitian_defect, report.min_eigenvalue
            ))
            .into());
        }
        Ok(state)
    }

    /// Wrap an integrator result without validation.
    pub(crate) fn from_repaired(matrix: Array2<Complex64>) -> Self {
        Self { matrix }
    }

    /// Hilbert-space dimension d.
    pub fn dim(&self) -> usize {
        self.matrix.nrows()
    }

    /// Qubit count log2(d), if d is a power of two.
    pub fn num_qubits(&self) -> Option<usize> {
        let d = self.dim();
        d.is_power_of_two().then(|| d.trailing_zeros() as usize)
    }

    /// Borrow the underlying matrix.
    pub fn as_array(&self) -> &Array2<Complex64> {
        &self.matrix
    }

    /// Consume into the underlying matrix.
    pub fn into_array(self) -> Array2<Complex64> {
        self.matrix
    }

    /// Tr ρ.
    pub fn trace(&self) -> Complex64 {
        self.matrix.diag().sum()
    }

    /// Purity Tr(ρ²); 1 for pure states, 1/d for the maximally mixed state.
    pub fn purity(&self) -> f64 {
        // Tr(ρ²) = Σ_ij |ρ_ij|² for Hermitian ρ
        self.matrix.iter().map(|z| z.norm_sqr()).sum()
    }

    /// Diagonal populations ρ_kk.
    pub fn populations(&self) -> Vec<f64> {
        self.matrix.diag().iter().map(|z| z.re).collect()
    }

    /// Population of basis state |k⟩ (0.0 if out of range).
    pub fn population(&self, k: usize) -> f64 {
        self.matrix.get((k, k)).map(|z| z.re).unwrap_or(0.0)
    }

    /// Largest off-diagonal magnitude |ρ_ij|, i ≠ j.
    pub fn max_coherence(&self) -> f64 {
        self.matrix
            .indexed_iter()
            .filter(|((i, j), _)| i != j)
            .map(|(_, z)| z.norm())
            .fold(0.0, f64::max)
    }

    /// Measure the invariants.
    pub fn invariants(&self) -> Result<InvariantReport> {
        let tr = self.trace();
        let eig = matrix::eigh(&self.matrix)?;
        Ok(InvariantReport {
            trace_error: (tr - ONE).norm(),
            hermitian_defect: matrix::hermitian_defect(&self.matrix)?,
            min_eigenvalue: eig.min_value(),
        })
    }

    /// Check the invariants at `tolerance`.
    pub fn validate(&self, tolerance: f64) -> Result<()> {
        let report = self.invariants()?;
        if report.holds(tolerance) {
            Ok(())
        } else {
            Err(ValidationError::InvalidState(format!("{report:?}")).into())
        }
    }
}

impl Default for DensityMatrix {
    fn default() -> Self {
        Self::ground(2)
    }
}

impl From<DensityMatrix> for Array2<Complex64> {
    fn from(state: DensityMatrix) -> Self {
        state.matrix
    }
}
