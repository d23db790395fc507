// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Dense complex matrix core.
//!
//! Every routine here is deterministic and side-effect free. Binary
//! operations check operand shapes and report
//! [`ValidationError::DimensionMismatch`] instead of panicking; shapes are
//! otherwise fixed at registration time, so a mismatch always indicates a
//! programmer error upstream.
//!
//! - [`eigh`]: Hermitian eigen-decomposition (cyclic complex Jacobi)
//! - [`matrix_exp`]: scaling-and-squaring with Padé(13)
//! - [`unitary_propagator`]: exp(−iHΔt) for Hermitian H

pub mod eigen;
pub mod expm;

use ndarray::Array2;
use num_complex::Complex64;

use crate::error::{Result, ValidationError};

pub use eigen::{eigh, HermitianEigen};
pub use expm::{matrix_exp, unitary_propagator};

/// Complex zero.
pub const ZERO: Complex64 = Complex64::new(0.0, 0.0);
/// Complex one.
pub const ONE: Complex64 = Complex64::new(1.0, 0.0);
/// Imaginary unit.
pub const I: Complex64 = Complex64::new(0.0, 1.0);

/// Return the dimension of a square matrix, or a mismatch error naming `operation`.
pub fn ensure_square(operation: &str, a: &Array2<Complex64>) -> Result<usize> {
    let (rows, cols) = a.dim();
    if rows != cols {
        return Err(ValidationError::mismatch(operation, (rows, rows), (rows, cols)).into());
    }
    Ok(rows)
}

fn ensure_same_shape(
    operation: &str,
    a: &Array2<Complex64>,
    b: &Array2<Complex64>,
) -> Result<usize> {
    let n = ensure_square(operation, a)?;
    if b.dim() != (n, n) {
        return Err(ValidationError::mismatch(operation, (n, n), b.dim()).into());
    }
    Ok(n)
}

/// Identity matrix of size `n`.
pub fn identity(n: usize) -> Array2<Complex64> {
    Array2::from_diag_elem(n, ONE)
}

/// Matrix product `AB`.
pub fn multiply(a: &Array2<Complex64>, b: &Array2<Complex64>) -> Result<Array2<Complex64>> {
    if a.ncols() != b.nrows() {
        return Err(ValidationError::mismatch(
            "multiply",
            (a.ncols(), b.ncols()),
            b.dim(),
        )
        .into());
    }
    Ok(a.dot(b))
}

/// Conjugate transpose A†.
pub fn adjoint(a: &Array2<Complex64>) -> Array2<Complex64> {
    a.t().mapv(|z| z.conj())
}

/// Commutator `[A, B] = AB − BA`.
pub fn commutator(a: &Array2<Complex64>, b: &Array2<Complex64>) -> Result<Array2<Complex64>> {
    ensure_same_shape("commutator", a, b)?;
    Ok(a.dot(b) - b.dot(a))
}

/// Anticommutator `{A, B} = AB + BA`.
pub fn anticommutator(
    a: &Array2<Complex64>,
    b: &Array2<Complex64>,
) -> Result<Array2<Complex64>> {
    ensure_same_shape("anticommutator", a, b)?;
    Ok(a.dot(b) + b.dot(a))
}

/// Trace of a square matrix.
pub fn trace(a: &Array2<Complex64>) -> Result<Complex64> {
    ensure_square("trace", a)?;
    Ok(a.diag().sum())
}

/// Frobenius norm ‖A‖_F = sqrt(Σ |a_ij|²).
pub fn frobenius_norm(a: &Array2<Complex64>) -> f64 {
    a.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt()
}

/// Spectral (operator 2-) norm: the largest singular value of A,
/// obtained as sqrt(λ_max(A†A)).
pub fn operator_norm(a: &Array2<Complex64>) -> Result<f64> {
    ensure_square("operator_norm", a)?;
    if a.is_empty() {
        return Ok(0.0);
    }
    let gram = adjoint(a).dot(a);
    let eig = eigh(&gram)?;
    let largest = eig.values.iter().cloned().fold(0.0_f64, f64::max);
    Ok(largest.max(0.0).sqrt())
}

/// Frobenius distance from Hermiticity, ‖A − A†‖_F.
pub fn hermitian_defect(a: &Array2<Complex64>) -> Result<f64> {
    ensure_square("hermitian_defect", a)?;
    Ok(frobenius_norm(&(a - &adjoint(a))))
}

/// Whether `a` is square and Hermitian within `tolerance` (Frobenius).
pub fn is_hermitian(a: &Array2<Complex64>, tolerance: f64) -> bool {
    hermitian_defect(a).map(|d| d <= tolerance).unwrap_or(false)
}

/// Hermitian part (A + A†)/2.
pub fn hermitian_part(a: &Array2<Complex64>) -> Array2<Complex64> {
    (a + &adjoint(a)) * Complex64::new(0.5, 0.0)
}

/// Kronecker (tensor) product A ⊗ B.
pub fn kron(a: &Array2<Complex64>, b: &Array2<Complex64>) -> Array2<Complex64> {
    let (ar, ac) = a.dim();
    let (br, bc) = b.dim();
    let mut out = Array2::zeros((ar * br, ac * bc));
    for ((i, j), &aij) in a.indexed_iter() {
        if aij == ZERO {
            continue;
        }
        for ((k, l), &bkl) in b.indexed_iter() {
            out[[i * br + k, j * bc + l]] = aij * bkl;
        }
    }
    out
}
