// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Hermitian eigen-decomposition by cyclic complex Jacobi rotations.
//!
//! Each rotation first removes the phase of the pivot element with a
//! diagonal unitary, then applies the real symmetric Jacobi rotation.
//! Quadratic convergence makes a handful of sweeps sufficient for the
//! dimensions this engine handles (d ≤ 64).
//!
//! Ref: Golub & Van Loan, "Matrix Computations" (2013), §8.5.

use ndarray::{Array1, Array2};
use num_complex::Complex64;

use super::{adjoint, ensure_square, frobenius_norm, hermitian_part, identity, ZERO};
use crate::error::{Error, Result};

const MAX_SWEEPS: usize = 64;
const JACOBI_TOLERANCE: f64 = 1e-15;

/// Eigen-decomposition A = V diag(λ) V† of a Hermitian matrix.
#[derive(Debug, Clone)]
pub struct HermitianEigen {
    /// Real eigenvalues, ascending.
    pub values: Array1<f64>,
    /// Orthonormal eigenvectors stored as columns, in the order of `values`.
    pub vectors: Array2<Complex64>,
}

impl HermitianEigen {
    /// Rebuild V diag(values) V† with replacement eigenvalues.
    pub fn compose(&self, values: &Array1<f64>) -> Array2<Complex64> {
        let mut scaled = self.vectors.clone();
        for (mut column, &lambda) in scaled.columns_mut().into_iter().zip(values.iter()) {
            column.mapv_inplace(|z| z * lambda);
        }
        scaled.dot(&adjoint(&self.vectors))
    }

    /// Rebuild the decomposed matrix.
    pub fn reconstruct(&self) -> Array2<Complex64> {
        self.compose(&self.values)
    }

    /// Smallest eigenvalue (0.0 for an empty matrix).
    pub fn min_value(&self) -> f64 {
        self.values.get(0).copied().unwrap_or(0.0)
    }
}

/// Eigen-decompose a Hermitian matrix.
///
/// Only the Hermitian part (A + A†)/2 is used. Eigenvalues are returned in
/// ascending order; equal eigenvalues keep the order in which the sweeps
/// produced them, which callers must not rely on.
pub fn eigh(a: &Array2<Complex64>) -> Result<HermitianEigen> {
    let n = ensure_square("eigh", a)?;
    let mut m = hermitian_part(a);
    let mut v = identity(n);

    let scale = frobenius_norm(&m);
    let mut converged = n < 2;
    for _ in 0..MAX_SWEEPS {
        if off_diagonal_norm(&m) <= JACOBI_TOLERANCE * scale {
            converged = true;
            break;
        }
        for p in 0..n {
            for q in (p + 1)..n {
                rotate(&mut m, &mut v, p, q);
            }
        }
    }
    if !converged && off_diagonal_norm(&m) > 1e-10 * scale {
        return Err(Error::Numerical(format!(
            "Jacobi eigensolver did not converge in {MAX_SWEEPS} sweeps (n = {n})"
        )));
    }

    let raw: Vec<f64> = (0..n).map(|i| m[[i, i]].re).collect();
    let mut order: Vec<usize> = (0..n).collect();
    // Stable sort: ties keep sweep order.
    order.sort_by(|&i, &j| raw[i].total_cmp(&raw[j]));

    let values = Array1::from_iter(order.iter().map(|&i| raw[i]));
    let mut vectors = Array2::zeros((n, n));
    for (dst, &src) in order.iter().enumerate() {
        vectors.column_mut(dst).assign(&v.column(src));
    }
    Ok(HermitianEigen { values, vectors })
}

/// Apply one Jacobi rotation annihilating m[p, q].
fn rotate(m: &mut Array2<Complex64>, v: &mut Array2<Complex64>, p: usize, q: usize) {
    let apq = m[[p, q]];
    let r = apq.norm();
    if r == 0.0 {
        return;
    }
    let n = m.nrows();
    let phase = (apq / r).conj();
    let theta = (m[[q, q]].re - m[[p, p]].re) / (2.0 * r);
    let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
    let c = 1.0 / (t * t + 1.0).sqrt();
    let s = t * c;

    // G = diag(1, e^{-iφ}) · [[c, s], [-s, c]] on the (p, q) plane.
    let gpp = Complex64::new(c, 0.0);
    let gpq = Complex64::new(s, 0.0);
    let gqp = phase * -s;
    let gqq = phase * c;

    for k in 0..n {
        let (mkp, mkq) = (m[[k, p]], m[[k, q]]);
        m[[k, p]] = mkp * gpp + mkq * gqp;
        m[[k, q]] = mkp * gpq + mkq * gqq;
    }
    for k in 0..n {
        let (mpk, mqk) = (m[[p, k]], m[[q, k]]);
        m[[p, k]] = gpp.conj() * mpk + gqp.conj() * mqk;
        m[[q, k]] = gpq.conj() * mpk + gqq.conj() * mqk;
    }
    m[[p, q]] = ZERO;
    m[[q, p]] = ZERO;
    m[[p, p]].im = 0.0;
    m[[q, q]].im = 0.0;

    for k in 0..n {
        let (vkp, vkq) = (v[[k, p]], v[[k, q]]);
        v[[k, p]] = vkp * gpp + vkq * gqp;
        v[[k, q]] = vkp * gpq + vkq * gqq;
    }
}

fn off_diagonal_norm(m: &Array2<Complex64>) -> f64 {
    m.indexed_iter()
        .filter(|((i, j), _)| i != j)
        .map(|(_, z)| z.norm_sqr())
        .sum::<f64>()
        .sqrt()
}
