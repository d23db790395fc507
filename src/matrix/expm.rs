// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Matrix exponential via scaling-and-squaring with Padé(13) approximation,
//! and unitary propagators for Hermitian generators.
//!
//! Ref: Higham (2005), "The Scaling and Squaring Method for the Matrix
//! Exponential Revisited", SIAM J. Matrix Anal. Appl. 26(4), 1179.

use ndarray::{Array1, Array2};
use num_complex::Complex64;

use super::{eigh, ensure_square, identity, ZERO};
use crate::error::{Error, Result};

/// Largest 1-norm for which Padé(13) is used without scaling (Higham Table 10.2).
const THETA_13: f64 = 5.371_920_351_148_152;

/// Padé(13,13) numerator coefficients b_0..b_13.
const PADE_13: [f64; 14] = [
    64_764_752_532_480_000.0,
    32_382_376_266_240_000.0,
    7_771_770_303_897_600.0,
    1_187_353_796_428_800.0,
    129_060_195_264_000.0,
    10_559_470_521_600.0,
    670_442_572_800.0,
    33_522_128_640.0,
    1_323_241_920.0,
    40_840_800.0,
    960_960.0,
    16_380.0,
    182.0,
    1.0,
];

/// Compute exp(A) for a square complex matrix.
///
/// Accurate to ~1e-13 relative error in the unscaled regime (‖A‖₁ ≤ θ₁₃);
/// larger norms are scaled by 2^-s and squared back.
pub fn matrix_exp(a: &Array2<Complex64>) -> Result<Array2<Complex64>> {
    let n = ensure_square("matrix_exp", a)?;
    match n {
        0 => return Ok(Array2::zeros((0, 0))),
        1 => return Ok(Array2::from_elem((1, 1), a[[0, 0]].exp())),
        _ => {}
    }

    let norm = one_norm(a);
    if !norm.is_finite() {
        return Err(Error::Numerical("matrix_exp of non-finite matrix".into()));
    }
    let squarings = if norm > THETA_13 {
        (norm / THETA_13).log2().ceil() as i32
    } else {
        0
    };

    let scaled = a * Complex64::new(2f64.powi(-squarings), 0.0);
    let mut result = pade13(&scaled)?;
    for _ in 0..squarings {
        result = result.dot(&result);
    }
    Ok(result)
}

/// Unitary propagator U = exp(−iHΔt) for a Hermitian generator H.
///
/// Built from the eigen-decomposition H = V diag(λ) V†, which keeps U
/// unitary to machine precision for any Δt.
pub fn unitary_propagator(hamiltonian: &Array2<Complex64>, dt: f64) -> Result<Array2<Complex64>> {
    let eig = eigh(hamiltonian)?;
    let phases: Array1<Complex64> = eig
        .values
        .mapv(|lambda| Complex64::new(0.0, -lambda * dt).exp());
    let mut scaled = eig.vectors.clone();
    for (mut column, &phase) in scaled.columns_mut().into_iter().zip(phases.iter()) {
        column.mapv_inplace(|z| z * phase);
    }
    Ok(scaled.dot(&super::adjoint(&eig.vectors)))
}

fn pade13(a: &Array2<Complex64>) -> Result<Array2<Complex64>> {
    let n = a.nrows();
    let eye = identity(n);
    let b = |k: usize| Complex64::new(PADE_13[k], 0.0);

    let a2 = a.dot(a);
    let a4 = a2.dot(&a2);
    let a6 = a2.dot(&a4);

    // U = A [A6 (b13 A6 + b11 A4 + b9 A2) + b7 A6 + b5 A4 + b3 A2 + b1 I]
    let u_inner = &a6 * b(13) + &a4 * b(11) + &a2 * b(9);
    let u = a.dot(&(a6.dot(&u_inner) + &a6 * b(7) + &a4 * b(5) + &a2 * b(3) + &eye * b(1)));

    // V = A6 (b12 A6 + b10 A4 + b8 A2) + b6 A6 + b4 A4 + b2 A2 + b0 I
    let v_inner = &a6 * b(12) + &a4 * b(10) + &a2 * b(8);
    let v = a6.dot(&v_inner) + &a6 * b(6) + &a4 * b(4) + &a2 * b(2) + &eye * b(0);

    // (V − U) X = (V + U)
    solve(&v - &u, &v + &u)
}

/// Solve A X = B by Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<Complex64>, mut b: Array2<Complex64>) -> Result<Array2<Complex64>> {
    let n = a.nrows();
    let m = b.ncols();

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[[i, col]].norm().total_cmp(&a[[j, col]].norm()))
            .unwrap_or(col);
        if a[[pivot_row, col]].norm() < 1e-300 {
            return Err(Error::Numerical(format!(
                "singular Padé denominator at column {col}"
            )));
        }
        if pivot_row != col {
            for j in 0..n {
                a.swap([col, j], [pivot_row, j]);
            }
            for j in 0..m {
                b.swap([col, j], [pivot_row, j]);
            }
        }

        let pivot = a[[col, col]];
        for row in (col + 1)..n {
            let factor = a[[row, col]] / pivot;
            if factor == ZERO {
                continue;
            }
            for j in col..n {
                let upper = a[[col, j]];
                a[[row, j]] -= factor * upper;
            }
            for j in 0..m {
                let upper = b[[col, j]];
                b[[row, j]] -= factor * upper;
            }
        }
    }

    let mut x = Array2::<Complex64>::zeros((n, m));
    for row in (0..n).rev() {
        for j in 0..m {
            let mut acc = b[[row, j]];
            for k in (row + 1)..n {
                acc -= a[[row, k]] * x[[k, j]];
            }
            x[[row, j]] = acc / a[[row, row]];
        }
    }
    Ok(x)
}

/// Maximum absolute column sum.
fn one_norm(a: &Array2<Complex64>) -> f64 {
    a.columns()
        .into_iter()
        .map(|col| col.iter().map(|z| z.norm()).sum::<f64>())
        .fold(0.0, f64::max)
}
