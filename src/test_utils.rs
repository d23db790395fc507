// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared fixtures for engine tests.

use ndarray::Array2;
use num_complex::Complex64;
use rand::Rng;

use crate::density::DensityMatrix;
use crate::lindblad::Dissipator;
use crate::matrix::adjoint;

pub fn pauli_x() -> Array2<Complex64> {
    let mut m = Array2::zeros((2, 2));
    m[[0, 1]] = Complex64::new(1.0, 0.0);
    m[[1, 0]] = Complex64::new(1.0, 0.0);
    m
}

pub fn pauli_y() -> Array2<Complex64> {
    let mut m = Array2::zeros((2, 2));
    m[[0, 1]] = Complex64::new(0.0, -1.0);
    m[[1, 0]] = Complex64::new(0.0, 1.0);
    m
}

pub fn pauli_z() -> Array2<Complex64> {
    let mut m = Array2::zeros((2, 2));
    m[[0, 0]] = Complex64::new(1.0, 0.0);
    m[[1, 1]] = Complex64::new(-1.0, 0.0);
    m
}

/// |+⟩⟨+| = ½(I + σx)
pub fn plus_state() -> DensityMatrix {
    let h = Complex64::new(0.5, 0.0);
    DensityMatrix::from_matrix(Array2::from_elem((2, 2), h)).unwrap()
}

/// Element-wise comparison with a descriptive panic message.
pub fn assert_matrix_close(a: &Array2<Complex64>, b: &Array2<Complex64>, tol: f64) {
    assert_eq!(a.shape(), b.shape());
    for ((i, j), val) in a.indexed_iter() {
        let diff = (val - b[[i, j]]).norm();
        assert!(
            diff < tol,
            "Mismatch at ({}, {}): {:?} vs {:?} (diff={})",
            i,
            j,
            val,
            b[[i, j]],
            diff
        );
    }
}

fn random_complex<R: Rng>(rng: &mut R, scale: f64) -> Complex64 {
    Complex64::new(
        rng.gen_range(-scale..scale),
        rng.gen_range(-scale..scale),
    )
}

/// Random Hermitian matrix with entries of magnitude ≲ `scale`.
pub fn random_hermitian<R: Rng>(rng: &mut R, n: usize, scale: f64) -> Array2<Complex64> {
    let mut m = Array2::zeros((n, n));
    for i in 0..n {
        m[[i, i]] = Complex64::new(rng.gen_range(-scale..scale), 0.0);
        for j in (i + 1)..n {
            let z = random_complex(rng, scale);
            m[[i, j]] = z;
            m[[j, i]] = z.conj();
        }
    }
    m
}

/// Random full-rank density matrix ρ = AA† / Tr(AA†).
pub fn random_density<R: Rng>(rng: &mut R, n: usize) -> DensityMatrix {
    let a = Array2::from_shape_fn((n, n), |_| random_complex(rng, 1.0));
    let aa = a.dot(&adjoint(&a));
    let tr = aa.diag().sum();
    DensityMatrix::from_matrix(aa.mapv(|z| z / tr)).unwrap()
}

/// Random pure state |ψ⟩⟨ψ| with complex amplitudes.
pub fn random_pure<R: Rng>(rng: &mut R, n: usize) -> DensityMatrix {
    let amplitudes: Vec<_> = (0..n).map(|_| random_complex(rng, 1.0)).collect();
    DensityMatrix::from_pure(&amplitudes).unwrap()
}

/// Random (non-Hermitian) jump operator normalized to unit Frobenius norm,
/// scaled by `rate` through the dissipator rate.
pub fn random_dissipator<R: Rng>(rng: &mut R, n: usize, rate: f64) -> Dissipator {
    let a = Array2::from_shape_fn((n, n), |_| random_complex(rng, 1.0));
    let norm = crate::matrix::frobenius_norm(&a);
    Dissipator::new(a.mapv(|z| z / norm), rate, "random").unwrap()
}
