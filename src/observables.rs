// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Derived quantities read by the presentation layer.
//!
//! Qubit `q` of a d = 2ⁿ register is bit `q` of the basis index. Pairwise
//! quantities are listed in upper-triangular order:
//! (0,1), (0,2), …, (0,n−1), (1,2), …, (n−2,n−1).

use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::density::DensityMatrix;
use crate::error::{Result, ValidationError};
use crate::matrix::{self, eigh};

/// Eigenvalues below this contribute nothing to entropy.
const ENTROPY_CUTOFF: f64 = 1e-15;

/// Bloch vector of a single-qubit reduced state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlochVector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl BlochVector {
    /// Length r; 1 for pure single-qubit states.
    pub fn radius(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Polar angle θ from +z.
    pub fn theta(&self) -> f64 {
        let r = self.radius();
        if r == 0.0 {
            0.0
        } else {
            (self.z / r).clamp(-1.0, 1.0).acos()
        }
    }

    /// Azimuth φ in (−π, π].
    pub fn phi(&self) -> f64 {
        self.y.atan2(self.x)
    }
}

/// Everything the renderer reads for one system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observables {
    pub populations: Vec<f64>,
    pub purity: f64,
    /// Per-qubit Bloch vectors, qubit 0 first.
    pub bloch: Vec<BlochVector>,
    /// Pairwise mutual information in bits, upper-triangular order.
    pub mutual_information: Vec<f64>,
}

impl Observables {
    pub fn of(rho: &DensityMatrix) -> Result<Self> {
        let n = qubit_count(rho)?;
        let bloch = (0..n)
            .map(|q| bloch_vector(rho, q))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            populations: rho.populations(),
            purity: rho.purity(),
            bloch,
            mutual_information: pairwise_mutual_information(rho)?,
        })
    }
}

fn qubit_count(rho: &DensityMatrix) -> Result<usize> {
    rho.num_qubits().ok_or_else(|| {
        ValidationError::InvalidDimension {
            dimension: rho.dim(),
            reason: "not a power of two".into(),
        }
        .into()
    })
}

/// Reduced density matrix of the qubits in `keep`, tracing out the rest.
///
/// The first listed qubit is the most significant bit of the reduced index,
/// so `keep = [a, b]` yields the basis |00⟩, |01⟩, |10⟩, |11⟩ with the first
/// digit belonging to `a`.
pub fn partial_trace(rho: &DensityMatrix, keep: &[usize]) -> Result<Array2<Complex64>> {
    let n = qubit_count(rho)?;
    for (i, &q) in keep.iter().enumerate() {
        if q >= n || keep[..i].contains(&q) {
            return Err(ValidationError::Field {
                field: "keep".into(),
                message: format!("qubit {q} is out of range or repeated for {n} qubits"),
            }
            .into());
        }
    }

    let kept_mask: usize = keep.iter().map(|&q| 1usize << q).sum();
    let reduced_index = |full: usize| {
        keep.iter()
            .fold(0usize, |acc, &q| (acc << 1) | ((full >> q) & 1))
    };

    let m = 1usize << keep.len();
    let mut reduced = Array2::zeros((m, m));
    for ((row, col), &value) in rho.as_array().indexed_iter() {
        // Traced qubits must agree between bra and ket
        if (row & !kept_mask) == (col & !kept_mask) {
            reduced[[reduced_index(row), reduced_index(col)]] += value;
        }
    }
    Ok(reduced)
}

/// Von Neumann entropy S(ρ) = −Σ λ log₂ λ, in bits.
pub fn von_neumann_entropy(rho: &Array2<Complex64>) -> Result<f64> {
    let eig = eigh(rho)?;
    let entropy: f64 = eig
        .values
        .iter()
        .filter(|&&lambda| lambda > ENTROPY_CUTOFF)
        .map(|&lambda| -lambda * lambda.log2())
        .sum();
    Ok(entropy.max(0.0))
}

/// Mutual information I(A:B) = S(A) + S(B) − S(AB) between qubits `a` and `b`, in bits.
pub fn mutual_information(rho: &DensityMatrix, a: usize, b: usize) -> Result<f64> {
    let s_a = von_neumann_entropy(&partial_trace(rho, &[a])?)?;
    let s_b = von_neumann_entropy(&partial_trace(rho, &[b])?)?;
    let s_ab = von_neumann_entropy(&partial_trace(rho, &[a, b])?)?;
    // Subadditivity: I ≥ 0 up to rounding
    Ok((s_a + s_b - s_ab).max(0.0))
}

/// Mutual information for every qubit pair, n(n−1)/2 values.
pub fn pairwise_mutual_information(rho: &DensityMatrix) -> Result<Vec<f64>> {
    let n = qubit_count(rho)?;
    let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
    for a in 0..n {
        for b in (a + 1)..n {
            out.push(mutual_information(rho, a, b)?);
        }
    }
    Ok(out)
}

/// Bloch vector (⟨σx⟩, ⟨σy⟩, ⟨σz⟩) of `qubit`.
pub fn bloch_vector(rho: &DensityMatrix, qubit: usize) -> Result<BlochVector> {
    let r = partial_trace(rho, &[qubit])?;
    Ok(BlochVector {
        x: 2.0 * r[[0, 1]].re,
        y: 2.0 * r[[1, 0]].im,
        z: r[[0, 0]].re - r[[1, 1]].re,
    })
}

/// Fidelity with a pure target, F = Tr(ρ_target ρ).
pub fn state_fidelity(rho: &DensityMatrix, target: &DensityMatrix) -> Result<f64> {
    let product = matrix::multiply(target.as_array(), rho.as_array())?;
    Ok(matrix::trace(&product)?.re)
}

/// Trace distance D(ρ, σ) = ½ Σ |λᵢ(ρ − σ)|.
pub fn trace_distance(rho: &DensityMatrix, sigma: &DensityMatrix) -> Result<f64> {
    if rho.dim() != sigma.dim() {
        return Err(ValidationError::mismatch(
            "trace_distance",
            rho.as_array().dim(),
            sigma.as_array().dim(),
        )
        .into());
    }
    let diff = rho.as_array() - sigma.as_array();
    let eig = eigh(&diff)?;
    Ok(0.5 * eig.values.iter().map(|v| v.abs()).sum::<f64>())
}
