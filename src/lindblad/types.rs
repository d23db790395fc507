// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Lindblad operator types and resolved system dynamics.
//!
//! Ref: Lindblad (1976), Commun. Math. Phys. 48, 119.
//! Ref: Gorini, Kossakowski, Sudarshan (1976), J. Math. Phys. 17, 821.

use ndarray::Array2;
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValidationError};
use crate::matrix::{self, identity, ONE};

/// A Lindblad (jump) operator with its rate.
///
/// Represents a single dissipation channel:
///   D[L](ρ) = γ (L ρ L† − ½{L†L, ρ})
///
/// Common channels:
///   - Amplitude damping: L = a (lowering operator), relaxes toward |0⟩
///   - Pure dephasing:    L = σz/2 on one qubit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dissipator {
    /// Operator matrix (d × d).
    pub matrix: Array2<Complex64>,
    /// Non-negative rate γ in inverse simulated time units.
    pub rate: f64,
    /// Human-readable label (e.g. "damping", "dephasing_q1").
    pub label: String,
}

impl Dissipator {
    /// Create a dissipator, checking that the operator is square and the
    /// rate is finite and non-negative.
    pub fn new(matrix: Array2<Complex64>, rate: f64, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        matrix::ensure_square(&format!("dissipator '{label}'"), &matrix)?;
        if !(rate.is_finite() && rate >= 0.0) {
            return Err(ValidationError::Field {
                field: format!("dissipators.{label}.rate"),
                message: format!("rate must be finite and non-negative, got {rate}"),
            }
            .into());
        }
        Ok(Self {
            matrix,
            rate,
            label,
        })
    }

    /// Unit-rate dissipator.
    pub fn unit(matrix: Array2<Complex64>, label: impl Into<String>) -> Result<Self> {
        Self::new(matrix, 1.0, label)
    }

    /// Lowering operator a = Σₙ √n |n−1⟩⟨n| on a `dim`-level system.
    ///
    /// Drives every state toward |0⟩⟨0|; for `dim = 2` this is σ⁻.
    pub fn lowering(dim: usize, rate: f64) -> Result<Self> {
        let mut a = Array2::zeros((dim, dim));
        for n in 1..dim {
            a[[n - 1, n]] = Complex64::new((n as f64).sqrt(), 0.0);
        }
        Self::new(a, rate, "lowering")
    }

    /// Amplitude damping σ⁻ = |0⟩⟨1| on `qubit` of an `num_qubits` register.
    pub fn qubit_damping(num_qubits: usize, qubit: usize, rate: f64) -> Result<Self> {
        let mut sigma_minus = Array2::zeros((2, 2));
        sigma_minus[[0, 1]] = ONE;
        let op = embed_qubit_operator(&sigma_minus, num_qubits, qubit)?;
        Self::new(op, rate, format!("damping_q{qubit}"))
    }

    /// Pure dephasing σz/2 on `qubit` of an `num_qubits` register.
    pub fn qubit_dephasing(num_qubits: usize, qubit: usize, rate: f64) -> Result<Self> {
        let mut sigma_z_half = Array2::zeros((2, 2));
        sigma_z_half[[0, 0]] = Complex64::new(0.5, 0.0);
        sigma_z_half[[1, 1]] = Complex64::new(-0.5, 0.0);
        let op = embed_qubit_operator(&sigma_z_half, num_qubits, qubit)?;
        Self::new(op, rate, format!("dephasing_q{qubit}"))
    }

    /// Build a dissipator from sparse `(row, col, value)` entries.
    ///
    /// Repeated coordinates accumulate.
    pub fn from_triplets(
        dim: usize,
        entries: &[(usize, usize, Complex64)],
        rate: f64,
        label: impl Into<String>,
    ) -> Result<Self> {
        let label = label.into();
        let mut m = Array2::zeros((dim, dim));
        for &(row, col, value) in entries {
            if row >= dim || col >= dim {
                return Err(ValidationError::Field {
                    field: format!("dissipators.{label}"),
                    message: format!("entry ({row}, {col}) outside {dim}x{dim} operator"),
                }
                .into());
            }
            m[[row, col]] += value;
        }
        Self::new(m, rate, label)
    }

    /// Hilbert-space dimension the operator acts on.
    pub fn dim(&self) -> usize {
        self.matrix.nrows()
    }
}

/// Embed a single-qubit operator on `qubit` (bit `qubit` of the basis index)
/// into an `num_qubits` register: I ⊗ … ⊗ op ⊗ … ⊗ I.
pub fn embed_qubit_operator(
    op: &Array2<Complex64>,
    num_qubits: usize,
    qubit: usize,
) -> Result<Array2<Complex64>> {
    if qubit >= num_qubits {
        return Err(ValidationError::Field {
            field: "qubit".into(),
            message: format!("qubit {qubit} out of range for {num_qubits} qubits"),
        }
        .into());
    }
    if op.dim() != (2, 2) {
        return Err(ValidationError::mismatch("embed_qubit_operator", (2, 2), op.dim()).into());
    }
    let high = identity(1 << (num_qubits - 1 - qubit));
    let low = identity(1 << qubit);
    Ok(matrix::kron(&matrix::kron(&high, op), &low))
}

/// A dissipator with L† and L†L precomputed.
#[derive(Debug, Clone)]
pub struct CachedDissipator {
    pub rate: f64,
    pub l: Array2<Complex64>,
    pub l_dag: Array2<Complex64>,
    pub l_dag_l: Array2<Complex64>,
}

impl CachedDissipator {
    fn new(source: &Dissipator) -> Self {
        let l_dag = matrix::adjoint(&source.matrix);
        let l_dag_l = l_dag.dot(&source.matrix);
        Self {
            rate: source.rate,
            l: source.matrix.clone(),
            l_dag,
            l_dag_l,
        }
    }
}

/// Evolution dynamics, resolved once at registration.
///
/// Systems without any non-zero-rate dissipator are `Closed`; the integrator
/// then evaluates only the commutator term.
#[derive(Debug, Clone)]
pub enum Dynamics {
    Closed {
        hamiltonian: Array2<Complex64>,
    },
    Open {
        hamiltonian: Array2<Complex64>,
        dissipators: Vec<CachedDissipator>,
    },
}

impl Dynamics {
    /// Resolve dynamics from a Hamiltonian and dissipators, checking that
    /// every operator is square and shares the Hamiltonian's dimension.
    pub fn new(hamiltonian: Array2<Complex64>, dissipators: &[Dissipator]) -> Result<Self> {
        let d = matrix::ensure_square("hamiltonian", &hamiltonian)?;
        for op in dissipators {
            if op.matrix.dim() != (d, d) {
                return Err(ValidationError::mismatch(
                    &format!("dissipator '{}'", op.label),
                    (d, d),
                    op.matrix.dim(),
                )
                .into());
            }
        }

        let active: Vec<CachedDissipator> = dissipators
            .iter()
            .filter(|op| op.rate > 0.0)
            .map(CachedDissipator::new)
            .collect();
        if active.is_empty() {
            Ok(Self::Closed { hamiltonian })
        } else {
            Ok(Self::Open {
                hamiltonian,
                dissipators: active,
            })
        }
    }

    /// Closed-system dynamics.
    pub fn closed(hamiltonian: Array2<Complex64>) -> Result<Self> {
        Self::new(hamiltonian, &[])
    }

    pub fn hamiltonian(&self) -> &Array2<Complex64> {
        match self {
            Self::Closed { hamiltonian } | Self::Open { hamiltonian, .. } => hamiltonian,
        }
    }

    pub fn dim(&self) -> usize {
        self.hamiltonian().nrows()
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    /// Number of active (non-zero-rate) dissipators.
    pub fn dissipator_count(&self) -> usize {
        match self {
            Self::Closed { .. } => 0,
            Self::Open { dissipators, .. } => dissipators.len(),
        }
    }
}
