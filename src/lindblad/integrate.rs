// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Sub-stepped RK4 integrator for the Lindblad master equation.
//!
//! A request to advance by Δt is split into n = ⌈Δt / max_substep⌉ equal
//! sub-steps. Each sub-step is one classical RK4 step on the generator,
//! followed by invariant repair (see [`super::repair`]).
//!
//! Ref: Press et al., "Numerical Recipes" (2007), §17.1.

use ndarray::Array2;
use num_complex::Complex64;

use super::generator::lindblad_rhs;
use super::repair::{repair, Divergence, RepairStats, Tolerances};
use super::types::Dynamics;
use crate::config::IntegratorConfig;
use crate::density::DensityMatrix;
use crate::error::{Result, ValidationError};
use crate::matrix::{self, unitary_propagator};

/// Result of advancing one system.
#[derive(Debug, Clone)]
pub struct Evolution {
    pub state: DensityMatrix,
    /// Sub-steps taken (0 for Δt = 0).
    pub substeps: usize,
    pub repairs: RepairStats,
}

/// Integration failure for a single system.
#[derive(Debug, Clone, PartialEq)]
pub enum StepError {
    /// Rejected before integrating (bad Δt, shape mismatch).
    Invalid(ValidationError),
    /// Invariants could not be restored.
    Diverged(Divergence),
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepError::Invalid(e) => write!(f, "{}", e),
            StepError::Diverged(d) => write!(f, "{}", d),
        }
    }
}

impl std::error::Error for StepError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StepError::Invalid(e) => Some(e),
            StepError::Diverged(d) => Some(d),
        }
    }
}

/// Lindblad integrator with fixed numerical settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Integrator {
    max_substep: f64,
    tolerances: Tolerances,
}

impl Default for Integrator {
    fn default() -> Self {
        Self::new(&IntegratorConfig::default())
    }
}

impl Integrator {
    pub fn new(config: &IntegratorConfig) -> Self {
        Self {
            max_substep: config.max_substep,
            tolerances: Tolerances {
                epsilon: config.epsilon,
                hard: config.hard_tolerance,
            },
        }
    }

    pub fn max_substep(&self) -> f64 {
        self.max_substep
    }

    pub fn epsilon(&self) -> f64 {
        self.tolerances.epsilon
    }

    /// Number of sub-steps used for a delta of `dt`.
    pub fn substeps(&self, dt: f64) -> usize {
        if dt <= 0.0 {
            0
        } else {
            ((dt / self.max_substep).ceil() as usize).max(1)
        }
    }

    /// Advance `rho` by `dt` under `dynamics`.
    ///
    /// Δt = 0 returns the input unchanged. The input is never modified.
    pub fn advance(
        &self,
        rho: &DensityMatrix,
        dynamics: &Dynamics,
        dt: f64,
    ) -> std::result::Result<Evolution, StepError> {
        check_inputs(rho, dynamics, dt).map_err(StepError::Invalid)?;
        if dt == 0.0 {
            return Ok(Evolution {
                state: rho.clone(),
                substeps: 0,
                repairs: RepairStats::default(),
            });
        }

        let n = self.substeps(dt);
        let h = dt / n as f64;
        let mut state = rho.as_array().clone();
        let mut repairs = RepairStats::default();
        for k in 0..n {
            let diverged = |reason: String| StepError::Diverged(Divergence { substep: k, reason });
            state = rk4_step(&state, dynamics, h).map_err(|e| diverged(e.to_string()))?;
            repairs.merge(repair(&mut state, self.tolerances).map_err(diverged)?);
        }

        Ok(Evolution {
            state: DensityMatrix::from_repaired(state),
            substeps: n,
            repairs,
        })
    }

    /// Preview `steps` successive states at Δt, 2Δt, … without committing.
    pub fn lookahead(
        &self,
        rho: &DensityMatrix,
        dynamics: &Dynamics,
        dt: f64,
        steps: usize,
    ) -> std::result::Result<Vec<DensityMatrix>, StepError> {
        let mut out = Vec::with_capacity(steps);
        let mut current = rho.clone();
        for _ in 0..steps {
            current = self.advance(&current, dynamics, dt)?.state;
            out.push(current.clone());
        }
        Ok(out)
    }
}

/// Exact closed-system evolution ρ′ = U ρ U†, U = exp(−iHΔt).
pub fn evolve_unitary(
    rho: &DensityMatrix,
    hamiltonian: &Array2<Complex64>,
    dt: f64,
) -> Result<DensityMatrix> {
    let u = unitary_propagator(hamiltonian, dt)?;
    let evolved = matrix::multiply(&matrix::multiply(&u, rho.as_array())?, &matrix::adjoint(&u))?;
    Ok(DensityMatrix::from_repaired(matrix::hermitian_part(&evolved)))
}

fn check_inputs(
    rho: &DensityMatrix,
    dynamics: &Dynamics,
    dt: f64,
) -> std::result::Result<(), ValidationError> {
    if !dt.is_finite() || dt < 0.0 {
        return Err(ValidationError::NegativeTimeDelta(dt));
    }
    let d = dynamics.dim();
    if rho.dim() != d {
        return Err(ValidationError::mismatch("advance", (d, d), rho.as_array().dim()));
    }
    Ok(())
}

/// Single classical RK4 step.
fn rk4_step(
    rho: &Array2<Complex64>,
    dynamics: &Dynamics,
    dt: f64,
) -> Result<Array2<Complex64>> {
    let dt_c = Complex64::new(dt, 0.0);
    let half = Complex64::new(0.5, 0.0);
    let sixth = Complex64::new(1.0 / 6.0, 0.0);
    let two = Complex64::new(2.0, 0.0);

    let k1 = lindblad_rhs(dynamics, rho)?;
    let rho2 = rho + &(&k1 * (half * dt_c));
    let k2 = lindblad_rhs(dynamics, &rho2)?;
    let rho3 = rho + &(&k2 * (half * dt_c));
    let k3 = lindblad_rhs(dynamics, &rho3)?;
    let rho4 = rho + &(&k3 * dt_c);
    let k4 = lindblad_rhs(dynamics, &rho4)?;

    Ok(rho + &((k1 + k2 * two + k3 * two + k4) * (sixth * dt_c)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lindblad::Dissipator;
    use crate::test_utils::{
        assert_matrix_close, pauli_x, pauli_z, plus_state, random_density, random_dissipator,
        random_hermitian, random_pure,
    };
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::f64::consts::PI;

    fn integrator() -> Integrator {
        Integrator::default()
    }

    fn scaled(m: Array2<Complex64>, s: f64) -> Array2<Complex64> {
        m * Complex64::new(s, 0.0)
    }

    #[test]
    fn test_substep_count() {
        let int = integrator();
        assert_eq!(int.substeps(0.0), 0);
        assert_eq!(int.substeps(0.01), 1);
        assert_eq!(int.substeps(0.02), 1);
        assert_eq!(int.substeps(0.021), 2);
        assert_eq!(int.substeps(1.0), 50);
    }

    #[test]
    fn test_zero_delta_is_identity() {
        let mut rng = StdRng::seed_from_u64(1);
        let rho = random_density(&mut rng, 4);
        let ops = vec![random_dissipator(&mut rng, 4, 1.0)];
        let dynamics = Dynamics::new(random_hermitian(&mut rng, 4, 1.0), &ops).unwrap();
        let out = integrator().advance(&rho, &dynamics, 0.0).unwrap();
        assert_eq!(out.substeps, 0);
        assert_eq!(out.state, rho);
    }

    #[test]
    fn test_negative_and_non_finite_delta_rejected() {
        let dynamics = Dynamics::closed(pauli_x()).unwrap();
        let rho = DensityMatrix::ground(2);
        for dt in [-0.1, f64::NAN, f64::INFINITY] {
            let err = integrator().advance(&rho, &dynamics, dt).unwrap_err();
            assert!(
                matches!(err, StepError::Invalid(ValidationError::NegativeTimeDelta(_))),
                "{dt}: {err}"
            );
        }
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let dynamics = Dynamics::closed(pauli_x()).unwrap();
        let err = integrator()
            .advance(&DensityMatrix::ground(4), &dynamics, 0.1)
            .unwrap_err();
        assert!(err.to_string().contains("expected 2x2, got 4x4"));
        assert!(matches!(
            err,
            StepError::Invalid(ValidationError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_closed_system_matches_unitary() {
        let mut rng = StdRng::seed_from_u64(42);
        for &n in &[2usize, 4, 8] {
            let h = random_hermitian(&mut rng, n, 0.25);
            let rho = random_density(&mut rng, n);
            let dynamics = Dynamics::closed(h.clone()).unwrap();
            let dt = 0.73;
            let numeric = integrator().advance(&rho, &dynamics, dt).unwrap();
            let exact = evolve_unitary(&rho, &h, dt).unwrap();
            assert_matrix_close(numeric.state.as_array(), exact.as_array(), 1e-6);
        }
    }

    #[test]
    fn test_rabi_flip_half_sigma_x() {
        // H = σx/2: P₁(t) = sin²(t/2), full flip at t = π
        let dynamics = Dynamics::closed(scaled(pauli_x(), 0.5)).unwrap();
        let out = integrator()
            .advance(&DensityMatrix::ground(2), &dynamics, PI)
            .unwrap();
        assert_relative_eq!(out.state.population(1), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_rabi_flip_sigma_x() {
        // H = σx: P₁(t) = sin²(t), full flip at t = π/2 and back at t = π
        let dynamics = Dynamics::closed(pauli_x()).unwrap();
        let ground = DensityMatrix::ground(2);
        let flipped = integrator().advance(&ground, &dynamics, PI / 2.0).unwrap();
        assert_relative_eq!(flipped.state.population(1), 1.0, epsilon = 1e-6);
        let back = integrator().advance(&ground, &dynamics, PI).unwrap();
        assert_relative_eq!(back.state.population(0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_amplitude_damping_reaches_ground_d4() {
        let dynamics =
            Dynamics::new(Array2::zeros((4, 4)), &[Dissipator::lowering(4, 1.0).unwrap()])
                .unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        let starts = [
            DensityMatrix::basis(4, 3).unwrap(),
            random_pure(&mut rng, 4),
            random_density(&mut rng, 4),
        ];
        // Slowest mode is the |0⟩⟨1| coherence, decaying as e^{−t/2}
        for start in &starts {
            let out = integrator().advance(start, &dynamics, 40.0).unwrap();
            assert_relative_eq!(out.state.population(0), 1.0, epsilon = 1e-6);
            assert!(out.state.max_coherence() < 1e-6, "{:?}", out.state);
            out.state.validate(1e-6).unwrap();
        }
    }

    #[test]
    fn test_dephasing_kills_coherence_keeps_populations() {
        let dynamics = Dynamics::new(
            Array2::zeros((2, 2)),
            &[Dissipator::qubit_dephasing(1, 0, 2.0).unwrap()],
        )
        .unwrap();
        let out = integrator().advance(&plus_state(), &dynamics, 10.0).unwrap();
        // ρ₀₁(t) = ½ e^{−γt/2}
        assert_relative_eq!(out.state.as_array()[[0, 1]].re, 0.5 * (-10.0_f64).exp(), epsilon = 1e-6);
        assert_relative_eq!(out.state.population(0), 0.5, epsilon = 1e-9);
        assert!(out.state.purity() < 0.51);
    }

    #[test]
    fn test_sigma_z_precession_preserves_purity() {
        let dynamics = Dynamics::closed(pauli_z()).unwrap();
        let out = integrator().advance(&plus_state(), &dynamics, 3.0).unwrap();
        assert_relative_eq!(out.state.purity(), 1.0, epsilon = 1e-6);
        // ρ₀₁(t) = ½ e^{−2it}
        let expected = Complex64::new(0.0, -6.0).exp() * 0.5;
        assert!((out.state.as_array()[[0, 1]] - expected).norm() < 1e-6);
    }

    #[test]
    fn test_invariants_hold_for_random_open_systems() {
        let mut rng = StdRng::seed_from_u64(99);
        for &n in &[2usize, 4, 8] {
            let ops: Vec<_> = (0..2).map(|_| random_dissipator(&mut rng, n, 0.5)).collect();
            let dynamics = Dynamics::new(random_hermitian(&mut rng, n, 1.0), &ops).unwrap();
            let out = integrator()
                .advance(&random_density(&mut rng, n), &dynamics, 0.5)
                .unwrap();
            assert_eq!(out.substeps, 25);
            out.state.validate(1e-6).unwrap();
        }
    }

    #[test]
    fn test_lookahead_does_not_mutate_and_matches_advance() {
        let dynamics = Dynamics::closed(pauli_x()).unwrap();
        let ground = DensityMatrix::ground(2);
        let frames = integrator().lookahead(&ground, &dynamics, 0.1, 5).unwrap();
        assert_eq!(frames.len(), 5);
        assert_eq!(ground, DensityMatrix::ground(2));
        for (k, frame) in frames.iter().enumerate() {
            let t = 0.1 * (k + 1) as f64;
            assert_relative_eq!(frame.population(1), t.sin().powi(2), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_runaway_generator_diverges() {
        // Large anti-Hermitian H: the commutator term is anti-Hermitian
        let mut h = Array2::zeros((2, 2));
        h[[0, 1]] = Complex64::new(1e6, 0.0);
        h[[1, 0]] = Complex64::new(-1e6, 0.0);
        let dynamics = Dynamics::closed(h).unwrap();
        let err = integrator()
            .advance(&plus_state(), &dynamics, 0.02)
            .unwrap_err();
        match err {
            StepError::Diverged(d) => assert_eq!(d.substep, 0),
            other => panic!("expected divergence, got {other}"),
        }
    }

    #[test]
    fn test_step_error_display() {
        let err = StepError::Diverged(Divergence {
            substep: 2,
            reason: "trace collapsed".into(),
        });
        assert_eq!(err.to_string(), "sub-step 2: trace collapsed");
    }
}
