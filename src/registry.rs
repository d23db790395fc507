// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! System registry and time controller.
//!
//! The registry owns every registered system: its operators, the last
//! committed state, accumulated simulated time, and time scale. Callers
//! submit real-time deltas; the registry converts them to simulated deltas
//! and parks them in the pending queue until the scheduler's next dispatch.
//! Committed states are published as `Arc<DensityMatrix>` snapshots, so
//! readers never block integration and never observe a partial batch.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex64;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, LimitsConfig};
use crate::density::DensityMatrix;
use crate::error::{EngineError, Error, Result, ValidationError};
use crate::lindblad::{Dissipator, Dynamics, Evolution, Integrator, StepError};
use crate::matrix;
use crate::observables::Observables;
use crate::scheduler::PendingQueue;
use crate::validation;

/// Stable identity of a registered system. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SystemId(pub u64);

impl fmt::Display for SystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "system#{}", self.0)
    }
}

/// Evolution status of a system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SystemStatus {
    Active,
    /// Evolution halted after an unrecoverable invariant violation.
    Diverged { reason: String },
}

impl SystemStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SystemStatus::Active)
    }
}

/// Registration request.
#[derive(Debug, Clone)]
pub struct SystemSpec {
    pub dimension: usize,
    pub hamiltonian: Array2<Complex64>,
    pub dissipators: Vec<Dissipator>,
    /// Defaults to |0⟩⟨0|.
    pub initial_state: Option<DensityMatrix>,
    pub time_scale: f64,
}

impl SystemSpec {
    /// Closed system with unit time scale starting in the ground state.
    pub fn new(dimension: usize, hamiltonian: Array2<Complex64>) -> Self {
        Self {
            dimension,
            hamiltonian,
            dissipators: Vec::new(),
            initial_state: None,
            time_scale: 1.0,
        }
    }

    pub fn with_dissipator(mut self, dissipator: Dissipator) -> Self {
        self.dissipators.push(dissipator);
        self
    }

    pub fn with_initial_state(mut self, state: DensityMatrix) -> Self {
        self.initial_state = Some(state);
        self
    }

    pub fn with_time_scale(mut self, scale: f64) -> Self {
        self.time_scale = scale;
        self
    }
}

/// Summary of one registered system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemInfo {
    pub id: SystemId,
    pub dimension: usize,
    pub num_qubits: usize,
    /// Dissipators with non-zero rate.
    pub dissipators: usize,
    pub open: bool,
    pub time_scale: f64,
    pub simulated_time: f64,
    pub status: SystemStatus,
}

/// Serializable copy of a system for host-side save and resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// Id at the time the snapshot was taken; restore allocates a new one.
    pub id: SystemId,
    pub dimension: usize,
    pub hamiltonian: Array2<Complex64>,
    pub dissipators: Vec<Dissipator>,
    pub state: DensityMatrix,
    pub time_scale: f64,
    pub simulated_time: f64,
}

struct SystemEntry {
    dimension: usize,
    hamiltonian: Array2<Complex64>,
    dissipators: Vec<Dissipator>,
    dynamics: Arc<Dynamics>,
    state: Arc<DensityMatrix>,
    time_scale: f64,
    simulated_time: f64,
    status: SystemStatus,
}

impl SystemEntry {
    fn info(&self, id: SystemId) -> SystemInfo {
        SystemInfo {
            id,
            dimension: self.dimension,
            num_qubits: self.dimension.trailing_zeros() as usize,
            dissipators: self.dynamics.dissipator_count(),
            open: self.dynamics.is_open(),
            time_scale: self.time_scale,
            simulated_time: self.simulated_time,
            status: self.status.clone(),
        }
    }
}

/// Work item for one system in a dispatch.
pub(crate) struct Job {
    pub id: SystemId,
    pub dt: f64,
    pub state: Arc<DensityMatrix>,
    pub dynamics: Arc<Dynamics>,
}

/// Work item for one system in a batched preview.
pub(crate) struct PreviewJob {
    pub id: SystemId,
    pub dt: f64,
    pub state: Arc<DensityMatrix>,
    pub dynamics: Arc<Dynamics>,
}

/// Outcome of preparing a batch.
pub(crate) struct Prepared {
    pub jobs: Vec<Job>,
    /// Ids no longer registered.
    pub dropped: usize,
    /// Diverged systems left untouched.
    pub skipped: usize,
}

/// Outcome of committing a batch.
#[derive(Debug, Default)]
pub(crate) struct Committed {
    pub advanced: usize,
    /// Results discarded because the system was unregistered mid-dispatch.
    pub discarded: usize,
    pub diverged: Vec<SystemId>,
    pub epoch: u64,
}

/// Thread-safe registry of evolving systems.
///
/// # Example
///
/// ```
/// use biome_engine::registry::{Registry, SystemSpec};
/// use biome_engine::scheduler::Scheduler;
/// use ndarray::Array2;
///
/// let registry = Registry::default();
/// let id = registry.register(SystemSpec::new(2, Array2::zeros((2, 2)))).unwrap();
/// assert!(registry.submit(id, 0.05).unwrap());
///
/// let scheduler = Scheduler::default();
/// let report = scheduler.tick(&registry);
/// assert_eq!(report.advanced, 1);
/// assert!((registry.simulated_time(id).unwrap() - 0.05).abs() < 1e-15);
/// ```
pub struct Registry {
    systems: RwLock<HashMap<SystemId, SystemEntry>>,
    next_id: AtomicU64,
    pending: PendingQueue,
    /// Held from taking a batch until its results are committed.
    dispatch: Mutex<()>,
    epoch: watch::Sender<u64>,
    integrator: Integrator,
    limits: LimitsConfig,
}

impl Registry {
    /// Create a registry from engine configuration.
    ///
    /// The configuration is validated first; a registry never runs with a
    /// zero sub-step or inverted tolerances.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: &EngineConfig) -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            systems: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            pending: PendingQueue::new(config.scheduler.max_pending),
            dispatch: Mutex::new(()),
            epoch,
            integrator: Integrator::new(&config.integrator),
            limits: config.limits,
        }
    }

    /// Register a system and return its id.
    pub fn register(&self, spec: SystemSpec) -> Result<SystemId> {
        let d = spec.dimension;
        validation::validate_dimension(d, &self.limits)?;
        validation::validate_operator("hamiltonian", &spec.hamiltonian, d)?;
        for op in &spec.dissipators {
            validation::validate_operator(&format!("dissipator '{}'", op.label), &op.matrix, d)?;
        }
        validation::validate_time_scale(spec.time_scale)?;

        let state = match spec.initial_state {
            Some(state) => {
                if state.dim() != d {
                    return Err(ValidationError::mismatch(
                        "initial_state",
                        (d, d),
                        state.as_array().dim(),
                    )
                    .into());
                }
                state.validate(self.integrator.epsilon())?;
                state
            }
            None => DensityMatrix::ground(d),
        };

        if !matrix::is_hermitian(&spec.hamiltonian, self.integrator.epsilon()) {
            warn!(
                dimension = d,
                defect = matrix::hermitian_defect(&spec.hamiltonian).unwrap_or(f64::NAN),
                "Registering non-Hermitian Hamiltonian; evolution may diverge"
            );
        }
        let dynamics = Dynamics::new(spec.hamiltonian.clone(), &spec.dissipators)?;

        let entry = SystemEntry {
            dimension: d,
            hamiltonian: spec.hamiltonian,
            dissipators: spec.dissipators,
            dynamics: Arc::new(dynamics),
            state: Arc::new(state),
            time_scale: spec.time_scale,
            simulated_time: 0.0,
            status: SystemStatus::Active,
        };
        self.insert(entry)
    }

    fn insert(&self, entry: SystemEntry) -> Result<SystemId> {
        let mut systems = self.systems.write();
        validation::validate_capacity(systems.len(), &self.limits)?;

        let id = SystemId(self.next_id.fetch_add(1, Ordering::Relaxed));
        info!(
            system = %id,
            dimension = entry.dimension,
            open = entry.dynamics.is_open(),
            time_scale = entry.time_scale,
            "Registered system"
        );
        systems.insert(id, entry);
        Ok(id)
    }

    /// Remove a system. Returns false if it was not registered.
    ///
    /// Pending deltas for the id are dropped at the next dispatch; an
    /// in-flight integration finishes and its result is discarded.
    pub fn unregister(&self, id: SystemId) -> bool {
        let removed = self.systems.write().remove(&id).is_some();
        if removed {
            info!(system = %id, "Unregistered system");
        }
        removed
    }

    /// Submit a real-time delta for a system.
    ///
    /// Returns `Ok(true)` when enqueued and `Ok(false)` when the id was
    /// allocated but has since been unregistered.
    pub fn submit(&self, id: SystemId, real_dt: f64) -> Result<bool> {
        validation::validate_time_delta(real_dt)?;
        let scale = {
            let systems = self.systems.read();
            match systems.get(&id) {
                Some(entry) => entry.time_scale,
                None if self.was_allocated(id) => return Ok(false),
                None => return Err(EngineError::UnknownSystem(id).into()),
            }
        };

        let simulated = real_dt * scale;
        if !simulated.is_finite() {
            return Err(ValidationError::Field {
                field: "time_delta".into(),
                message: format!("{real_dt} x time scale {scale} overflows"),
            }
            .into());
        }
        if simulated > 0.0 {
            self.pending.push(id, simulated)?;
        }
        Ok(true)
    }

    fn was_allocated(&self, id: SystemId) -> bool {
        id.0 >= 1 && id.0 < self.next_id.load(Ordering::Relaxed)
    }

    fn with_entry<T>(&self, id: SystemId, f: impl FnOnce(&SystemEntry) -> T) -> Result<T> {
        let systems = self.systems.read();
        systems
            .get(&id)
            .map(f)
            .ok_or_else(|| EngineError::UnknownSystem(id).into())
    }

    /// Last committed state.
    pub fn get_state(&self, id: SystemId) -> Result<Arc<DensityMatrix>> {
        self.with_entry(id, |e| Arc::clone(&e.state))
    }

    /// Change the time scale; applies to future submissions only.
    pub fn set_time_scale(&self, id: SystemId, scale: f64) -> Result<()> {
        validation::validate_time_scale(scale)?;
        let mut systems = self.systems.write();
        let entry = systems
            .get_mut(&id)
            .ok_or(Error::Engine(EngineError::UnknownSystem(id)))?;
        debug!(system = %id, from = entry.time_scale, to = scale, "Time scale changed");
        entry.time_scale = scale;
        Ok(())
    }

    pub fn time_scale(&self, id: SystemId) -> Result<f64> {
        self.with_entry(id, |e| e.time_scale)
    }

    /// Accumulated simulated time of committed steps.
    pub fn simulated_time(&self, id: SystemId) -> Result<f64> {
        self.with_entry(id, |e| e.simulated_time)
    }

    pub fn status(&self, id: SystemId) -> Result<SystemStatus> {
        self.with_entry(id, |e| e.status.clone())
    }

    pub fn info(&self, id: SystemId) -> Result<SystemInfo> {
        self.with_entry(id, |e| e.info(id))
    }

    /// Registered ids in allocation order.
    pub fn ids(&self) -> Vec<SystemId> {
        let mut ids: Vec<_> = self.systems.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, id: SystemId) -> bool {
        self.systems.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.systems.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializable copy of a system.
    pub fn snapshot(&self, id: SystemId) -> Result<SystemSnapshot> {
        self.with_entry(id, |e| SystemSnapshot {
            id,
            dimension: e.dimension,
            hamiltonian: e.hamiltonian.clone(),
            dissipators: e.dissipators.clone(),
            state: (*e.state).clone(),
            time_scale: e.time_scale,
            simulated_time: e.simulated_time,
        })
    }

    /// Snapshots of every registered system, in id order.
    pub fn snapshot_all(&self) -> Vec<SystemSnapshot> {
        self.ids()
            .into_iter()
            .filter_map(|id| self.snapshot(id).ok())
            .collect()
    }

    /// Register a system from a snapshot under a fresh id, keeping its
    /// state and accumulated simulated time.
    pub fn restore(&self, snapshot: SystemSnapshot) -> Result<SystemId> {
        if !(snapshot.simulated_time.is_finite() && snapshot.simulated_time >= 0.0) {
            return Err(ValidationError::Field {
                field: "simulated_time".into(),
                message: format!("must be finite and non-negative, got {}", snapshot.simulated_time),
            }
            .into());
        }
        for op in &snapshot.dissipators {
            Dissipator::new(op.matrix.clone(), op.rate, op.label.clone())?;
        }
        let simulated_time = snapshot.simulated_time;
        let spec = SystemSpec {
            dimension: snapshot.dimension,
            hamiltonian: snapshot.hamiltonian,
            dissipators: snapshot.dissipators,
            initial_state: Some(snapshot.state),
            time_scale: snapshot.time_scale,
        };
        let id = self.register(spec)?;
        if let Some(entry) = self.systems.write().get_mut(&id) {
            entry.simulated_time = simulated_time;
        }
        debug!(system = %id, from = %snapshot.id, "Restored system");
        Ok(id)
    }

    /// Preview `steps` future states at successive real-time deltas without
    /// committing anything.
    pub fn lookahead(&self, id: SystemId, real_dt: f64, steps: usize) -> Result<Vec<DensityMatrix>> {
        validation::validate_time_delta(real_dt)?;
        let (state, dynamics, scale) =
            self.with_entry(id, |e| (Arc::clone(&e.state), Arc::clone(&e.dynamics), e.time_scale))?;
        self.integrator
            .lookahead(&state, &dynamics, real_dt * scale, steps)
            .map_err(|e| step_error(id, e))
    }

    /// Observables of the last committed state.
    pub fn observables(&self, id: SystemId) -> Result<Observables> {
        let state = self.get_state(id)?;
        Observables::of(&state)
    }

    /// Watch channel carrying the committed epoch.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.epoch.subscribe()
    }

    /// Number of committed dispatches so far.
    pub fn epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    pub fn integrator(&self) -> &Integrator {
        &self.integrator
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    pub(crate) fn pending(&self) -> &PendingQueue {
        &self.pending
    }

    /// Serializes dispatches so no two batches integrate from the same
    /// committed state.
    pub(crate) fn dispatch_guard(&self) -> MutexGuard<'_, ()> {
        self.dispatch.lock()
    }

    /// Current state and dynamics of every active system, with `real_dt`
    /// converted by each system's time scale. Ordered by id.
    pub(crate) fn preview_jobs(&self, real_dt: f64) -> Result<Vec<PreviewJob>> {
        validation::validate_time_delta(real_dt)?;
        let systems = self.systems.read();
        let mut jobs: Vec<_> = systems
            .iter()
            .filter(|(_, e)| e.status.is_active())
            .map(|(id, e)| PreviewJob {
                id: *id,
                dt: real_dt * e.time_scale,
                state: Arc::clone(&e.state),
                dynamics: Arc::clone(&e.dynamics),
            })
            .collect();
        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }

    /// Snapshot state and dynamics for every live, active system in `batch`.
    pub(crate) fn prepare(&self, batch: Vec<(SystemId, f64)>) -> Prepared {
        let systems = self.systems.read();
        let mut prepared = Prepared {
            jobs: Vec::with_capacity(batch.len()),
            dropped: 0,
            skipped: 0,
        };
        for (id, dt) in batch {
            match systems.get(&id) {
                None => prepared.dropped += 1,
                Some(entry) if !entry.status.is_active() => prepared.skipped += 1,
                Some(entry) => prepared.jobs.push(Job {
                    id,
                    dt,
                    state: Arc::clone(&entry.state),
                    dynamics: Arc::clone(&entry.dynamics),
                }),
            }
        }
        prepared
    }

    /// Publish a batch of results under one write lock and bump the epoch.
    pub(crate) fn commit(
        &self,
        results: Vec<(SystemId, f64, std::result::Result<Evolution, StepError>)>,
    ) -> Committed {
        let mut committed = Committed::default();
        {
            let mut systems = self.systems.write();
            for (id, dt, outcome) in results {
                let Some(entry) = systems.get_mut(&id) else {
                    committed.discarded += 1;
                    continue;
                };
                match outcome {
                    Ok(evolution) => {
                        entry.state = Arc::new(evolution.state);
                        entry.simulated_time += dt;
                        committed.advanced += 1;
                    }
                    Err(err) => {
                        warn!(system = %id, error = %err, "Simulation diverged; halting system");
                        entry.status = SystemStatus::Diverged {
                            reason: err.to_string(),
                        };
                        committed.diverged.push(id);
                    }
                }
            }
            // Epoch never runs ahead of the published states.
            self.epoch.send_modify(|epoch| *epoch += 1);
        }
        committed.epoch = self.epoch();
        committed
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::from_valid(&EngineConfig::default())
    }
}

pub(crate) fn step_error(id: SystemId, err: StepError) -> Error {
    match err {
        StepError::Diverged(d) => EngineError::SimulationDivergence {
            system: id,
            reason: d.to_string(),
        }
        .into(),
        StepError::Invalid(e) => Error::Validation(e),
    }
}
