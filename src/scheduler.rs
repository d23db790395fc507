// Copyright 2026 Biome Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Batch scheduler.
//!
//! Submissions park in a bounded [`PendingQueue`]; nothing is integrated on
//! submission. At each tick the [`FlushPolicy`] decides whether to dispatch.
//! A dispatch takes the whole batch, integrates every system in parallel on
//! a rayon pool without holding any registry lock, then commits all results
//! at once. Submissions that arrive during a dispatch land in the next batch.
//!
//! [`Scheduler::lookahead_all`] previews every active system several steps
//! ahead on the same pool without committing anything.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::config::SchedulerConfig;
use crate::density::DensityMatrix;
use crate::error::{EngineError, Error, Result, ValidationError};
use crate::observables::Observables;
use crate::registry::{step_error, Job, PreviewJob, Registry, SystemId};

/// Pending simulated deltas keyed by system, bounded by distinct systems.
#[derive(Debug)]
pub struct PendingQueue {
    inner: Mutex<HashMap<SystemId, f64>>,
    capacity: usize,
}

impl PendingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HashMap::with_capacity(capacity)),
            capacity,
        }
    }

    /// Add `dt` for `id`, summing with any delta already pending.
    ///
    /// A system already in the queue always merges; a new system is
    /// rejected with [`EngineError::QueueFull`] once capacity is reached.
    /// A merge that overflows is rejected and leaves the pending delta as is.
    pub fn push(&self, id: SystemId, dt: f64) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(pending) = inner.get_mut(&id) {
            let merged = *pending + dt;
            if !merged.is_finite() {
                return Err(ValidationError::Field {
                    field: "time_delta".into(),
                    message: format!("pending delta {} + {dt} overflows", *pending),
                }
                .into());
            }
            *pending = merged;
            return Ok(());
        }
        if inner.len() >= self.capacity {
            return Err(EngineError::QueueFull {
                capacity: self.capacity,
            }
            .into());
        }
        inner.insert(id, dt);
        Ok(())
    }

    /// Take and clear the whole batch, ordered by id.
    pub fn take(&self) -> Vec<(SystemId, f64)> {
        let drained = std::mem::take(&mut *self.inner.lock());
        let mut batch: Vec<_> = drained.into_iter().collect();
        batch.sort_by_key(|(id, _)| *id);
        batch
    }

    /// Delta currently pending for `id`.
    pub fn get(&self, id: SystemId) -> Option<f64> {
        self.inner.lock().get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// When ticks dispatch the pending batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FlushPolicy {
    EveryTick,
    /// Dispatch on every n-th tick, amortizing work across ticks.
    EveryNTicks(u64),
}

impl FlushPolicy {
    fn due(&self, tick: u64) -> bool {
        match *self {
            FlushPolicy::EveryTick => true,
            FlushPolicy::EveryNTicks(n) => n <= 1 || tick % n == 0,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickReport {
    /// Tick counter (1-based).
    pub tick: u64,
    /// Committed epoch after this tick.
    pub epoch: u64,
    /// Whether this tick dispatched.
    pub flushed: bool,
    /// Systems whose new state was committed.
    pub advanced: usize,
    /// Pending entries for systems no longer registered.
    pub dropped: usize,
    /// Pending entries for systems already diverged.
    pub skipped: usize,
    /// Systems that diverged during this dispatch.
    pub diverged: Vec<SystemId>,
    #[serde(with = "duration_micros")]
    pub elapsed: Duration,
}

/// Uncommitted preview of one system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    /// States at Δt, 2Δt, … in simulated time.
    pub frames: Vec<DensityMatrix>,
    /// Observables of the last frame (of the current state when no steps).
    pub observables: Observables,
}

mod duration_micros {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_micros() as u64)
    }
}

/// Fixed-tick batch scheduler.
pub struct Scheduler {
    policy: FlushPolicy,
    ticks: AtomicU64,
    pool: Option<rayon::ThreadPool>,
}

impl Scheduler {
    /// Build a scheduler; `worker_threads > 0` gets a dedicated rayon pool.
    pub fn new(config: &SchedulerConfig) -> Result<Self> {
        let pool = match config.worker_threads {
            0 => None,
            n => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|i| format!("biome-worker-{i}"))
                    .build()
                    .map_err(|e| Error::Config(format!("failed to build worker pool: {e}")))?,
            ),
        };
        Ok(Self::with_pool(config.flush_policy(), pool))
    }

    /// Scheduler on the global rayon pool.
    pub fn with_policy(policy: FlushPolicy) -> Self {
        Self::with_pool(policy, None)
    }

    fn with_pool(policy: FlushPolicy, pool: Option<rayon::ThreadPool>) -> Self {
        Self {
            policy,
            ticks: AtomicU64::new(0),
            pool,
        }
    }

    pub fn policy(&self) -> FlushPolicy {
        self.policy
    }

    /// Ticks counted so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Count a tick and dispatch if the policy says so or the queue is full.
    pub fn tick(&self, registry: &Registry) -> TickReport {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if self.policy.due(tick) || registry.pending().is_full() {
            let mut report = self.dispatch(registry);
            report.tick = tick;
            report
        } else {
            TickReport {
                tick,
                epoch: registry.epoch(),
                ..TickReport::default()
            }
        }
    }

    /// Integrate and commit everything pending now, regardless of policy.
    ///
    /// Dispatches on one registry are serialized: a second caller waits
    /// until the first batch is committed before taking its own.
    pub fn dispatch(&self, registry: &Registry) -> TickReport {
        let _guard = registry.dispatch_guard();
        let start = Instant::now();
        let batch = registry.pending().take();
        let prepared = registry.prepare(batch);

        let mut report = TickReport {
            tick: self.ticks(),
            epoch: registry.epoch(),
            flushed: true,
            dropped: prepared.dropped,
            skipped: prepared.skipped,
            ..TickReport::default()
        };

        if !prepared.jobs.is_empty() {
            let integrator = *registry.integrator();
            let run = |jobs: &[Job]| {
                jobs.par_iter()
                    .map(|job| {
                        let outcome = integrator.advance(&job.state, &job.dynamics, job.dt);
                        (job.id, job.dt, outcome)
                    })
                    .collect::<Vec<_>>()
            };
            let results = match &self.pool {
                Some(pool) => pool.install(|| run(&prepared.jobs)),
                None => run(&prepared.jobs),
            };

            let committed = registry.commit(results);
            report.advanced = committed.advanced;
            report.dropped += committed.discarded;
            report.diverged = committed.diverged;
            report.epoch = committed.epoch;
        }

        report.elapsed = start.elapsed();
        debug!(
            epoch = report.epoch,
            advanced = report.advanced,
            dropped = report.dropped,
            skipped = report.skipped,
            diverged = report.diverged.len(),
            elapsed_us = report.elapsed.as_micros() as u64,
            "Dispatched batch"
        );
        report
    }

    /// Preview every active system `steps` steps ahead without committing.
    ///
    /// Each system advances by `real_dt` times its own time scale per step.
    /// Systems run in parallel on the scheduler's pool; a failure in one
    /// preview is reported for that system only. Results are ordered by id.
    pub fn lookahead_all(
        &self,
        registry: &Registry,
        real_dt: f64,
        steps: usize,
    ) -> Result<Vec<(SystemId, Result<Preview>)>> {
        let jobs = registry.preview_jobs(real_dt)?;
        let integrator = *registry.integrator();
        let run = |jobs: &[PreviewJob]| {
            jobs.par_iter()
                .map(|job| {
                    let preview = integrator
                        .lookahead(&job.state, &job.dynamics, job.dt, steps)
                        .map_err(|e| step_error(job.id, e))
                        .and_then(|frames| {
                            let last = frames.last().unwrap_or(job.state.as_ref());
                            let observables = Observables::of(last)?;
                            Ok(Preview {
                                frames,
                                observables,
                            })
                        });
                    (job.id, preview)
                })
                .collect::<Vec<_>>()
        };
        let previews = match &self.pool {
            Some(pool) => pool.install(|| run(&jobs)),
            None => run(&jobs),
        };
        debug!(systems = previews.len(), steps, "Computed lookahead");
        Ok(previews)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::with_policy(FlushPolicy::EveryTick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::density::DensityMatrix;
    use crate::lindblad::Dissipator;
    use crate::registry::{SystemSpec, SystemStatus};
    use crate::test_utils::{pauli_x, plus_state, random_density, random_dissipator, random_hermitian};
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use num_complex::Complex64;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::f64::consts::PI;
    use std::sync::Arc;

    fn half_sigma_x() -> Array2<Complex64> {
        pauli_x() * Complex64::new(0.5, 0.0)
    }

    fn random_spec(rng: &mut StdRng, dim: usize) -> SystemSpec {
        SystemSpec::new(dim, random_hermitian(rng, dim, 0.5))
            .with_dissipator(random_dissipator(rng, dim, 0.2))
            .with_initial_state(random_density(rng, dim))
    }

    /// Large anti-Hermitian H: accepted at registration, diverges at dispatch.
    fn runaway_hamiltonian() -> Array2<Complex64> {
        let mut h = Array2::zeros((2, 2));
        h[[0, 1]] = Complex64::new(1e6, 0.0);
        h[[1, 0]] = Complex64::new(-1e6, 0.0);
        h
    }

    /// State of `spec` after ticking each delta through its own registry.
    fn solo_run(spec: &SystemSpec, deltas: &[f64]) -> Arc<DensityMatrix> {
        let registry = Registry::default();
        let scheduler = Scheduler::default();
        let id = registry.register(spec.clone()).unwrap();
        for dt in deltas {
            registry.submit(id, *dt).unwrap();
            scheduler.tick(&registry);
        }
        registry.get_state(id).unwrap()
    }

    #[test]
    fn test_queue_merges_and_bounds() {
        let queue = PendingQueue::new(2);
        queue.push(SystemId(1), 0.1).unwrap();
        queue.push(SystemId(2), 0.2).unwrap();
        // Existing system merges even when full
        queue.push(SystemId(1), 0.05).unwrap();
        assert!(queue.is_full());
        let err = queue.push(SystemId(3), 0.1).unwrap_err();
        assert_eq!(err.to_string(), "Engine error: Pending queue full (2 systems)");

        let batch = queue.take();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].0, SystemId(1));
        assert_relative_eq!(batch[0].1, 0.15, epsilon = 1e-15);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_flush_policy_due() {
        assert!(FlushPolicy::EveryTick.due(7));
        let every_three = FlushPolicy::EveryNTicks(3);
        assert!(!every_three.due(1));
        assert!(!every_three.due(2));
        assert!(every_three.due(3));
        assert!(every_three.due(6));
    }

    #[test]
    fn test_nothing_happens_on_submit() {
        let registry = Registry::default();
        let id = registry.register(SystemSpec::new(2, pauli_x())).unwrap();
        registry.submit(id, 0.5).unwrap();
        assert_eq!(*registry.get_state(id).unwrap(), DensityMatrix::ground(2));
        assert_eq!(registry.epoch(), 0);
    }

    #[test]
    fn test_tick_commits_and_bumps_epoch() {
        let registry = Registry::default();
        let id = registry.register(SystemSpec::new(2, half_sigma_x())).unwrap();
        let mut rx = registry.subscribe();
        registry.submit(id, PI).unwrap();

        let report = Scheduler::default().tick(&registry);
        assert_eq!(report.tick, 1);
        assert!(report.flushed);
        assert_eq!(report.advanced, 1);
        assert_eq!(report.epoch, 1);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);

        // Rabi: H = σx/2 flips |0⟩ to |1⟩ after t = π
        assert_relative_eq!(registry.get_state(id).unwrap().population(1), 1.0, epsilon = 1e-6);
        assert_relative_eq!(registry.simulated_time(id).unwrap(), PI, epsilon = 1e-15);
    }

    #[test]
    fn test_readers_keep_previous_snapshot() {
        let registry = Registry::default();
        let id = registry.register(SystemSpec::new(2, pauli_x())).unwrap();
        let before = registry.get_state(id).unwrap();
        registry.submit(id, 0.3).unwrap();
        Scheduler::default().tick(&registry);
        let after = registry.get_state(id).unwrap();
        assert_eq!(*before, DensityMatrix::ground(2));
        assert!(!Arc::ptr_eq(&before, &after));
    }

    #[test]
    fn test_empty_tick_does_not_bump_epoch() {
        let registry = Registry::default();
        let report = Scheduler::default().tick(&registry);
        assert!(report.flushed);
        assert_eq!(report.advanced, 0);
        assert_eq!(report.epoch, 0);
    }

    #[test]
    fn test_every_n_ticks_amortizes() {
        let registry = Registry::default();
        let id = registry.register(SystemSpec::new(2, pauli_x())).unwrap();
        let scheduler = Scheduler::with_policy(FlushPolicy::EveryNTicks(3));

        for _ in 0..2 {
            registry.submit(id, 0.1).unwrap();
            let report = scheduler.tick(&registry);
            assert!(!report.flushed);
        }
        registry.submit(id, 0.1).unwrap();
        let report = scheduler.tick(&registry);
        assert_eq!(report.tick, 3);
        assert!(report.flushed);
        assert_eq!(report.advanced, 1);
        assert_relative_eq!(registry.simulated_time(id).unwrap(), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_full_queue_forces_flush() {
        let mut config = EngineConfig::default();
        config.scheduler.max_pending = 1;
        let registry = Registry::new(&config).unwrap();
        let a = registry.register(SystemSpec::new(2, pauli_x())).unwrap();
        let b = registry.register(SystemSpec::new(2, pauli_x())).unwrap();
        let scheduler = Scheduler::with_policy(FlushPolicy::EveryNTicks(100));

        registry.submit(a, 0.1).unwrap();
        assert!(registry.submit(b, 0.1).is_err());
        let report = scheduler.tick(&registry);
        assert!(report.flushed);
        assert_eq!(report.advanced, 1);
        assert!(registry.submit(b, 0.1).unwrap());
    }

    #[test]
    fn test_unregistered_while_pending_is_dropped() {
        let registry = Registry::default();
        let keep = registry.register(SystemSpec::new(2, pauli_x())).unwrap();
        let gone = registry.register(SystemSpec::new(2, pauli_x())).unwrap();
        registry.submit(keep, 0.1).unwrap();
        registry.submit(gone, 0.1).unwrap();
        registry.unregister(gone);

        let report = Scheduler::default().tick(&registry);
        assert_eq!(report.advanced, 1);
        assert_eq!(report.dropped, 1);
        assert!(registry.get_state(gone).is_err());
    }

    #[test]
    fn test_zero_delta_submission_is_idempotent() {
        let registry = Registry::default();
        let mut rng = StdRng::seed_from_u64(4);
        let id = registry.register(random_spec(&mut rng, 4)).unwrap();
        let before = registry.get_state(id).unwrap();
        registry.submit(id, 0.0).unwrap();
        Scheduler::default().tick(&registry);
        assert_eq!(*registry.get_state(id).unwrap(), *before);
        assert_eq!(registry.simulated_time(id).unwrap(), 0.0);
    }

    #[test]
    fn test_divergence_isolated_to_one_system() {
        let registry = Registry::default();
        let healthy = registry.register(SystemSpec::new(2, pauli_x())).unwrap();
        let broken = registry
            .register(SystemSpec::new(2, runaway_hamiltonian()).with_initial_state(plus_state()))
            .unwrap();

        let scheduler = Scheduler::default();
        registry.submit(healthy, 0.1).unwrap();
        registry.submit(broken, 0.1).unwrap();
        let report = scheduler.tick(&registry);
        assert_eq!(report.advanced, 1);
        assert_eq!(report.diverged, vec![broken]);
        assert!(matches!(
            registry.status(broken).unwrap(),
            SystemStatus::Diverged { .. }
        ));
        // Last good state is kept
        assert_eq!(
            *registry.get_state(broken).unwrap(),
            crate::test_utils::plus_state()
        );

        // Further submissions are accepted and ignored
        registry.submit(healthy, 0.1).unwrap();
        assert!(registry.submit(broken, 0.1).unwrap());
        let report = scheduler.tick(&registry);
        assert_eq!(report.advanced, 1);
        assert_eq!(report.skipped, 1);
        assert!(report.diverged.is_empty());
        assert_relative_eq!(registry.simulated_time(healthy).unwrap(), 0.2, epsilon = 1e-12);
        assert_eq!(registry.simulated_time(broken).unwrap(), 0.0);
    }

    #[test]
    fn test_time_scale_consistency() {
        let registry = Registry::default();
        let spec = SystemSpec::new(4, Array2::zeros((4, 4)))
            .with_dissipator(Dissipator::lowering(4, 1.0).unwrap())
            .with_initial_state(DensityMatrix::basis(4, 3).unwrap());
        let fast = registry.register(spec.clone().with_time_scale(2.0)).unwrap();
        let slow = registry.register(spec).unwrap();

        registry.submit(fast, 0.1).unwrap();
        registry.submit(slow, 0.1).unwrap();
        registry.submit(slow, 0.1).unwrap();
        Scheduler::default().tick(&registry);

        assert_eq!(registry.get_state(fast).unwrap(), registry.get_state(slow).unwrap());
        assert_eq!(
            registry.simulated_time(fast).unwrap(),
            registry.simulated_time(slow).unwrap()
        );
    }

    #[test]
    fn test_batch_order_independence() {
        let mut rng = StdRng::seed_from_u64(21);
        let specs: Vec<_> = (0..4).map(|k| random_spec(&mut rng, 2 << (k % 2))).collect();
        let deltas = [0.03, 0.05, 0.02, 0.04];

        let forward = Registry::default();
        let ids: Vec<_> = specs.iter().map(|s| forward.register(s.clone()).unwrap()).collect();
        for (id, dt) in ids.iter().zip(deltas) {
            forward.submit(*id, dt).unwrap();
        }
        Scheduler::default().tick(&forward);

        let reverse = Registry::default();
        let rev_ids: Vec<_> = specs
            .iter()
            .rev()
            .map(|s| reverse.register(s.clone()).unwrap())
            .collect();
        for (id, dt) in rev_ids.iter().zip(deltas.iter().rev()) {
            reverse.submit(*id, *dt).unwrap();
        }
        Scheduler::with_policy(FlushPolicy::EveryTick).tick(&reverse);

        for (k, (a, b)) in ids.iter().zip(rev_ids.iter().rev()).enumerate() {
            let batched = forward.get_state(*a).unwrap();
            assert_eq!(batched, reverse.get_state(*b).unwrap());
            assert_eq!(batched, solo_run(&specs[k], &[deltas[k]]), "system {k}");
        }
    }

    #[test]
    fn test_dedicated_pool() {
        let config = SchedulerConfig {
            worker_threads: 2,
            ..SchedulerConfig::default()
        };
        let scheduler = Scheduler::new(&config).unwrap();
        let registry = Registry::default();
        let id = registry.register(SystemSpec::new(2, pauli_x())).unwrap();
        registry.submit(id, 0.1).unwrap();
        assert_eq!(scheduler.tick(&registry).advanced, 1);
    }

    #[test]
    fn test_twelve_biome_scenario() {
        let mut rng = StdRng::seed_from_u64(12);
        let registry = Registry::default();
        let specs: Vec<_> = (0..12)
            .map(|k| random_spec(&mut rng, if k % 2 == 0 { 16 } else { 32 }))
            .collect();
        let ids: Vec<_> = specs
            .iter()
            .map(|spec| registry.register(spec.clone()).unwrap())
            .collect();

        let scheduler = Scheduler::default();
        let mut deltas = vec![Vec::new(); ids.len()];
        for _ in 0..3 {
            for (k, id) in ids.iter().enumerate() {
                let dt = rng.gen_range(0.02..0.04);
                registry.submit(*id, dt).unwrap();
                deltas[k].push(dt);
            }
            let report = scheduler.tick(&registry);
            assert_eq!(report.advanced, 12);
            assert!(report.diverged.is_empty());

            for id in &ids {
                registry.get_state(*id).unwrap().validate(1e-6).unwrap();
            }
        }
        for (k, id) in ids.iter().enumerate() {
            assert_relative_eq!(
                registry.simulated_time(*id).unwrap(),
                deltas[k].iter().sum::<f64>(),
                epsilon = 1e-12
            );
            // Batched result equals the same system run alone
            assert_eq!(
                registry.get_state(*id).unwrap(),
                solo_run(&specs[k], &deltas[k]),
                "system {k}"
            );
        }
        assert_eq!(registry.epoch(), 3);
    }

    #[test]
    fn test_overlapping_dispatches_never_lose_time() {
        let mut rng = StdRng::seed_from_u64(30);
        let spec = random_spec(&mut rng, 16);
        let registry = Registry::default();
        let scheduler = Scheduler::default();
        let id = registry.register(spec.clone()).unwrap();

        registry.submit(id, 5.0).unwrap();
        std::thread::scope(|s| {
            let first = s.spawn(|| scheduler.dispatch(&registry));
            // The first dispatch has taken its batch once the queue drains
            while !registry.pending().is_empty() {
                std::thread::yield_now();
            }
            registry.submit(id, 0.02).unwrap();
            let second = scheduler.dispatch(&registry);
            let first = first.join().unwrap();
            assert_eq!(first.advanced + second.advanced, 2);
        });

        assert_relative_eq!(registry.simulated_time(id).unwrap(), 5.02, epsilon = 1e-12);
        assert_eq!(registry.get_state(id).unwrap(), solo_run(&spec, &[5.0, 0.02]));
        assert_eq!(registry.epoch(), 2);
    }

    #[test]
    fn test_lookahead_all_matches_per_system_preview() {
        let mut rng = StdRng::seed_from_u64(33);
        let registry = Registry::default();
        let a = registry.register(random_spec(&mut rng, 4)).unwrap();
        let b = registry
            .register(random_spec(&mut rng, 8).with_time_scale(2.5))
            .unwrap();
        let c = registry.register(SystemSpec::new(2, half_sigma_x())).unwrap();
        let scheduler = Scheduler::new(&SchedulerConfig {
            worker_threads: 2,
            ..SchedulerConfig::default()
        })
        .unwrap();

        let previews = scheduler.lookahead_all(&registry, 0.05, 4).unwrap();
        let ids: Vec<_> = previews.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![a, b, c]);
        for (id, preview) in previews {
            let preview = preview.unwrap();
            let expected = registry.lookahead(id, 0.05, 4).unwrap();
            assert_eq!(preview.frames, expected);
            assert_eq!(preview.observables, Observables::of(&expected[3]).unwrap());
        }

        // Nothing committed
        assert_eq!(registry.epoch(), 0);
        assert_eq!(registry.simulated_time(b).unwrap(), 0.0);
        assert_eq!(*registry.get_state(c).unwrap(), DensityMatrix::ground(2));
    }

    #[test]
    fn test_lookahead_all_isolates_failures() {
        let registry = Registry::default();
        let scheduler = Scheduler::default();
        let healthy = registry.register(SystemSpec::new(2, pauli_x())).unwrap();
        let halted = registry
            .register(SystemSpec::new(2, runaway_hamiltonian()).with_initial_state(plus_state()))
            .unwrap();
        registry.submit(halted, 0.1).unwrap();
        scheduler.tick(&registry);
        let runaway = registry
            .register(SystemSpec::new(2, runaway_hamiltonian()).with_initial_state(plus_state()))
            .unwrap();

        let previews = scheduler.lookahead_all(&registry, 0.1, 2).unwrap();
        assert_eq!(previews.len(), 2);
        assert_eq!(previews[0].0, healthy);
        assert_eq!(previews[0].1.as_ref().unwrap().frames.len(), 2);
        assert_eq!(previews[1].0, runaway);
        assert!(matches!(
            previews[1].1,
            Err(Error::Engine(EngineError::SimulationDivergence { .. }))
        ));
        // Preview failures do not halt the system
        assert!(registry.status(runaway).unwrap().is_active());

        let still = scheduler.lookahead_all(&registry, 0.1, 0).unwrap();
        let preview = still[0].1.as_ref().unwrap();
        assert!(preview.frames.is_empty());
        assert_eq!(preview.observables, registry.observables(healthy).unwrap());

        assert!(matches!(
            scheduler.lookahead_all(&registry, -1.0, 2),
            Err(Error::Validation(ValidationError::NegativeTimeDelta(_)))
        ));
    }

    #[test]
    fn test_queue_rejects_overflowing_merge() {
        let queue = PendingQueue::new(4);
        queue.push(SystemId(1), f64::MAX).unwrap();
        let err = queue.push(SystemId(1), f64::MAX).unwrap_err();
        assert!(matches!(
            err,
            Error::Validation(ValidationError::Field { .. })
        ));
        assert_eq!(queue.get(SystemId(1)), Some(f64::MAX));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_invariants_hold_after_every_dispatch(
            seed in any::<u64>(),
            deltas in prop::collection::vec(0.0f64..0.08, 1..6),
        ) {
            let mut rng = StdRng::seed_from_u64(seed);
            let registry = Registry::default();
            let id = registry.register(random_spec(&mut rng, 4)).unwrap();
            let scheduler = Scheduler::default();

            let mut total = 0.0;
            for dt in deltas {
                registry.submit(id, dt).unwrap();
                total += dt;
                scheduler.tick(&registry);
                let state = registry.get_state(id).unwrap();
                prop_assert!(state.validate(1e-6).is_ok());
            }
            prop_assert!((registry.simulated_time(id).unwrap() - total).abs() < 1e-12);
        }
    }
}
