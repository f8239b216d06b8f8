//! Scheduler - the periodic generate → classify → persist → broadcast loop.
//!
//! # Lifecycle
//!
//! ```text
//!   Idle ──start()──► Running ──stop()──► Stopped
//!     └──────────────stop()─────────────────┘
//! ```
//!
//! `Stopped` is terminal. Cancellation is cooperative: a stop request
//! never interrupts a tick, but it does cut the inter-tick sleep short.
//!
//! # Tick body
//!
//! 1. For each patient: generate, validate, classify
//! 2. Persist every sample on the blocking pool and wait for all writes
//! 3. Broadcast exactly one `vitals_update` with the full batch
//!
//! A persistence failure only costs that patient's record; the sample
//! still goes out. A validation or encoding failure aborts the tick and
//! the loop backs off before trying again.

use crate::classifier::{ClassificationEngine, ClassificationResult, Tier};
use crate::cohort::{Cohort, PatientId, PatientProfile};
use crate::config::{ConfigError, WardConfig};
use crate::events::{format_timestamp, PatientVitalsEntry, TickBatch, WardEvent};
use crate::generator::VitalsGenerator;
use crate::hub::BroadcastHub;
use crate::store::{PersistenceGateway, StoreError};
use crate::vitals::{VitalsError, VitalsSample};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use ward_env::WardContext;

/// RNG stream used to build a fresh cohort.
pub const COHORT_RNG_STREAM: u64 = 1;

/// RNG stream used for per-tick vitals.
pub const VITALS_RNG_STREAM: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SchedulerState::Idle => "idle",
            SchedulerState::Running => "running",
            SchedulerState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Cannot {op} a scheduler that is {state}")]
    InvalidState {
        op: &'static str,
        state: SchedulerState,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Cohort bootstrap failed: {0}")]
    Bootstrap(#[from] StoreError),
}

/// A failure that aborts the rest of a tick.
#[derive(Debug, Error)]
pub enum TickError {
    #[error("Invalid sample for patient {patient_id}: {source}")]
    InvalidSample {
        patient_id: PatientId,
        source: VitalsError,
    },

    #[error("Failed to encode broadcast: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Patients per tier in one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub normal: usize,
    pub watch: usize,
    pub critical: usize,
}

impl TierCounts {
    pub fn tally(tiers: impl IntoIterator<Item = Tier>) -> Self {
        tiers.into_iter().fold(Self::default(), |mut counts, tier| {
            match tier {
                Tier::Normal => counts.normal += 1,
                Tier::Watch => counts.watch += 1,
                Tier::Critical => counts.critical += 1,
            }
            counts
        })
    }

    pub fn total(&self) -> usize {
        self.normal + self.watch + self.critical
    }
}

/// Summary of one completed tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: u64,
    pub timestamp: String,
    pub patients: usize,
    pub persistence_failures: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub tiers: TierCounts,
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub state: SchedulerState,
    pub cohort_size: usize,
    pub subscribers: usize,
    pub ticks_completed: u64,
    pub last_tick: Option<String>,
}

struct Inner<Ctx: WardContext> {
    ctx: Arc<Ctx>,
    cohort: Cohort,
    generator: VitalsGenerator,
    classifier: ClassificationEngine,
    hub: Arc<BroadcastHub>,
    gateway: Arc<dyn PersistenceGateway>,
    rng: Mutex<ChaCha8Rng>,

    tick_interval: Duration,
    error_backoff: Duration,

    state: Mutex<SchedulerState>,
    shutdown: watch::Sender<bool>,
    ticks: AtomicU64,
    last_tick: Mutex<Option<SystemTime>>,
}

/// Owns the tick loop.
///
/// Generic over the context so the same loop runs against the real clock
/// or a virtual one.
pub struct Scheduler<Ctx: WardContext> {
    inner: Arc<Inner<Ctx>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<Ctx: WardContext> Scheduler<Ctx> {
    /// Builds a scheduler over an already-loaded cohort.
    pub fn new(
        ctx: Arc<Ctx>,
        config: &WardConfig,
        cohort: Cohort,
        hub: Arc<BroadcastHub>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let rng = ctx.derive_rng(VITALS_RNG_STREAM);
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                ctx,
                cohort,
                generator: VitalsGenerator::default(),
                classifier: ClassificationEngine::default(),
                hub,
                gateway,
                rng: Mutex::new(rng),
                tick_interval: config.tick_interval,
                error_backoff: config.error_backoff,
                state: Mutex::new(SchedulerState::Idle),
                shutdown,
                ticks: AtomicU64::new(0),
                last_tick: Mutex::new(None),
            }),
            task: Mutex::new(None),
        })
    }

    /// Loads or seeds the cohort through `gateway`, then builds the scheduler.
    pub fn bootstrap(
        ctx: Arc<Ctx>,
        config: &WardConfig,
        hub: Arc<BroadcastHub>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let mut rng = ctx.derive_rng(COHORT_RNG_STREAM);
        let cohort = Cohort::load_or_seed(
            gateway.as_ref(),
            config.cohort_size,
            &config.scenarios,
            &mut rng,
        )?;
        Self::new(ctx, config, cohort, hub, gateway)
    }

    pub fn cohort(&self) -> &Cohort {
        &self.inner.cohort
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.inner.hub
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.inner.ctx
    }

    pub fn state(&self) -> SchedulerState {
        *lock(&self.inner.state)
    }

    /// Spawns the background loop. Only valid from `Idle`.
    pub fn start(&self) -> Result<(), SchedulerError> {
        {
            let mut state = lock(&self.inner.state);
            if *state != SchedulerState::Idle {
                return Err(SchedulerError::InvalidState {
                    op: "start",
                    state: *state,
                });
            }
            *state = SchedulerState::Running;
        }

        let inner = Arc::clone(&self.inner);
        let handle = self
            .inner
            .ctx
            .spawn("ward-scheduler", async move { inner.run_loop().await });
        *lock(&self.task) = Some(handle);

        info!(
            patients = self.inner.cohort.len(),
            interval_ms = self.inner.tick_interval.as_millis() as u64,
            "Scheduler started"
        );
        Ok(())
    }

    /// Stops the loop and waits for any in-flight tick. Idempotent.
    pub async fn stop(&self) {
        {
            let mut state = lock(&self.inner.state);
            match *state {
                SchedulerState::Stopped => return,
                SchedulerState::Idle => {
                    *state = SchedulerState::Stopped;
                    return;
                }
                SchedulerState::Running => *state = SchedulerState::Stopped,
            }
        }

        self.inner.shutdown.send_replace(true);
        let handle = lock(&self.task).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Scheduler loop ended abnormally: {}", e);
            }
        }
        info!(
            ticks = self.inner.ticks.load(Ordering::Relaxed),
            "Scheduler stopped"
        );
    }

    /// Runs one tick on the caller's task.
    pub async fn run_tick(&self) -> Result<TickReport, TickError> {
        self.inner.run_tick().await
    }

    pub fn status(&self) -> SystemStatus {
        SystemStatus {
            state: self.state(),
            cohort_size: self.inner.cohort.len(),
            subscribers: self.inner.hub.subscriber_count(),
            ticks_completed: self.inner.ticks.load(Ordering::Relaxed),
            last_tick: (*lock(&self.inner.last_tick)).map(format_timestamp),
        }
    }
}

impl<Ctx: WardContext> Inner<Ctx> {
    async fn run_loop(&self) {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            let stopping = *shutdown.borrow_and_update();
            if stopping {
                break;
            }

            let outcome = self.run_tick().await;
            if let Err(e) = &outcome {
                error!("Tick failed: {}", e);
            }
            let pause = self.pause_after(&outcome);

            tokio::select! {
                _ = self.ctx.sleep(pause) => {}
                _ = shutdown.changed() => {}
            }
        }
        debug!("Scheduler loop exited");
    }

    fn pause_after(&self, outcome: &Result<TickReport, TickError>) -> Duration {
        match outcome {
            Ok(_) => self.tick_interval,
            Err(_) => self.error_backoff,
        }
    }

    fn sample_cohort(
        &self,
    ) -> Result<Vec<(&PatientProfile, VitalsSample, ClassificationResult)>, TickError> {
        let mut rng = lock(&self.rng);
        let mut readings = Vec::with_capacity(self.cohort.len());
        for profile in self.cohort.iter() {
            let sample = self.generator.generate(profile, &mut *rng);
            sample.validate().map_err(|source| TickError::InvalidSample {
                patient_id: profile.id,
                source,
            })?;
            let result = self.classifier.classify(&sample);
            readings.push((profile, sample, result));
        }
        Ok(readings)
    }

    /// Persists every reading and returns the number of failed writes.
    async fn persist(&self, readings: &[(&PatientProfile, VitalsSample, ClassificationResult)]) -> usize {
        let mut writes = JoinSet::new();
        for (profile, sample, result) in readings {
            let gateway = Arc::clone(&self.gateway);
            let (id, sample, result) = (profile.id, sample.clone(), result.clone());
            writes.spawn_blocking(move || (id, gateway.store_sample(id, &sample, &result)));
        }

        let mut failures = 0;
        while let Some(joined) = writes.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((id, Err(e))) => {
                    failures += 1;
                    error!(patient_id = %id, "Failed to store vitals: {}", e);
                }
                Err(e) => {
                    failures += 1;
                    error!("Persistence task failed: {}", e);
                }
            }
        }
        failures
    }

    async fn run_tick(&self) -> Result<TickReport, TickError> {
        let tick = self.ticks.load(Ordering::Relaxed) + 1;
        let readings = self.sample_cohort()?;
        let persistence_failures = self.persist(&readings).await;

        let batch: TickBatch = readings
            .into_iter()
            .map(|(profile, sample, result)| {
                (profile.id, PatientVitalsEntry::new(profile, sample, result))
            })
            .collect();
        let patients = batch.len();
        let tiers = TierCounts::tally(batch.values().map(|entry| entry.status));

        let at = self.ctx.system_time();
        let delivery = self.hub.broadcast(&WardEvent::VitalsUpdate { data: batch }, at)?;

        self.ticks.store(tick, Ordering::Relaxed);
        *lock(&self.last_tick) = Some(at);

        if persistence_failures > 0 {
            warn!(tick, persistence_failures, "Tick completed with storage errors");
        }
        info!(
            tick,
            normal = tiers.normal,
            watch = tiers.watch,
            critical = tiers.critical,
            subscribers = delivery.delivered,
            "Tick complete"
        );

        Ok(TickReport {
            tick,
            timestamp: format_timestamp(at),
            patients,
            persistence_failures,
            delivered: delivery.delivered,
            dropped: delivery.dropped,
            tiers,
        })
    }
}
