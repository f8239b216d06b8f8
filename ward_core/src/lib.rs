//! Ward Core - Synthetic Patient Vitals, Rule-Based Triage and Live Fan-Out
//!
//! This library drives a simulated hospital ward:
//! 1. **Cohort**: a fixed set of patient profiles, some scripted with an abnormal scenario
//! 2. **Generator**: plausible vitals + a one-cycle EKG waveform per patient per tick
//! 3. **Classifier**: range-table triage into Normal / Watch / Critical
//! 4. **Hub**: one serialized message per tick, fanned out to every subscriber
//! 5. **Scheduler**: the periodic loop tying them together, with persistence on the side

pub mod vitals;
pub mod cohort;
pub mod generator;
pub mod classifier;
pub mod events;
pub mod hub;
pub mod store;
pub mod sled_store;
pub mod config;
pub mod scheduler;

// Re-export key types for convenience
pub use vitals::{Range, VitalSign, VitalsError, VitalsSample, Waveform};
pub use cohort::{Cohort, Condition, PatientId, PatientProfile, Scenario, ScenarioPlan};
pub use generator::{GeneratorConfig, VitalsGenerator};
pub use classifier::{ClassificationEngine, ClassificationResult, Tier, VitalRanges};
pub use events::{encode, PatientVitalsEntry, TickBatch, WardEvent};
pub use hub::{BroadcastHub, BroadcastReport, HubStats, SubscriberId, Subscription};
pub use store::{MemoryStore, PersistenceGateway, StoreError, VitalsRecord};
pub use sled_store::SledStore;
pub use config::{ConfigError, WardConfig};
pub use scheduler::{
    Scheduler, SchedulerError, SchedulerState, SystemStatus, TickError, TickReport, TierCounts,
};
