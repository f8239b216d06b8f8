//! Persistence Gateway - the only blocking I/O in the pipeline.
//!
//! The scheduler treats every implementation as fallible and slow: calls
//! are issued from the blocking pool, and a failed `store_sample` is
//! logged without affecting the broadcast.

use crate::classifier::{ClassificationResult, Tier};
use crate::cohort::{PatientId, PatientProfile};
use crate::vitals::VitalsSample;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Injected failure for patient {0}")]
    Injected(PatientId),
}

/// One persisted vitals record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsRecord {
    pub patient_id: PatientId,
    pub vitals: VitalsSample,
    pub status: Tier,
    pub reason: String,
    pub recommended_action: String,
}

impl VitalsRecord {
    pub fn new(patient_id: PatientId, sample: &VitalsSample, result: &ClassificationResult) -> Self {
        Self {
            patient_id,
            vitals: sample.clone(),
            status: result.tier,
            reason: result.reason.clone(),
            recommended_action: result.recommended_action.clone(),
        }
    }
}

/// Storage seam between the engine and the outside world.
///
/// Methods are synchronous; callers in async code must move them onto
/// the blocking pool.
pub trait PersistenceGateway: Send + Sync {
    fn store_sample(
        &self,
        patient_id: PatientId,
        sample: &VitalsSample,
        result: &ClassificationResult,
    ) -> Result<(), StoreError>;

    /// Returns every stored profile, ordered by id.
    fn load_cohort(&self) -> Result<Vec<PatientProfile>, StoreError>;

    fn store_cohort(&self, patients: &[PatientProfile]) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    patients: BTreeMap<PatientId, PatientProfile>,
    samples: BTreeMap<PatientId, Vec<VitalsRecord>>,
    failing: HashSet<PatientId>,
    fail_all: bool,
}

/// In-process gateway with failure injection.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `store_sample` for `patient_id` fail.
    pub fn fail_for(&self, patient_id: PatientId) {
        if let Ok(mut state) = self.state.lock() {
            state.failing.insert(patient_id);
        }
    }

    /// Makes every gateway call fail (or stop failing).
    pub fn set_fail_all(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_all = fail;
        }
    }

    /// Records stored for one patient, oldest first.
    pub fn samples_for(&self, patient_id: PatientId) -> Vec<VitalsRecord> {
        self.state
            .lock()
            .map(|s| s.samples.get(&patient_id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    /// Total records stored across all patients.
    pub fn sample_count(&self) -> usize {
        self.state
            .lock()
            .map(|s| s.samples.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Storage("memory store lock poisoned".to_string()))
    }
}

impl PersistenceGateway for MemoryStore {
    fn store_sample(
        &self,
        patient_id: PatientId,
        sample: &VitalsSample,
        result: &ClassificationResult,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.fail_all || state.failing.contains(&patient_id) {
            return Err(StoreError::Injected(patient_id));
        }
        state
            .samples
            .entry(patient_id)
            .or_default()
            .push(VitalsRecord::new(patient_id, sample, result));
        Ok(())
    }

    fn load_cohort(&self) -> Result<Vec<PatientProfile>, StoreError> {
        let state = self.lock()?;
        if state.fail_all {
            return Err(StoreError::Storage("cohort unavailable".to_string()));
        }
        Ok(state.patients.values().cloned().collect())
    }

    fn store_cohort(&self, patients: &[PatientProfile]) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.fail_all {
            return Err(StoreError::Storage("cohort unavailable".to_string()));
        }
        for patient in patients {
            state.patients.insert(patient.id, patient.clone());
        }
        Ok(())
    }
}
