//! Sled-backed persistence gateway.
//!
//! Two trees, JSON-encoded values:
//! - `patients`: `id (u32 BE)` → `PatientProfile`
//! - `vitals`: `id (u32 BE) ++ seq (u64 BE)` → `VitalsRecord`
//!
//! Big-endian keys keep both trees iterable in id (then insertion) order.

use crate::classifier::ClassificationResult;
use crate::cohort::{PatientId, PatientProfile};
use crate::store::{PersistenceGateway, StoreError, VitalsRecord};
use crate::vitals::VitalsSample;
use std::path::Path;

const PATIENTS_TREE: &str = "patients";
const VITALS_TREE: &str = "vitals";

/// Embedded on-disk store.
pub struct SledStore {
    db: sled::Db,
    patients: sled::Tree,
    vitals: sled::Tree,
}

impl SledStore {
    /// Open a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = sled::open(path)
            .map_err(|e| StoreError::Storage(format!("Failed to open sled DB: {}", e)))?;
        Self::from_db(db)
    }

    /// Create a temporary store (for testing)
    #[cfg(test)]
    pub fn open_temp() -> Result<Self, StoreError> {
        let config = sled::Config::new().temporary(true);
        let db = config
            .open()
            .map_err(|e| StoreError::Storage(format!("Failed to open temp DB: {}", e)))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        let patients = db
            .open_tree(PATIENTS_TREE)
            .map_err(|e| StoreError::Storage(format!("Failed to open tree: {}", e)))?;
        let vitals = db
            .open_tree(VITALS_TREE)
            .map_err(|e| StoreError::Storage(format!("Failed to open tree: {}", e)))?;
        Ok(Self { db, patients, vitals })
    }

    /// Stored vitals for one patient, oldest first.
    pub fn samples_for(&self, patient_id: PatientId) -> Result<Vec<VitalsRecord>, StoreError> {
        let mut records = Vec::new();
        for entry in self.vitals.scan_prefix(patient_id.0.to_be_bytes()) {
            let (_, value) =
                entry.map_err(|e| StoreError::Storage(format!("Iteration failed: {}", e)))?;
            records.push(decode(&value)?);
        }
        Ok(records)
    }

    /// Total vitals records on disk.
    pub fn sample_count(&self) -> usize {
        self.vitals.len()
    }

    fn vitals_key(&self, patient_id: PatientId) -> Result<[u8; 12], StoreError> {
        let seq = self
            .db
            .generate_id()
            .map_err(|e| StoreError::Storage(format!("Sequence failed: {}", e)))?;
        let mut key = [0u8; 12];
        key[..4].copy_from_slice(&patient_id.0.to_be_bytes());
        key[4..].copy_from_slice(&seq.to_be_bytes());
        Ok(key)
    }
}

impl PersistenceGateway for SledStore {
    fn store_sample(
        &self,
        patient_id: PatientId,
        sample: &VitalsSample,
        result: &ClassificationResult,
    ) -> Result<(), StoreError> {
        let key = self.vitals_key(patient_id)?;
        let value = encode(&VitalsRecord::new(patient_id, sample, result))?;
        self.vitals
            .insert(key, value)
            .map_err(|e| StoreError::Storage(format!("Insert failed: {}", e)))?;
        Ok(())
    }

    fn load_cohort(&self) -> Result<Vec<PatientProfile>, StoreError> {
        let mut patients = Vec::new();
        for entry in self.patients.iter() {
            let (_, value) =
                entry.map_err(|e| StoreError::Storage(format!("Iteration failed: {}", e)))?;
            patients.push(decode(&value)?);
        }
        Ok(patients)
    }

    fn store_cohort(&self, patients: &[PatientProfile]) -> Result<(), StoreError> {
        for patient in patients {
            self.patients
                .insert(patient.id.0.to_be_bytes(), encode(patient)?)
                .map_err(|e| StoreError::Storage(format!("Insert failed: {}", e)))?;
        }
        self.db
            .flush()
            .map_err(|e| StoreError::Storage(format!("Flush failed: {}", e)))?;
        Ok(())
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Encoding(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassificationEngine, Tier};
    use crate::cohort::{Cohort, ScenarioPlan};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_cohort_persists_in_id_order() {
        let store = SledStore::open_temp().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(10);
        // More than 255 patients so a little-endian key would misorder them
        let cohort = Cohort::build(300, &ScenarioPlan::default(), &mut rng);

        store.store_cohort(cohort.patients()).unwrap();
        let loaded = store.load_cohort().unwrap();

        assert_eq!(loaded.len(), 300);
        assert_eq!(loaded, cohort.patients().to_vec());
    }

    #[test]
    fn test_samples_are_keyed_by_patient_then_sequence() {
        let store = SledStore::open_temp().unwrap();
        let engine = ClassificationEngine::default();

        let first = VitalsSample::new(75.0, 120.0, 80.0, 16.0, 98.0, 37.0);
        let second = VitalsSample::new(130.0, 190.0, 80.0, 16.0, 98.0, 37.0)
            .with_waveform(vec![0.0; 50]);

        store.store_sample(PatientId(1), &first, &engine.classify(&first)).unwrap();
        store.store_sample(PatientId(2), &first, &engine.classify(&first)).unwrap();
        store.store_sample(PatientId(1), &second, &engine.classify(&second)).unwrap();

        let records = store.samples_for(PatientId(1)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].vitals, first);
        assert_eq!(records[1].vitals, second);
        assert_eq!(records[1].status, Tier::Critical);
        assert_eq!(store.sample_count(), 3);
    }

    #[test]
    fn test_empty_store_has_no_cohort() {
        let store = SledStore::open_temp().unwrap();
        assert!(store.load_cohort().unwrap().is_empty());
    }
}
