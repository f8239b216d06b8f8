//! Cohort registry - the fixed set of simulated patients.
//!
//! Scripted scenarios are resolved here, once, from a declarative
//! [`ScenarioPlan`] (cohort position → scenario). Downstream code only
//! ever looks at `PatientProfile::scenario`.

use crate::store::{PersistenceGateway, StoreError};
use rand::distributions::WeightedIndex;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Stable patient identifier (1-based cohort position).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(pub u32);

impl std::fmt::Display for PatientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

/// How a comorbidity shifts the baseline physiology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modulation {
    /// Wider heart-rate and systolic variance
    Cardiac,
    /// Higher respiratory rate, lower oxygen saturation
    Pulmonary,
    /// Higher baseline temperature
    Metabolic,
}

/// Comorbidity tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Hypertension,
    DiabetesType2,
    Copd,
    HeartDisease,
    Asthma,
    Obesity,
    KidneyDisease,
    LiverDisease,
    Cancer,
    StrokeHistory,
    Dementia,
    Arthritis,
    Depression,
    Anxiety,
    SleepApnea,
    Gerd,
    // Scenario-only
    AcuteMyocardialInfarction,
    HypertensiveCrisis,
    ChronicKidneyDisease,
    CopdExacerbation,
    Pneumonia,
    Sepsis,
    UrinaryTractInfection,
}

/// Conditions a non-scripted patient can be admitted with.
pub const BASELINE_CONDITIONS: [Condition; 16] = [
    Condition::Hypertension,
    Condition::DiabetesType2,
    Condition::Copd,
    Condition::HeartDisease,
    Condition::Asthma,
    Condition::Obesity,
    Condition::KidneyDisease,
    Condition::LiverDisease,
    Condition::Cancer,
    Condition::StrokeHistory,
    Condition::Dementia,
    Condition::Arthritis,
    Condition::Depression,
    Condition::Anxiety,
    Condition::SleepApnea,
    Condition::Gerd,
];

impl Condition {
    pub fn name(&self) -> &'static str {
        match self {
            Condition::Hypertension => "Hypertension",
            Condition::DiabetesType2 => "Diabetes Type 2",
            Condition::Copd => "COPD",
            Condition::HeartDisease => "Heart Disease",
            Condition::Asthma => "Asthma",
            Condition::Obesity => "Obesity",
            Condition::KidneyDisease => "Kidney Disease",
            Condition::LiverDisease => "Liver Disease",
            Condition::Cancer => "Cancer",
            Condition::StrokeHistory => "Stroke History",
            Condition::Dementia => "Dementia",
            Condition::Arthritis => "Arthritis",
            Condition::Depression => "Depression",
            Condition::Anxiety => "Anxiety",
            Condition::SleepApnea => "Sleep Apnea",
            Condition::Gerd => "GERD",
            Condition::AcuteMyocardialInfarction => "Acute Myocardial Infarction",
            Condition::HypertensiveCrisis => "Hypertensive Crisis",
            Condition::ChronicKidneyDisease => "Chronic Kidney Disease",
            Condition::CopdExacerbation => "COPD Exacerbation",
            Condition::Pneumonia => "Pneumonia",
            Condition::Sepsis => "Sepsis",
            Condition::UrinaryTractInfection => "Urinary Tract Infection",
        }
    }

    pub fn modulation(&self) -> Option<Modulation> {
        match self {
            Condition::HeartDisease => Some(Modulation::Cardiac),
            Condition::Copd | Condition::CopdExacerbation => Some(Modulation::Pulmonary),
            Condition::DiabetesType2 => Some(Modulation::Metabolic),
            _ => None,
        }
    }
}

/// A fixed abnormal physiology profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    AcuteMi,
    HypertensiveCrisis,
    RespiratoryDistress,
    Sepsis,
}

impl Scenario {
    pub const ALL: [Scenario; 4] = [
        Scenario::AcuteMi,
        Scenario::HypertensiveCrisis,
        Scenario::RespiratoryDistress,
        Scenario::Sepsis,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::AcuteMi => "acute-mi",
            Scenario::HypertensiveCrisis => "hypertensive-crisis",
            Scenario::RespiratoryDistress => "respiratory-distress",
            Scenario::Sepsis => "sepsis",
        }
    }

    /// Admission conditions recorded for a patient scripted with this scenario.
    pub fn conditions(&self) -> &'static [Condition] {
        match self {
            Scenario::AcuteMi => &[
                Condition::AcuteMyocardialInfarction,
                Condition::Hypertension,
                Condition::DiabetesType2,
            ],
            Scenario::HypertensiveCrisis => &[
                Condition::HypertensiveCrisis,
                Condition::ChronicKidneyDisease,
            ],
            Scenario::RespiratoryDistress => &[
                Condition::CopdExacerbation,
                Condition::Pneumonia,
            ],
            Scenario::Sepsis => &[
                Condition::Sepsis,
                Condition::UrinaryTractInfection,
                Condition::DiabetesType2,
            ],
        }
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "acute-mi" | "ami" | "stemi" => Ok(Scenario::AcuteMi),
            "hypertensive-crisis" | "hypertension" => Ok(Scenario::HypertensiveCrisis),
            "respiratory-distress" | "respiratory" => Ok(Scenario::RespiratoryDistress),
            "sepsis" => Ok(Scenario::Sepsis),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

/// Declarative mapping from cohort position (0-based) to scripted scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioPlan {
    assignments: BTreeMap<usize, Scenario>,
}

impl ScenarioPlan {
    /// A plan with no scripted patients.
    pub fn none() -> Self {
        Self {
            assignments: BTreeMap::new(),
        }
    }

    /// Assigns `scenario` to the patient at `position`, replacing any previous one.
    pub fn assign(mut self, position: usize, scenario: Scenario) -> Self {
        self.assignments.insert(position, scenario);
        self
    }

    pub fn get(&self, position: usize) -> Option<Scenario> {
        self.assignments.get(&position).copied()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Highest assigned position, if any.
    pub fn max_position(&self) -> Option<usize> {
        self.assignments.keys().next_back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, Scenario)> + '_ {
        self.assignments.iter().map(|(p, s)| (*p, *s))
    }

    /// Parses a `<position>=<scenario>` assignment, e.g. `0=acute-mi`.
    pub fn parse_assignment(s: &str) -> Result<(usize, Scenario), String> {
        let (pos, name) = s
            .split_once('=')
            .ok_or_else(|| format!("Expected <position>=<scenario>, got '{}'", s))?;
        let position = pos
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("Invalid position '{}': {}", pos, e))?;
        Ok((position, name.trim().parse()?))
    }
}

impl Default for ScenarioPlan {
    /// The first four cohort members, one per scenario.
    fn default() -> Self {
        Scenario::ALL
            .iter()
            .enumerate()
            .fold(Self::none(), |plan, (i, s)| plan.assign(i, *s))
    }
}

/// Immutable patient record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: PatientId,
    pub name: String,
    pub age: u8,
    pub sex: Sex,
    pub room_id: String,
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<Scenario>,
}

impl PatientProfile {
    pub fn has_modulation(&self, modulation: Modulation) -> bool {
        self.conditions
            .iter()
            .any(|c| c.modulation() == Some(modulation))
    }
}

const FIRST_NAMES: [&str; 24] = [
    "Ada", "Benjamin", "Carmen", "Daniel", "Elena", "Farid", "Grace", "Hiro",
    "Irene", "James", "Keiko", "Luis", "Maya", "Nikolai", "Olivia", "Pedro",
    "Quinn", "Rosa", "Samuel", "Tara", "Umar", "Vera", "Walter", "Yusuf",
];

const LAST_NAMES: [&str; 24] = [
    "Adams", "Baker", "Chen", "Diaz", "Evans", "Fischer", "Garcia", "Hughes",
    "Ito", "Jensen", "Khan", "Lopez", "Moreau", "Novak", "Okafor", "Patel",
    "Quist", "Rossi", "Silva", "Tanaka", "Usman", "Varga", "Walsh", "Young",
];

/// Weights for admitting with 0, 1, 2 or 3 comorbidities.
const CONDITION_COUNT_WEIGHTS: [f64; 4] = [0.3, 0.4, 0.2, 0.1];

/// The fixed cohort, ordered by patient id.
#[derive(Debug, Clone, PartialEq)]
pub struct Cohort {
    patients: Vec<PatientProfile>,
}

impl Cohort {
    /// Builds a fresh cohort of `size` patients.
    pub fn build<R: Rng + ?Sized>(size: usize, plan: &ScenarioPlan, rng: &mut R) -> Self {
        let patients = (0..size)
            .map(|position| Self::build_patient(position, plan.get(position), rng))
            .collect();
        Self { patients }
    }

    /// Wraps existing profiles, sorting them by id.
    pub fn from_profiles(mut patients: Vec<PatientProfile>) -> Self {
        patients.sort_by_key(|p| p.id);
        Self { patients }
    }

    /// Reuses a stored cohort of at least `size` patients, or seeds a new one.
    ///
    /// When seeding, the fresh cohort is written back through the gateway.
    pub fn load_or_seed<R: Rng + ?Sized>(
        gateway: &dyn PersistenceGateway,
        size: usize,
        plan: &ScenarioPlan,
        rng: &mut R,
    ) -> Result<Self, StoreError> {
        let mut existing = gateway.load_cohort()?;
        if existing.len() >= size {
            existing.sort_by_key(|p| p.id);
            existing.truncate(size);
            info!("Using existing {} patients", existing.len());
            return Ok(Self { patients: existing });
        }

        info!("Creating {} new patients", size);
        let cohort = Self::build(size, plan, rng);
        gateway.store_cohort(&cohort.patients)?;
        Ok(cohort)
    }

    fn build_patient<R: Rng + ?Sized>(
        position: usize,
        scenario: Option<Scenario>,
        rng: &mut R,
    ) -> PatientProfile {
        let name = format!(
            "{} {}",
            FIRST_NAMES.choose(rng).copied().unwrap_or("Pat"),
            LAST_NAMES.choose(rng).copied().unwrap_or("Doe"),
        );
        let age = rng.gen_range(45..=85);
        let sex = if rng.gen_bool(0.5) { Sex::Male } else { Sex::Female };

        let conditions = match scenario {
            Some(s) => s.conditions().to_vec(),
            None => {
                let count = WeightedIndex::new(CONDITION_COUNT_WEIGHTS)
                    .map(|w| w.sample(rng))
                    .unwrap_or(0);
                BASELINE_CONDITIONS
                    .choose_multiple(rng, count)
                    .copied()
                    .collect()
            }
        };

        PatientProfile {
            id: PatientId(position as u32 + 1),
            name,
            age,
            sex,
            room_id: format!("Room-{:02}", position + 1),
            conditions,
            scenario,
        }
    }

    pub fn len(&self) -> usize {
        self.patients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patients.is_empty()
    }

    pub fn patients(&self) -> &[PatientProfile] {
        &self.patients
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatientProfile> {
        self.patients.iter()
    }

    pub fn get(&self, id: PatientId) -> Option<&PatientProfile> {
        self.patients.iter().find(|p| p.id == id)
    }

    pub fn ids(&self) -> Vec<PatientId> {
        self.patients.iter().map(|p| p.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashSet;

    #[test]
    fn test_default_plan_scripts_first_four() {
        let plan = ScenarioPlan::default();
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.get(0), Some(Scenario::AcuteMi));
        assert_eq!(plan.get(1), Some(Scenario::HypertensiveCrisis));
        assert_eq!(plan.get(2), Some(Scenario::RespiratoryDistress));
        assert_eq!(plan.get(3), Some(Scenario::Sepsis));
        assert_eq!(plan.get(4), None);
    }

    #[test]
    fn test_build_cohort_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let cohort = Cohort::build(30, &ScenarioPlan::default(), &mut rng);

        assert_eq!(cohort.len(), 30);

        let rooms: HashSet<_> = cohort.iter().map(|p| p.room_id.clone()).collect();
        assert_eq!(rooms.len(), 30);
        assert_eq!(cohort.patients()[0].room_id, "Room-01");
        assert_eq!(cohort.patients()[29].room_id, "Room-30");

        for (i, patient) in cohort.iter().enumerate() {
            assert_eq!(patient.id, PatientId(i as u32 + 1));
            assert!((45..=85).contains(&patient.age));
            assert!(patient.conditions.len() <= 3);
        }

        let first = &cohort.patients()[0];
        assert_eq!(first.scenario, Some(Scenario::AcuteMi));
        assert!(first.conditions.contains(&Condition::AcuteMyocardialInfarction));
        assert!(cohort.patients()[4..].iter().all(|p| p.scenario.is_none()));
    }

    #[test]
    fn test_build_cohort_deterministic() {
        let mut rng1 = ChaCha8Rng::seed_from_u64(7);
        let mut rng2 = ChaCha8Rng::seed_from_u64(7);

        let c1 = Cohort::build(12, &ScenarioPlan::default(), &mut rng1);
        let c2 = Cohort::build(12, &ScenarioPlan::default(), &mut rng2);

        assert_eq!(c1, c2);
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            ScenarioPlan::parse_assignment("5=sepsis"),
            Ok((5, Scenario::Sepsis))
        );
        assert_eq!(
            ScenarioPlan::parse_assignment(" 2 = acute_mi "),
            Ok((2, Scenario::AcuteMi))
        );
        assert!(ScenarioPlan::parse_assignment("sepsis").is_err());
        assert!(ScenarioPlan::parse_assignment("x=sepsis").is_err());
        assert!(ScenarioPlan::parse_assignment("1=flu").is_err());
    }

    #[test]
    fn test_load_or_seed_stores_then_reuses() {
        let store = MemoryStore::new();
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        let seeded = Cohort::load_or_seed(&store, 6, &ScenarioPlan::default(), &mut rng).unwrap();
        assert_eq!(store.load_cohort().unwrap().len(), 6);

        // A different RNG must not matter: the stored cohort wins
        let mut other = ChaCha8Rng::seed_from_u64(999);
        let reused = Cohort::load_or_seed(&store, 6, &ScenarioPlan::none(), &mut other).unwrap();
        assert_eq!(seeded, reused);

        // Asking for fewer reuses the first N by id
        let smaller = Cohort::load_or_seed(&store, 3, &ScenarioPlan::none(), &mut other).unwrap();
        assert_eq!(smaller.ids(), vec![PatientId(1), PatientId(2), PatientId(3)]);
    }

    #[test]
    fn test_profile_serde_roundtrip_keeps_scenario() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let cohort = Cohort::build(2, &ScenarioPlan::default(), &mut rng);
        let json = serde_json::to_string(&cohort.patients()[0]).unwrap();
        let back: PatientProfile = serde_json::from_str(&json).unwrap();

        assert_eq!(back, cohort.patients()[0]);
        assert!(json.contains("\"scenario\":\"acute-mi\""));
    }
}
