//! Wire events pushed to subscribers.
//!
//! Every message is a JSON object tagged with `type` and stamped with an
//! RFC 3339 `timestamp`:
//!
//! ```json
//! {"type": "vitals_update", "data": {"1": {...}}, "timestamp": "2024-01-01T00:00:03.000Z"}
//! ```

use crate::classifier::{ClassificationResult, Tier};
use crate::cohort::{PatientId, PatientProfile};
use crate::vitals::VitalsSample;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// One patient's row in a `vitals_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientVitalsEntry {
    pub patient_id: PatientId,
    pub patient_name: String,
    pub room_id: String,
    pub vitals: VitalsSample,
    pub status: Tier,
    pub reason: String,
    pub recommended_action: String,
}

impl PatientVitalsEntry {
    pub fn new(profile: &PatientProfile, vitals: VitalsSample, result: ClassificationResult) -> Self {
        Self {
            patient_id: profile.id,
            patient_name: profile.name.clone(),
            room_id: profile.room_id.clone(),
            vitals,
            status: result.tier,
            reason: result.reason,
            recommended_action: result.recommended_action,
        }
    }
}

/// All patients' entries for one tick, keyed by patient id.
pub type TickBatch = BTreeMap<PatientId, PatientVitalsEntry>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub patient_id: PatientId,
    pub status: Tier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreatmentType {
    Medication,
    Procedure,
    Monitoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreatmentOutcome {
    Accepted,
    Modified,
    Ignored,
}

/// A clinician's response to a recommended treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentDecision {
    pub patient_id: PatientId,
    pub treatment_type: TreatmentType,
    pub treatment_description: String,
    pub prescribed_by: String,
    pub decision: TreatmentOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchPriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchOutcome {
    Confirmed,
    Denied,
    Wait,
}

/// A response to a request to send a team or transfer a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchDecision {
    pub patient_id: PatientId,
    pub dispatch_type: String,
    pub destination: String,
    pub priority: DispatchPriority,
    pub decision: DispatchOutcome,
    pub reason: String,
    pub confirmed_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Closed set of messages a subscriber can receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WardEvent {
    VitalsUpdate { data: TickBatch },
    StatusChange(StatusChange),
    TreatmentDecision { data: TreatmentDecision },
    DispatchDecision { data: DispatchDecision },
}

impl WardEvent {
    /// The `type` tag this event serializes with.
    pub fn kind(&self) -> &'static str {
        match self {
            WardEvent::VitalsUpdate { .. } => "vitals_update",
            WardEvent::StatusChange(_) => "status_change",
            WardEvent::TreatmentDecision { .. } => "treatment_decision",
            WardEvent::DispatchDecision { .. } => "dispatch_decision",
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    #[serde(flatten)]
    event: &'a WardEvent,
    timestamp: String,
}

/// RFC 3339 UTC with millisecond precision.
pub fn format_timestamp(at: SystemTime) -> String {
    DateTime::<Utc>::from(at).to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Serializes `event` into its wire text, stamped with `at`.
pub fn encode(event: &WardEvent, at: SystemTime) -> Result<String, serde_json::Error> {
    serde_json::to_string(&Envelope {
        event,
        timestamp: format_timestamp(at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::Sex;
    use std::time::{Duration, UNIX_EPOCH};

    fn at() -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(1_704_067_203_250)
    }

    fn profile() -> PatientProfile {
        PatientProfile {
            id: PatientId(3),
            name: "Rosa Chen".to_string(),
            age: 71,
            sex: Sex::Female,
            room_id: "Room-03".to_string(),
            conditions: vec![],
            scenario: None,
        }
    }

    #[test]
    fn test_vitals_update_wire_shape() {
        let sample = VitalsSample::new(75.0, 120.0, 80.0, 16.0, 98.0, 37.0).with_waveform(vec![0.1, 0.2]);
        let result = ClassificationResult {
            tier: Tier::Normal,
            reason: "All vital signs within normal ranges".to_string(),
            recommended_action: "Continue monitoring".to_string(),
        };
        let mut batch = TickBatch::new();
        batch.insert(PatientId(3), PatientVitalsEntry::new(&profile(), sample, result));

        let text = encode(&WardEvent::VitalsUpdate { data: batch }, at()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(json["type"], "vitals_update");
        assert_eq!(json["timestamp"], "2024-01-01T00:00:03.250Z");
        let entry = &json["data"]["3"];
        assert_eq!(entry["patient_id"], 3);
        assert_eq!(entry["patient_name"], "Rosa Chen");
        assert_eq!(entry["room_id"], "Room-03");
        assert_eq!(entry["status"], "normal");
        assert_eq!(entry["vitals"]["oxygen_saturation"], 98.0);
        assert_eq!(entry["vitals"]["ekg_data"], serde_json::json!([0.1, 0.2]));
    }

    #[test]
    fn test_missing_waveform_is_omitted() {
        let sample = VitalsSample::new(75.0, 120.0, 80.0, 16.0, 98.0, 37.0);
        let json = serde_json::to_value(&sample).unwrap();
        assert!(json.get("ekg_data").is_none());
    }

    #[test]
    fn test_status_change_is_flat() {
        let event = WardEvent::StatusChange(StatusChange {
            patient_id: PatientId(1),
            status: Tier::Critical,
            reason: None,
        });
        let json: serde_json::Value = serde_json::from_str(&encode(&event, at()).unwrap()).unwrap();

        assert_eq!(json["type"], "status_change");
        assert_eq!(json["patient_id"], 1);
        assert_eq!(json["status"], "critical");
        assert!(json.get("reason").is_none());
        assert_eq!(event.kind(), "status_change");
    }

    #[test]
    fn test_decisions_use_lowercase_enums() {
        let treatment = WardEvent::TreatmentDecision {
            data: TreatmentDecision {
                patient_id: PatientId(2),
                treatment_type: TreatmentType::Medication,
                treatment_description: "IV labetalol".to_string(),
                prescribed_by: "Dr. Okafor".to_string(),
                decision: TreatmentOutcome::Modified,
                notes: Some("half dose".to_string()),
            },
        };
        let json: serde_json::Value = serde_json::from_str(&encode(&treatment, at()).unwrap()).unwrap();
        assert_eq!(json["type"], "treatment_decision");
        assert_eq!(json["data"]["treatment_type"], "medication");
        assert_eq!(json["data"]["decision"], "modified");

        let dispatch = WardEvent::DispatchDecision {
            data: DispatchDecision {
                patient_id: PatientId(1),
                dispatch_type: "cardiac_team".to_string(),
                destination: "Cath Lab".to_string(),
                priority: DispatchPriority::Critical,
                decision: DispatchOutcome::Wait,
                reason: "Lab occupied".to_string(),
                confirmed_by: "Charge Nurse".to_string(),
                notes: None,
            },
        };
        let json: serde_json::Value = serde_json::from_str(&encode(&dispatch, at()).unwrap()).unwrap();
        assert_eq!(json["data"]["priority"], "critical");
        assert_eq!(json["data"]["decision"], "wait");
        assert!(json["data"].get("notes").is_none());
    }

    #[test]
    fn test_status_change_parses_back() {
        let event = WardEvent::StatusChange(StatusChange {
            patient_id: PatientId(9),
            status: Tier::Watch,
            reason: Some("Abnormal vitals detected: Temperature".to_string()),
        });
        let text = serde_json::to_string(&event).unwrap();
        let back: WardEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
    }
}
