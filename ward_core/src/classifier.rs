//! Classification Engine - rule-based triage of a single vitals sample.
//!
//! Each vital is checked against two nested range tables:
//!
//! ```text
//!   ├──── critical ─────────────────────────────┤
//!        ├──── warning ───────────────────┤
//! ```
//!
//! A value outside the critical range is a critical violation; otherwise
//! a value outside the warning range is a warning violation. The two
//! counts are exclusive per vital. The normal table is for display; by
//! default it shares the warning bounds, so "watch-worthy" starts exactly
//! where "normal" ends.
//!
//! Decision (first match wins):
//! 1. **Critical** - two or more critical violations, or a waveform anomaly
//! 2. **Watch** - exactly one critical violation, or two or more warnings
//! 3. **Normal**

use crate::vitals::{Range, VitalSign, VitalsSample, Waveform};
use serde::{Deserialize, Serialize};

/// Triage tier of one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Normal,
    Watch,
    Critical,
}

impl Tier {
    pub fn name(&self) -> &'static str {
        match self {
            Tier::Normal => "normal",
            Tier::Watch => "watch",
            Tier::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Output of [`ClassificationEngine::classify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub tier: Tier,
    pub reason: String,
    pub recommended_action: String,
}

/// One range per vital.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RangeTable {
    pub heart_rate: Range,
    pub systolic_bp: Range,
    pub diastolic_bp: Range,
    pub respiratory_rate: Range,
    pub oxygen_saturation: Range,
    pub temperature: Range,
}

impl RangeTable {
    pub fn get(&self, vital: VitalSign) -> Range {
        match vital {
            VitalSign::HeartRate => self.heart_rate,
            VitalSign::SystolicBp => self.systolic_bp,
            VitalSign::DiastolicBp => self.diastolic_bp,
            VitalSign::RespiratoryRate => self.respiratory_rate,
            VitalSign::OxygenSaturation => self.oxygen_saturation,
            VitalSign::Temperature => self.temperature,
        }
    }
}

/// The three nested range tables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalRanges {
    pub normal: RangeTable,
    pub warning: RangeTable,
    pub critical: RangeTable,
}

impl Default for VitalRanges {
    fn default() -> Self {
        Self {
            normal: RangeTable {
                heart_rate: Range::new(60.0, 100.0),
                systolic_bp: Range::new(90.0, 140.0),
                diastolic_bp: Range::new(60.0, 90.0),
                respiratory_rate: Range::new(12.0, 20.0),
                oxygen_saturation: Range::new(95.0, 100.0),
                temperature: Range::new(36.5, 37.5),
            },
            warning: RangeTable {
                heart_rate: Range::new(60.0, 100.0),
                systolic_bp: Range::new(90.0, 140.0),
                diastolic_bp: Range::new(60.0, 90.0),
                respiratory_rate: Range::new(12.0, 20.0),
                oxygen_saturation: Range::new(95.0, 100.0),
                temperature: Range::new(36.5, 37.5),
            },
            critical: RangeTable {
                heart_rate: Range::new(40.0, 120.0),
                systolic_bp: Range::new(70.0, 180.0),
                diastolic_bp: Range::new(40.0, 110.0),
                respiratory_rate: Range::new(8.0, 30.0),
                oxygen_saturation: Range::new(85.0, 100.0),
                temperature: Range::new(35.5, 38.5),
            },
        }
    }
}

/// Per-vital check outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    Critical,
    Warning,
    WithinRange,
}

pub const NORMAL_REASON: &str = "All vital signs within normal ranges";
pub const NORMAL_ACTION: &str = "Continue monitoring";
pub const WAVEFORM_REASON: &str = "Critical EKG pattern detected";
pub const WAVEFORM_ACTION: &str = "IMMEDIATE: STEMI suspected - Dispatch cardiac team, prepare for PCI";
const GENERIC_CRITICAL_ACTION: &str =
    "IMMEDIATE: Multiple critical vitals - Prepare for emergency intervention, call rapid response";
const GENERIC_WATCH_ACTION: &str = "Increase monitoring frequency to every 15 minutes";
const ACTION_SEPARATOR: &str = " | ";

/// A rule over the set of triggering vitals: every group must have at
/// least one member present.
struct ActionRule {
    requires: &'static [&'static [VitalSign]],
    action: &'static str,
}

impl ActionRule {
    fn matches(&self, triggered: &[VitalSign]) -> bool {
        self.requires
            .iter()
            .all(|group| group.iter().any(|v| triggered.contains(v)))
    }
}

const BLOOD_PRESSURE: &[VitalSign] = &[VitalSign::SystolicBp, VitalSign::DiastolicBp];

/// Combined-pattern actions for Critical, in priority order.
const CRITICAL_RULES: &[ActionRule] = &[
    ActionRule {
        requires: &[&[VitalSign::OxygenSaturation], &[VitalSign::RespiratoryRate]],
        action: "IMMEDIATE: Respiratory failure - Prepare for intubation, call respiratory therapy",
    },
    ActionRule {
        requires: &[&[VitalSign::HeartRate]],
        action: "IMMEDIATE: Cardiac arrest - Prepare for defibrillation, call code blue",
    },
    ActionRule {
        requires: &[BLOOD_PRESSURE],
        action: "IMMEDIATE: Hypertensive crisis - Administer IV antihypertensives, call cardiology",
    },
];

/// Per-vital actions for Watch, concatenated in this order.
const WATCH_RULES: &[ActionRule] = &[
    ActionRule {
        requires: &[&[VitalSign::OxygenSaturation]],
        action: "Administer supplemental oxygen via nasal cannula",
    },
    ActionRule {
        requires: &[&[VitalSign::HeartRate]],
        action: "Monitor cardiac rhythm, consider beta-blockers",
    },
    ActionRule {
        requires: &[BLOOD_PRESSURE],
        action: "Check blood pressure manually, consider antihypertensives",
    },
    ActionRule {
        requires: &[&[VitalSign::Temperature]],
        action: "Monitor for fever/infection, consider antibiotics",
    },
    ActionRule {
        requires: &[&[VitalSign::RespiratoryRate]],
        action: "Assess respiratory effort, consider bronchodilators",
    },
];

/// Pure, total triage classifier.
#[derive(Debug, Clone)]
pub struct ClassificationEngine {
    ranges: VitalRanges,

    /// Max adjacent-sample step above which a waveform is anomalous
    anomaly_threshold: f64,

    /// Waveforms with this many samples or fewer are not analysed
    min_waveform_len: usize,
}

impl Default for ClassificationEngine {
    fn default() -> Self {
        Self::new(VitalRanges::default())
    }
}

impl ClassificationEngine {
    pub fn new(ranges: VitalRanges) -> Self {
        Self {
            ranges,
            anomaly_threshold: 2.0,
            min_waveform_len: 10,
        }
    }

    pub fn with_anomaly_threshold(mut self, threshold: f64) -> Self {
        self.anomaly_threshold = threshold;
        self
    }

    /// The range tables, for display.
    pub fn ranges(&self) -> &VitalRanges {
        &self.ranges
    }

    pub fn violation(&self, vital: VitalSign, value: f64) -> Violation {
        if !self.ranges.critical.get(vital).contains(value) {
            Violation::Critical
        } else if !self.ranges.warning.get(vital).contains(value) {
            Violation::Warning
        } else {
            Violation::WithinRange
        }
    }

    /// Absent, short or malformed waveforms are never anomalous.
    pub fn has_waveform_anomaly(&self, waveform: Option<&Waveform>) -> bool {
        match waveform {
            Some(w) if w.len() > self.min_waveform_len => w
                .max_adjacent_delta()
                .is_some_and(|d| d > self.anomaly_threshold),
            _ => false,
        }
    }

    pub fn classify(&self, sample: &VitalsSample) -> ClassificationResult {
        let mut critical = Vec::new();
        let mut warning = Vec::new();
        for vital in VitalSign::ALL {
            match self.violation(vital, sample.value(vital)) {
                Violation::Critical => critical.push(vital),
                Violation::Warning => warning.push(vital),
                Violation::WithinRange => {}
            }
        }

        if critical.len() >= 2 || self.has_waveform_anomaly(sample.waveform.as_ref()) {
            ClassificationResult {
                tier: Tier::Critical,
                reason: critical_reason(&critical),
                recommended_action: critical_action(&critical),
            }
        } else if critical.len() == 1 || warning.len() >= 2 {
            let triggered: Vec<VitalSign> = warning.iter().chain(critical.iter()).copied().collect();
            ClassificationResult {
                tier: Tier::Watch,
                reason: watch_reason(&triggered),
                recommended_action: watch_action(&triggered),
            }
        } else {
            ClassificationResult {
                tier: Tier::Normal,
                reason: NORMAL_REASON.to_string(),
                recommended_action: NORMAL_ACTION.to_string(),
            }
        }
    }
}

fn critical_reason(critical: &[VitalSign]) -> String {
    match critical {
        [] => WAVEFORM_REASON.to_string(),
        [single] => format!("Critical {} detected", single.title()),
        many => format!(
            "Multiple critical vitals: {}",
            many.iter().map(|v| v.key()).collect::<Vec<_>>().join(", ")
        ),
    }
}

fn critical_action(critical: &[VitalSign]) -> String {
    if critical.is_empty() {
        return WAVEFORM_ACTION.to_string();
    }
    CRITICAL_RULES
        .iter()
        .find(|rule| rule.matches(critical))
        .map_or(GENERIC_CRITICAL_ACTION, |rule| rule.action)
        .to_string()
}

fn watch_reason(triggered: &[VitalSign]) -> String {
    format!(
        "Abnormal vitals detected: {}",
        triggered.iter().map(|v| v.title()).collect::<Vec<_>>().join(", ")
    )
}

fn watch_action(triggered: &[VitalSign]) -> String {
    let actions: Vec<&str> = WATCH_RULES
        .iter()
        .filter(|rule| rule.matches(triggered))
        .map(|rule| rule.action)
        .collect();

    if actions.is_empty() {
        GENERIC_WATCH_ACTION.to_string()
    } else {
        actions.join(ACTION_SEPARATOR)
    }
}
