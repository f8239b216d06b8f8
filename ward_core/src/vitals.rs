//! Vital-sign samples, their physiologic clamp bounds and validation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of points in one synthetic cardiac cycle.
pub const WAVEFORM_LEN: usize = 50;

/// Inclusive numeric range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Returns true if `value` lies inside the range (bounds included).
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

/// The six scalar vitals carried by every sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalSign {
    HeartRate,
    SystolicBp,
    DiastolicBp,
    RespiratoryRate,
    OxygenSaturation,
    Temperature,
}

impl VitalSign {
    /// All vitals, in evaluation order.
    pub const ALL: [VitalSign; 6] = [
        VitalSign::HeartRate,
        VitalSign::SystolicBp,
        VitalSign::DiastolicBp,
        VitalSign::RespiratoryRate,
        VitalSign::OxygenSaturation,
        VitalSign::Temperature,
    ];

    /// Wire/storage key.
    pub fn key(&self) -> &'static str {
        match self {
            VitalSign::HeartRate => "heart_rate",
            VitalSign::SystolicBp => "systolic_bp",
            VitalSign::DiastolicBp => "diastolic_bp",
            VitalSign::RespiratoryRate => "respiratory_rate",
            VitalSign::OxygenSaturation => "oxygen_saturation",
            VitalSign::Temperature => "temperature",
        }
    }

    /// Human-readable title used in classification reasons.
    pub fn title(&self) -> &'static str {
        match self {
            VitalSign::HeartRate => "Heart Rate",
            VitalSign::SystolicBp => "Systolic Bp",
            VitalSign::DiastolicBp => "Diastolic Bp",
            VitalSign::RespiratoryRate => "Respiratory Rate",
            VitalSign::OxygenSaturation => "Oxygen Saturation",
            VitalSign::Temperature => "Temperature",
        }
    }

    /// Hard physiologic floor/ceiling every generated value is clamped to.
    ///
    /// These are design constants, not measured limits.
    pub fn clamp_bounds(&self) -> Range {
        match self {
            VitalSign::HeartRate => Range::new(40.0, 180.0),
            VitalSign::SystolicBp => Range::new(70.0, 200.0),
            VitalSign::DiastolicBp => Range::new(40.0, 120.0),
            VitalSign::RespiratoryRate => Range::new(8.0, 30.0),
            VitalSign::OxygenSaturation => Range::new(85.0, 100.0),
            VitalSign::Temperature => Range::new(35.5, 39.0),
        }
    }

    pub fn is_blood_pressure(&self) -> bool {
        matches!(self, VitalSign::SystolicBp | VitalSign::DiastolicBp)
    }
}

impl std::fmt::Display for VitalSign {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// One synthetic cardiac cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Waveform(pub Vec<f64>);

impl Waveform {
    pub fn samples(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Largest absolute difference between consecutive samples.
    ///
    /// Returns `None` for fewer than two samples or any non-finite sample.
    pub fn max_adjacent_delta(&self) -> Option<f64> {
        if self.0.iter().any(|v| !v.is_finite()) {
            return None;
        }
        self.0
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |m| m.max(d))))
    }
}

impl From<Vec<f64>> for Waveform {
    fn from(samples: Vec<f64>) -> Self {
        Self(samples)
    }
}

/// A sample failed post-generation validation.
#[derive(Debug, Error, PartialEq)]
pub enum VitalsError {
    #[error("{vital} is not finite")]
    NonFinite { vital: VitalSign },

    #[error("{vital} = {value} outside [{min}, {max}]")]
    OutOfBounds {
        vital: VitalSign,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// One reading of the six vitals plus an optional waveform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsSample {
    pub heart_rate: f64,
    pub systolic_bp: f64,
    pub diastolic_bp: f64,
    pub respiratory_rate: f64,
    pub oxygen_saturation: f64,
    pub temperature: f64,
    #[serde(rename = "ekg_data", default, skip_serializing_if = "Option::is_none")]
    pub waveform: Option<Waveform>,
}

impl VitalsSample {
    /// Builds a sample from raw values, without clamping or waveform.
    pub fn new(
        heart_rate: f64,
        systolic_bp: f64,
        diastolic_bp: f64,
        respiratory_rate: f64,
        oxygen_saturation: f64,
        temperature: f64,
    ) -> Self {
        Self {
            heart_rate,
            systolic_bp,
            diastolic_bp,
            respiratory_rate,
            oxygen_saturation,
            temperature,
            waveform: None,
        }
    }

    /// Builds a sample with every field clamped to its physiologic bounds.
    pub fn clamped(
        heart_rate: f64,
        systolic_bp: f64,
        diastolic_bp: f64,
        respiratory_rate: f64,
        oxygen_saturation: f64,
        temperature: f64,
    ) -> Self {
        Self::new(
            VitalSign::HeartRate.clamp_bounds().clamp(heart_rate),
            VitalSign::SystolicBp.clamp_bounds().clamp(systolic_bp),
            VitalSign::DiastolicBp.clamp_bounds().clamp(diastolic_bp),
            VitalSign::RespiratoryRate.clamp_bounds().clamp(respiratory_rate),
            VitalSign::OxygenSaturation.clamp_bounds().clamp(oxygen_saturation),
            VitalSign::Temperature.clamp_bounds().clamp(temperature),
        )
    }

    pub fn with_waveform(mut self, waveform: impl Into<Waveform>) -> Self {
        self.waveform = Some(waveform.into());
        self
    }

    pub fn value(&self, vital: VitalSign) -> f64 {
        match vital {
            VitalSign::HeartRate => self.heart_rate,
            VitalSign::SystolicBp => self.systolic_bp,
            VitalSign::DiastolicBp => self.diastolic_bp,
            VitalSign::RespiratoryRate => self.respiratory_rate,
            VitalSign::OxygenSaturation => self.oxygen_saturation,
            VitalSign::Temperature => self.temperature,
        }
    }

    /// Checks that every field is finite and inside its clamp bounds.
    pub fn validate(&self) -> Result<(), VitalsError> {
        for vital in VitalSign::ALL {
            let value = self.value(vital);
            if !value.is_finite() {
                return Err(VitalsError::NonFinite { vital });
            }
            let bounds = vital.clamp_bounds();
            if !bounds.contains(value) {
                return Err(VitalsError::OutOfBounds {
                    vital,
                    value,
                    min: bounds.min,
                    max: bounds.max,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamped_respects_bounds() {
        let sample = VitalsSample::clamped(250.0, 20.0, 500.0, 1.0, 70.0, 45.0);

        assert_eq!(sample.heart_rate, 180.0);
        assert_eq!(sample.systolic_bp, 70.0);
        assert_eq!(sample.diastolic_bp, 120.0);
        assert_eq!(sample.respiratory_rate, 8.0);
        assert_eq!(sample.oxygen_saturation, 85.0);
        assert_eq!(sample.temperature, 39.0);
        assert!(sample.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_bounds() {
        let sample = VitalsSample::new(75.0, 120.0, 80.0, 16.0, 80.0, 37.0);
        assert!(matches!(
            sample.validate(),
            Err(VitalsError::OutOfBounds { vital: VitalSign::OxygenSaturation, .. })
        ));

        let sample = VitalsSample::new(f64::NAN, 120.0, 80.0, 16.0, 98.0, 37.0);
        assert_eq!(
            sample.validate(),
            Err(VitalsError::NonFinite { vital: VitalSign::HeartRate })
        );
    }

    #[test]
    fn test_max_adjacent_delta() {
        let wave = Waveform(vec![0.0, 1.0, -0.5, -0.25]);
        assert_eq!(wave.max_adjacent_delta(), Some(1.5));

        assert_eq!(Waveform(vec![1.0]).max_adjacent_delta(), None);
        assert_eq!(Waveform(vec![0.0, f64::NAN, 1.0]).max_adjacent_delta(), None);
    }

    #[test]
    fn test_sample_wire_shape() {
        let sample = VitalsSample::new(75.0, 120.0, 80.0, 16.0, 98.0, 37.0)
            .with_waveform(vec![0.0, 0.5]);
        let json = serde_json::to_value(&sample).unwrap();

        assert_eq!(json["heart_rate"], 75.0);
        assert_eq!(json["ekg_data"], serde_json::json!([0.0, 0.5]));

        let bare = serde_json::to_value(VitalsSample::new(75.0, 120.0, 80.0, 16.0, 98.0, 37.0)).unwrap();
        assert!(bare.get("ekg_data").is_none());
    }
}
