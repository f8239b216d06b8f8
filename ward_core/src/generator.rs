//! Vitals Generator - synthetic physiology for one patient per call.
//!
//! Pure: the only input besides the profile is the injected random
//! source, so a seeded RNG reproduces the exact sample sequence.
//!
//! # Waveform bound
//!
//! Benign waveforms must never trip the anomaly detector (2.0 adjacent
//! step). The clean harmonic steps by < 0.25, noise is clamped to
//! ±[`BASELINE_NOISE_CAP`], and benign spikes (≤ 1.0) share one index
//! parity so no two are adjacent: 0.25 + 2·0.3 + 1.0 < 2.0.

use crate::cohort::{Modulation, PatientProfile, Scenario};
use crate::vitals::{Range, VitalsSample, Waveform, WAVEFORM_LEN};
use rand::prelude::*;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

/// Baseline Gaussian noise standard deviation.
const BASELINE_NOISE_STD: f64 = 0.1;

/// Hard cap on baseline noise (3σ).
pub const BASELINE_NOISE_CAP: f64 = 0.3;

/// Number of benign spikes when variability is injected.
const BENIGN_SPIKES: usize = 3;

/// Largest benign spike magnitude.
const BENIGN_SPIKE_MAX: f64 = 1.0;

const CRITICAL_NOISE_STD: f64 = 0.2;
const ARRHYTHMIA_SPIKES: usize = 8;
const ARRHYTHMIA_SPIKE_MAX: f64 = 2.0;
const ST_SEGMENT: std::ops::Range<usize> = 20..30;
const ST_ELEVATION: f64 = 1.5;

/// Draw ranges for one scripted scenario.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioVitals {
    pub heart_rate: Range,
    pub systolic_bp: Range,
    pub diastolic_bp: Range,
    pub respiratory_rate: Range,
    pub oxygen_saturation: Range,
    pub temperature: Range,
    /// Arrhythmia + ST-elevation waveform instead of a baseline one
    pub critical_waveform: bool,
}

impl ScenarioVitals {
    /// Scenario → draw ranges.
    pub fn for_scenario(scenario: Scenario) -> Self {
        match scenario {
            Scenario::AcuteMi => Self {
                heart_rate: Range::new(110.0, 130.0),
                systolic_bp: Range::new(180.0, 200.0),
                diastolic_bp: Range::new(100.0, 120.0),
                respiratory_rate: Range::new(25.0, 30.0),
                oxygen_saturation: Range::new(85.0, 90.0),
                temperature: Range::new(37.8, 38.5),
                critical_waveform: true,
            },
            Scenario::HypertensiveCrisis => Self {
                heart_rate: Range::new(95.0, 110.0),
                systolic_bp: Range::new(160.0, 180.0),
                diastolic_bp: Range::new(95.0, 105.0),
                respiratory_rate: Range::new(20.0, 25.0),
                oxygen_saturation: Range::new(92.0, 95.0),
                temperature: Range::new(37.2, 37.8),
                critical_waveform: false,
            },
            Scenario::RespiratoryDistress => Self {
                heart_rate: Range::new(95.0, 110.0),
                systolic_bp: Range::new(150.0, 170.0),
                diastolic_bp: Range::new(85.0, 95.0),
                respiratory_rate: Range::new(25.0, 30.0),
                oxygen_saturation: Range::new(88.0, 92.0),
                temperature: Range::new(37.8, 38.5),
                critical_waveform: false,
            },
            Scenario::Sepsis => Self {
                heart_rate: Range::new(100.0, 115.0),
                systolic_bp: Range::new(90.0, 110.0),
                diastolic_bp: Range::new(50.0, 65.0),
                respiratory_rate: Range::new(22.0, 28.0),
                oxygen_saturation: Range::new(90.0, 94.0),
                temperature: Range::new(38.5, 39.0),
                critical_waveform: false,
            },
        }
    }
}

/// Configuration for the generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Probability that a benign waveform receives spike perturbations
    pub benign_spike_probability: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            benign_spike_probability: 0.05,
        }
    }
}

/// Produces one vitals sample + waveform per call.
#[derive(Debug, Clone, Default)]
pub struct VitalsGenerator {
    config: GeneratorConfig,
}

impl VitalsGenerator {
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Generates a clamped sample for `profile`.
    pub fn generate<R: Rng + ?Sized>(&self, profile: &PatientProfile, rng: &mut R) -> VitalsSample {
        match profile.scenario {
            Some(scenario) => self.scripted(ScenarioVitals::for_scenario(scenario), rng),
            None => self.baseline(profile, rng),
        }
    }

    fn scripted<R: Rng + ?Sized>(&self, ranges: ScenarioVitals, rng: &mut R) -> VitalsSample {
        let sample = VitalsSample::clamped(
            draw(ranges.heart_rate, rng),
            draw(ranges.systolic_bp, rng),
            draw(ranges.diastolic_bp, rng),
            draw(ranges.respiratory_rate, rng),
            draw(ranges.oxygen_saturation, rng),
            draw(ranges.temperature, rng),
        );

        let waveform = if ranges.critical_waveform {
            critical_waveform(rng)
        } else {
            self.baseline_waveform(rng)
        };
        sample.with_waveform(waveform)
    }

    fn baseline<R: Rng + ?Sized>(&self, profile: &PatientProfile, rng: &mut R) -> VitalsSample {
        // Healthy adult population baseline
        let mut hr = rng.gen_range(65_i32..=85) as f64;
        let mut systolic = rng.gen_range(110_i32..=130) as f64;
        let diastolic = rng.gen_range(70_i32..=85) as f64;
        let mut rr = rng.gen_range(14_i32..=18) as f64;
        let mut spo2 = rng.gen_range(96.0..=99.0);
        let mut temp = rng.gen_range(36.8..=37.2);

        if profile.has_modulation(Modulation::Cardiac) {
            hr += rng.gen_range(-10_i32..=15) as f64;
            systolic += rng.gen_range(-5_i32..=20) as f64;
        }
        if profile.has_modulation(Modulation::Pulmonary) {
            rr += rng.gen_range(2_i32..=6) as f64;
            spo2 -= rng.gen_range(1.0..=3.0);
        }
        if profile.has_modulation(Modulation::Metabolic) {
            temp += rng.gen_range(0.2..=0.8);
        }

        let sample = VitalsSample::clamped(
            hr + rng.gen_range(-5.0..=5.0),
            systolic + rng.gen_range(-8.0..=8.0),
            diastolic + rng.gen_range(-5.0..=5.0),
            rr + rng.gen_range(-2.0..=2.0),
            spo2 + rng.gen_range(-1.0..=1.0),
            temp + rng.gen_range(-0.3..=0.3),
        );
        sample.with_waveform(self.baseline_waveform(rng))
    }

    /// Normal sinus rhythm with bounded noise and occasional benign spikes.
    pub fn baseline_waveform<R: Rng + ?Sized>(&self, rng: &mut R) -> Waveform {
        let mut signal = harmonic_base();
        for v in signal.iter_mut() {
            let z: f64 = rng.sample(StandardNormal);
            *v += (BASELINE_NOISE_STD * z).clamp(-BASELINE_NOISE_CAP, BASELINE_NOISE_CAP);
        }

        if rng.gen_bool(self.config.benign_spike_probability.clamp(0.0, 1.0)) {
            // All spikes share one parity, so none are adjacent
            let parity = rng.gen_range(0..2);
            let slots = rand::seq::index::sample(rng, WAVEFORM_LEN / 2, BENIGN_SPIKES);
            for slot in slots.iter() {
                let idx = 2 * slot + parity;
                if idx < WAVEFORM_LEN {
                    signal[idx] += rng.gen_range(-BENIGN_SPIKE_MAX..=BENIGN_SPIKE_MAX);
                }
            }
        }

        Waveform(signal)
    }
}

/// Arrhythmia spikes plus an ST-elevation segment.
pub fn critical_waveform<R: Rng + ?Sized>(rng: &mut R) -> Waveform {
    let mut signal = harmonic_base();

    for idx in rand::seq::index::sample(rng, WAVEFORM_LEN, ARRHYTHMIA_SPIKES).iter() {
        signal[idx] += rng.gen_range(-ARRHYTHMIA_SPIKE_MAX..=ARRHYTHMIA_SPIKE_MAX);
    }
    for v in &mut signal[ST_SEGMENT] {
        *v += ST_ELEVATION;
    }
    for v in signal.iter_mut() {
        let z: f64 = rng.sample(StandardNormal);
        *v += CRITICAL_NOISE_STD * z;
    }

    Waveform(signal)
}

/// Fundamental + third harmonic over one cycle, endpoints included.
fn harmonic_base() -> Vec<f64> {
    let step = 2.0 * PI / (WAVEFORM_LEN - 1) as f64;
    (0..WAVEFORM_LEN)
        .map(|i| {
            let t = i as f64 * step;
            t.sin() + 0.3 * (3.0 * t).sin()
        })
        .collect()
}

fn draw<R: Rng + ?Sized>(range: Range, rng: &mut R) -> f64 {
    rng.gen_range(range.min..=range.max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::{Cohort, Condition, PatientId, ScenarioPlan, Sex};
    use crate::vitals::VitalSign;
    use proptest::prelude::*;
    use rand_chacha::ChaCha8Rng;

    fn patient(conditions: Vec<Condition>, scenario: Option<Scenario>) -> PatientProfile {
        PatientProfile {
            id: PatientId(1),
            name: "Test Patient".to_string(),
            age: 60,
            sex: Sex::Female,
            room_id: "Room-01".to_string(),
            conditions,
            scenario,
        }
    }

    #[test]
    fn test_same_seed_same_samples() {
        let generator = VitalsGenerator::default();
        let profile = patient(vec![Condition::HeartDisease], None);

        let mut rng1 = ChaCha8Rng::seed_from_u64(42);
        let mut rng2 = ChaCha8Rng::seed_from_u64(42);

        for _ in 0..10 {
            assert_eq!(
                generator.generate(&profile, &mut rng1),
                generator.generate(&profile, &mut rng2)
            );
        }
    }

    #[test]
    fn test_waveform_has_fixed_length() {
        let generator = VitalsGenerator::default();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        for scenario in [None, Some(Scenario::AcuteMi), Some(Scenario::Sepsis)] {
            let sample = generator.generate(&patient(vec![], scenario), &mut rng);
            assert_eq!(sample.waveform.map(|w| w.len()), Some(WAVEFORM_LEN));
        }
    }

    #[test]
    fn test_scripted_draws_stay_in_scenario_ranges() {
        let generator = VitalsGenerator::default();
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        for scenario in Scenario::ALL {
            let ranges = ScenarioVitals::for_scenario(scenario);
            let profile = patient(scenario.conditions().to_vec(), Some(scenario));
            for _ in 0..50 {
                let s = generator.generate(&profile, &mut rng);
                assert!(ranges.heart_rate.contains(s.heart_rate));
                assert!(ranges.systolic_bp.contains(s.systolic_bp));
                assert!(ranges.oxygen_saturation.contains(s.oxygen_saturation));
                assert!(ranges.temperature.contains(s.temperature));
            }
        }
    }

    #[test]
    fn test_pulmonary_condition_lowers_oxygen() {
        let generator = VitalsGenerator::default();
        let healthy = patient(vec![], None);
        let copd = patient(vec![Condition::Copd], None);
        let mut rng = ChaCha8Rng::seed_from_u64(99);

        let n = 200;
        let mean = |p: &PatientProfile, rng: &mut ChaCha8Rng| {
            (0..n)
                .map(|_| generator.generate(p, rng).oxygen_saturation)
                .sum::<f64>()
                / n as f64
        };

        assert!(mean(&copd, &mut rng) < mean(&healthy, &mut rng));
    }

    #[test]
    fn test_always_spiking_benign_waveform_stays_under_threshold() {
        let generator = VitalsGenerator::new(GeneratorConfig {
            benign_spike_probability: 1.0,
        });
        let mut rng = ChaCha8Rng::seed_from_u64(2024);

        for _ in 0..500 {
            let wave = generator.baseline_waveform(&mut rng);
            let delta = wave.max_adjacent_delta().unwrap();
            assert!(delta < 2.0, "benign waveform stepped by {}", delta);
        }
    }

    #[test]
    fn test_critical_waveform_elevates_st_segment() {
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let base = harmonic_base();

        let trials = 50;
        let mut total_shift = 0.0;
        for _ in 0..trials {
            let wave = critical_waveform(&mut rng);
            let shift: f64 = ST_SEGMENT
                .map(|i| wave.samples()[i] - base[i])
                .sum::<f64>()
                / ST_SEGMENT.len() as f64;
            total_shift += shift;
        }

        approx::assert_abs_diff_eq!(total_shift / trials as f64, ST_ELEVATION, epsilon = 0.3);
    }

    proptest! {
        #[test]
        fn prop_generated_fields_within_clamp_bounds(seed in any::<u64>(), size in 1usize..12) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let cohort = Cohort::build(size, &ScenarioPlan::default(), &mut rng);
            let generator = VitalsGenerator::default();

            for profile in cohort.iter() {
                let sample = generator.generate(profile, &mut rng);
                for vital in VitalSign::ALL {
                    prop_assert!(vital.clamp_bounds().contains(sample.value(vital)));
                }
                prop_assert!(sample.validate().is_ok());
            }
        }

        #[test]
        fn prop_benign_waveforms_never_anomalous(seed in any::<u64>()) {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let generator = VitalsGenerator::new(GeneratorConfig { benign_spike_probability: 1.0 });
            let wave = generator.baseline_waveform(&mut rng);
            prop_assert!(wave.max_adjacent_delta().unwrap() < 2.0);
        }
    }
}
