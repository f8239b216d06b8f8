//! Runtime configuration.

use crate::cohort::ScenarioPlan;
use crate::hub::DEFAULT_SUBSCRIBER_BUFFER;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Tick interval must be non-zero")]
    ZeroInterval,

    #[error("Cohort must have at least one patient")]
    EmptyCohort,

    #[error("Scenario assigned to position {position} but cohort has {size} patients")]
    ScenarioOutOfRange { position: usize, size: usize },

    #[error("Subscriber buffer must be non-zero")]
    ZeroBuffer,
}

/// Configuration for a ward simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct WardConfig {
    /// Sleep between the end of one tick and the start of the next (default: 3s)
    pub tick_interval: Duration,

    /// Number of simulated patients (default: 30)
    pub cohort_size: usize,

    /// Cohort position → scripted scenario
    pub scenarios: ScenarioPlan,

    /// Sleep after a failed tick (default: 1s)
    pub error_backoff: Duration,

    /// Per-subscriber queue depth (default: 64)
    pub subscriber_buffer: usize,

    /// Master seed; 0 means seed from OS entropy
    pub seed: u64,
}

impl Default for WardConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(3),
            cohort_size: 30,
            scenarios: ScenarioPlan::default(),
            error_backoff: Duration::from_secs(1),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            seed: 0,
        }
    }
}

impl WardConfig {
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_cohort_size(mut self, size: usize) -> Self {
        self.cohort_size = size;
        self
    }

    pub fn with_scenarios(mut self, plan: ScenarioPlan) -> Self {
        self.scenarios = plan;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    pub fn with_subscriber_buffer(mut self, buffer: usize) -> Self {
        self.subscriber_buffer = buffer;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.cohort_size == 0 {
            return Err(ConfigError::EmptyCohort);
        }
        if let Some(position) = self.scenarios.max_position() {
            if position >= self.cohort_size {
                return Err(ConfigError::ScenarioOutOfRange {
                    position,
                    size: self.cohort_size,
                });
            }
        }
        if self.subscriber_buffer == 0 {
            return Err(ConfigError::ZeroBuffer);
        }
        Ok(())
    }
}
