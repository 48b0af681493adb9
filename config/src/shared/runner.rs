use serde::{Deserialize, Serialize};

use crate::Config;
use crate::shared::{BufferConfig, PipelineConfig, ValidationError};

/// Synthetic trace workload processed by the runner binary.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct WorkloadConfig {
    /// Number of traces produced by the reader.
    pub traces: u64,
    /// Number of samples in each trace.
    pub samples_per_trace: usize,
    /// Amplitude of the random noise added to every sample.
    #[serde(default)]
    pub noise_amplitude: f32,
    /// Seed of the noise generator, the same seed yields the same traces.
    #[serde(default)]
    pub seed: u64,
}

impl WorkloadConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.samples_per_trace == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "workload.samples_per_trace".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if !self.noise_amplitude.is_finite() || self.noise_amplitude < 0.0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "workload.noise_amplitude".to_string(),
                constraint: "must be a finite, non negative number".to_string(),
            });
        }

        Ok(())
    }
}

/// Complete configuration of the runner binary.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RunnerConfig {
    /// Worker count and controller polling.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Staging buffer of the trace reader.
    #[serde(default)]
    pub buffer: BufferConfig,
    /// Synthetic workload description.
    pub workload: WorkloadConfig,
}

impl RunnerConfig {
    /// Validates every section of the runner configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.pipeline.validate()?;
        self.buffer.validate()?;
        self.workload.validate()
    }
}

impl Config for RunnerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}
