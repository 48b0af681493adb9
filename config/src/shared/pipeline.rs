use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration of a throttled processing pipeline.
///
/// Controls how many workers pull from the shared source and how often the controller samples
/// the source buffer to decide whether to pause or resume one of them.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Number of workers started for a run. The set is fixed for the whole run.
    #[serde(default = "default_num_workers")]
    pub num_workers: u16,
    /// Milliseconds between two buffer status polls of the controller.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl PipelineConfig {
    /// Default polling interval of the controller.
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

    /// Number of processors kept free for the source reader and the host.
    const RESERVED_PROCESSORS: usize = 2;

    /// Returns the polling interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the largest sensible worker count for this machine.
    ///
    /// Leaves two processors for the reader and the host, but never goes below one.
    pub fn max_workers() -> u16 {
        let processors = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        processors
            .saturating_sub(Self::RESERVED_PROCESSORS)
            .clamp(1, u16::MAX as usize) as u16
    }

    /// Validates pipeline configuration settings.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.num_workers == 0 {
            return Err(ValidationError::NumWorkersZero);
        }

        if self.poll_interval_ms == 0 {
            return Err(ValidationError::PollIntervalZero);
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            num_workers: default_num_workers(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_num_workers() -> u16 {
    PipelineConfig::max_workers()
}

fn default_poll_interval_ms() -> u64 {
    PipelineConfig::DEFAULT_POLL_INTERVAL_MS
}
