use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Staging buffer configuration for sources that read ahead of the workers.
///
/// Occupancy at or below `low_watermark` reports the buffer as running out, occupancy at or
/// above `high_watermark` reports it as filling up.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BufferConfig {
    /// Maximum number of items held by the buffer.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Occupancy at or below which the buffer is running out.
    #[serde(default = "default_low_watermark")]
    pub low_watermark: usize,
    /// Occupancy at or above which the buffer is filling up.
    #[serde(default = "default_high_watermark")]
    pub high_watermark: usize,
}

impl BufferConfig {
    pub const DEFAULT_CAPACITY: usize = 256;

    pub const DEFAULT_LOW_WATERMARK: usize = 32;

    pub const DEFAULT_HIGH_WATERMARK: usize = 192;

    /// Validates that `0 < low_watermark < high_watermark <= capacity`.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.capacity == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "buffer.capacity".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.low_watermark == 0 || self.low_watermark >= self.high_watermark {
            return Err(ValidationError::InvalidFieldValue {
                field: "buffer.low_watermark".to_string(),
                constraint: "must be greater than 0 and lower than `high_watermark`".to_string(),
            });
        }

        if self.high_watermark > self.capacity {
            return Err(ValidationError::InvalidFieldValue {
                field: "buffer.high_watermark".to_string(),
                constraint: "must not exceed `capacity`".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            low_watermark: default_low_watermark(),
            high_watermark: default_high_watermark(),
        }
    }
}

fn default_capacity() -> usize {
    BufferConfig::DEFAULT_CAPACITY
}

fn default_low_watermark() -> usize {
    BufferConfig::DEFAULT_LOW_WATERMARK
}

fn default_high_watermark() -> usize {
    BufferConfig::DEFAULT_HIGH_WATERMARK
}
