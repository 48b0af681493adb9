use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A pipeline needs at least one worker, the one that is never paused.
    #[error("`num_workers` cannot be zero")]
    NumWorkersZero,
    /// The controller would spin without a polling interval.
    #[error("`poll_interval_ms` cannot be zero")]
    PollIntervalZero,
    /// A field holds a value outside of its allowed range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}
