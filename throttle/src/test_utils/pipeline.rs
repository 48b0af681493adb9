use std::time::Duration;

use config::shared::PipelineConfig;

use crate::error::PipelineResult;

/// Returns a pipeline configuration for tests.
pub fn test_pipeline_config(num_workers: u16, poll_interval_ms: u64) -> PipelineConfig {
    PipelineConfig {
        num_workers,
        poll_interval_ms,
    }
}

/// Processor returning every item unchanged.
pub fn identity<T>(item: T) -> PipelineResult<T> {
    Ok(item)
}

/// Processor returning every item unchanged after blocking for `delay`.
///
/// Processors run on the blocking pool, so the delay keeps a worker busy without stalling the
/// runtime.
pub fn slow_identity<T>(
    delay: Duration,
) -> impl Fn(T) -> PipelineResult<T> + Send + Sync + 'static {
    move |item| {
        std::thread::sleep(delay);
        Ok(item)
    }
}
