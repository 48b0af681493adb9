//! Shared configuration types for throttled pipelines.

mod base;
mod buffer;
mod pipeline;
mod runner;

pub use base::ValidationError;
pub use buffer::BufferConfig;
pub use pipeline::PipelineConfig;
pub use runner::{RunnerConfig, WorkloadConfig};
