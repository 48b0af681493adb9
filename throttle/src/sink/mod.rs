//! Data sink abstractions for throttled pipelines.

mod base;
pub mod memory;

pub use base::DataSink;
