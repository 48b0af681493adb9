//! Data source abstractions for throttled pipelines.
//!
//! A [`DataSource`] hands out work items one at a time and exposes a coarse [`BufferStatus`]
//! that the throttle controller samples through a [`BufferGauge`] to pause or resume workers.

mod base;
pub mod buffered;
pub mod memory;

pub use base::{BufferGauge, BufferStatus, DataSource};
