//! Adaptive multi-worker processing pipeline with backpressure throttling.
//!
//! A fixed set of processing workers pulls items from a shared [`source::DataSource`],
//! transforms each one with a [`processor::Processor`] and delivers the results to a shared
//! [`sink::DataSink`]. A throttle controller polls the buffer status of the source and pauses or
//! resumes workers one at a time to keep the source buffer within bounds. The
//! [`pipeline::Pipeline`] ties everything together for a single run.

pub mod concurrency;
pub mod error;
mod macros;
pub mod pipeline;
pub mod processor;
pub mod progress;
pub mod report;
pub mod sink;
pub mod source;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod workers;
