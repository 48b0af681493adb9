//! Utilities for testing throttled pipelines.
//!
//! [`source::ControlledSource`] lets a test script the buffer statuses seen by the throttle
//! controller and observe how many items were fetched, [`notify::TimedNotify`] waits on
//! notifications without hanging forever, and [`pipeline`] builds configurations and
//! processors for test runs.

pub mod notify;
pub mod pipeline;
pub mod source;
