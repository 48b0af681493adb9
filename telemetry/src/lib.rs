//! Logging setup shared by pipeline binaries and tests.

pub mod tracing;
