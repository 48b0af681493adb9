//! Configuration for throttled processing pipelines and the binaries that run them.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config};
