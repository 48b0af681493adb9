//! Processing workers, the throttle controller and the policy driving it.

pub mod base;
pub mod controller;
pub mod policy;
pub mod pool;
pub mod processing;
