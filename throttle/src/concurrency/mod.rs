//! Coordination primitives shared by the workers and the controller of a run.
//!
//! Both primitives are built on [`tokio::sync::watch`] channels holding a single `bool`:
//!
//! - [`shutdown`] is the cancellation handle of a run. It is latched: once shutdown is
//!   requested it stays requested, and every subscriber observes it at its next check.
//! - [`pause`] is the private pause gate of one worker. Waiting on it re-checks the flag under
//!   the channel lock before sleeping, so a resume sent between the check and the wait is never
//!   lost.

pub mod pause;
pub mod shutdown;
