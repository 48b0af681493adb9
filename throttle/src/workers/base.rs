use std::fmt;
use std::future::Future;

/// Identifier of a processing worker, equal to its index in the worker set.
///
/// Worker `0` is never paused, which guarantees forward progress.
pub type WorkerId = u16;

/// Classification of the workers of a pipeline run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WorkerType {
    /// Worker that moves items from the source to the sink.
    Processing {
        /// Index of the worker in the worker set.
        worker_id: WorkerId,
    },
    /// Worker that polls the source buffer and pauses or resumes processing workers.
    Controller,
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processing { worker_id } => write!(f, "processing worker {worker_id}"),
            Self::Controller => write!(f, "throttle controller"),
        }
    }
}

/// Trait for background workers of a pipeline run.
///
/// Starting a worker spawns its task and returns immediately with a handle.
///
/// The generic parameter `H` represents the handle type returned when the worker starts,
/// and `S` represents the state type accessible through the handle.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    /// Error type returned when worker startup fails.
    type Error;

    /// Starts the worker and returns a handle for monitoring its execution.
    fn start(self) -> impl Future<Output = Result<H, Self::Error>> + Send;
}

/// Handle for monitoring and controlling a running worker.
///
/// The state stays valid after the worker stopped, so it can be inspected after the run.
pub trait WorkerHandle<S> {
    /// Value produced when the worker stops.
    type Output;

    /// Returns the shared state of the worker.
    fn state(&self) -> S;

    /// Waits for the worker to stop and returns its output. The handle is consumed.
    fn wait(self) -> impl Future<Output = Self::Output> + Send;
}
