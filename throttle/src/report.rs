//! Outcomes and reports of pipeline runs.

use std::fmt;
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};
use crate::workers::base::WorkerId;

/// Terminal outcome of a processing worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    /// The source was exhausted.
    Completed,
    /// Cancellation was observed before the source was exhausted.
    Cancelled,
    /// Fetching, transforming or delivering an item failed. Only this worker stopped.
    Failed(PipelineError),
}

impl WorkerOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the error of a failed worker.
    pub fn error(&self) -> Option<&PipelineError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for WorkerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed(err) => write!(f, "failed: {:?}", err.kind()),
        }
    }
}

/// Final report of a single processing worker.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub worker_id: WorkerId,
    pub outcome: WorkerOutcome,
    /// Items fetched, transformed and delivered by this worker.
    pub items_processed: u64,
}

/// Pause and resume events issued by the throttle controller, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerReport {
    /// Number of buffer status polls.
    pub polls: u64,
    /// Workers paused because the buffer was running out.
    pub pauses: Vec<WorkerId>,
    /// Workers resumed while the run was still going.
    pub resumes: Vec<WorkerId>,
    /// Workers still paused when the controller stopped, resumed during the drain.
    pub drained: Vec<WorkerId>,
}

/// Report of a whole pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// One report per worker, ordered by worker id.
    pub workers: Vec<WorkerReport>,
    pub controller: ControllerReport,
    pub elapsed: Duration,
    /// Whether cancellation was requested during the run.
    pub cancelled: bool,
}

impl PipelineReport {
    /// Returns the number of items delivered to the sink by all workers.
    pub fn items_processed(&self) -> u64 {
        self.workers.iter().map(|w| w.items_processed).sum()
    }

    /// Returns the reports of the workers that failed.
    pub fn failures(&self) -> impl Iterator<Item = &WorkerReport> {
        self.workers.iter().filter(|w| w.outcome.error().is_some())
    }

    /// Returns the report, or all worker failures aggregated into a single error.
    pub fn into_result(self) -> PipelineResult<Self> {
        let errors: Vec<PipelineError> = self
            .failures()
            .filter_map(|w| w.outcome.error().cloned())
            .collect();

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(self)
    }
}
