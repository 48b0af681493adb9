use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::report::{WorkerOutcome, WorkerReport};
use crate::workers::base::WorkerHandle;
use crate::workers::processing::{ProcessingWorkerHandle, ProcessingWorkerState};

/// Fixed set of processing workers of a pipeline run, ordered by worker id.
#[derive(Debug, Default)]
pub struct ProcessingWorkerPool {
    handles: Vec<ProcessingWorkerHandle>,
}

impl ProcessingWorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a started worker. Workers must be added in id order.
    pub fn push(&mut self, handle: ProcessingWorkerHandle) {
        debug!(worker_id = handle.state().worker_id(), "added worker to pool");
        self.handles.push(handle);
    }

    /// Returns the shared states of all workers, indexed by worker id.
    pub fn states(&self) -> Vec<ProcessingWorkerState> {
        self.handles.iter().map(|handle| handle.state()).collect()
    }

    /// Waits for every worker to stop and returns their reports in id order.
    ///
    /// A failed worker does not stop the others, so this always waits for all of them.
    pub async fn wait_all(self) -> Vec<WorkerReport> {
        let reports = join_all(self.handles.into_iter().map(|handle| handle.wait())).await;

        for report in &reports {
            match &report.outcome {
                WorkerOutcome::Failed(err) => warn!(
                    worker_id = report.worker_id,
                    items_processed = report.items_processed,
                    error_kind = ?err.kind(),
                    "worker failed"
                ),
                outcome => debug!(
                    worker_id = report.worker_id,
                    items_processed = report.items_processed,
                    %outcome,
                    "worker stopped"
                ),
            }
        }

        let failed = reports.iter().filter(|r| r.outcome.error().is_some()).count();
        info!(workers = reports.len(), failed, "all processing workers stopped");

        reports
    }
}
