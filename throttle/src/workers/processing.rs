use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info};

use crate::concurrency::pause::{PauseRx, PauseTx, create_pause_channel, wait_until_resumed};
use crate::concurrency::shutdown::{ShutdownRx, is_shutdown_requested, wait_for_shutdown};
use crate::error::{ErrorKind, PipelineError};
use crate::pipeline_error;
use crate::processor::Processor;
use crate::progress::ProgressMonitor;
use crate::report::{WorkerOutcome, WorkerReport};
use crate::sink::DataSink;
use crate::source::DataSource;
use crate::workers::base::{Worker, WorkerHandle, WorkerId, WorkerType};
use crate::workers::policy::WorkerSnapshot;

/// Lifecycle phase of a processing worker.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum WorkerPhase {
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[derive(Debug)]
struct ProcessingWorkerStateInner {
    worker_id: WorkerId,
    pause_tx: PauseTx,
    finished: AtomicBool,
    items_processed: AtomicU64,
}

/// Shared state of a processing worker.
///
/// The controller drives pause and resume through it while the worker reads its pause flag and
/// publishes progress. Clones share the same state.
#[derive(Debug, Clone)]
pub struct ProcessingWorkerState {
    inner: Arc<ProcessingWorkerStateInner>,
}

impl ProcessingWorkerState {
    /// Creates the state of a running worker with the given id.
    pub fn new(worker_id: WorkerId) -> Self {
        let (pause_tx, _) = create_pause_channel();

        Self {
            inner: Arc::new(ProcessingWorkerStateInner {
                worker_id,
                pause_tx,
                finished: AtomicBool::new(false),
                items_processed: AtomicU64::new(0),
            }),
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.inner.worker_id
    }

    /// Raises the pause flag. The worker finishes its current item before waiting.
    ///
    /// Returns `true` if the worker was not already paused.
    pub fn pause(&self) -> bool {
        self.inner.pause_tx.pause()
    }

    /// Clears the pause flag and wakes the worker if it is waiting.
    ///
    /// Returns `true` if the worker was paused.
    pub fn resume(&self) -> bool {
        self.inner.pause_tx.resume()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.pause_tx.is_paused()
    }

    /// Returns `true` once the worker stopped, whatever the reason.
    pub fn is_finished(&self) -> bool {
        self.inner.finished.load(Ordering::Acquire)
    }

    /// Returns the number of items delivered to the sink so far.
    pub fn items_processed(&self) -> u64 {
        self.inner.items_processed.load(Ordering::Relaxed)
    }

    pub fn phase(&self) -> WorkerPhase {
        if self.is_finished() {
            WorkerPhase::Stopped
        } else if self.is_paused() {
            WorkerPhase::Paused
        } else {
            WorkerPhase::Running
        }
    }

    /// Returns the view of this worker used by the throttle policy.
    pub fn snapshot(&self) -> WorkerSnapshot {
        WorkerSnapshot {
            paused: self.is_paused(),
            finished: self.is_finished(),
        }
    }

    fn subscribe_pause(&self) -> PauseRx {
        self.inner.pause_tx.subscribe()
    }

    fn record_processed(&self) {
        self.inner.items_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn mark_finished(&self) {
        self.inner.finished.store(true, Ordering::Release);
    }
}

/// Marks the worker as finished when its task ends, including by a panic.
struct FinishGuard(ProcessingWorkerState);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.mark_finished();
    }
}

/// Handle of a running processing worker.
#[derive(Debug)]
pub struct ProcessingWorkerHandle {
    state: ProcessingWorkerState,
    handle: JoinHandle<WorkerOutcome>,
}

impl WorkerHandle<ProcessingWorkerState> for ProcessingWorkerHandle {
    type Output = WorkerReport;

    fn state(&self) -> ProcessingWorkerState {
        self.state.clone()
    }

    /// Waits for the worker to stop.
    ///
    /// A panic or an abort of the worker task is reported as a failed outcome.
    async fn wait(self) -> WorkerReport {
        let worker_id = self.state.worker_id();

        let outcome = self.handle.await.unwrap_or_else(|err| {
            let worker_type = WorkerType::Processing { worker_id };
            let err = if err.is_cancelled() {
                pipeline_error!(
                    ErrorKind::ProcessingWorkerCancelled,
                    "Processing worker was cancelled",
                    worker_type,
                    source: err
                )
            } else {
                pipeline_error!(
                    ErrorKind::ProcessingWorkerPanic,
                    "Processing worker panicked",
                    worker_type,
                    source: err
                )
            };

            WorkerOutcome::Failed(err)
        });

        WorkerReport {
            worker_id,
            outcome,
            items_processed: self.state.items_processed(),
        }
    }
}

/// Worker that moves items from the shared source to the shared sink.
///
/// Each iteration checks cancellation, fetches one item while holding the source lock,
/// transforms it on the blocking pool without any lock, delivers the result while holding the
/// sink lock, and then waits if the controller paused it. Waiting for the lock or for the item
/// races cancellation, which relies on [`DataSource::get`] being cancel safe. The worker stops
/// when the source is exhausted, when cancellation is observed, or on the first failure.
pub struct ProcessingWorker<S, K, P> {
    state: ProcessingWorkerState,
    source: Arc<Mutex<S>>,
    sink: Arc<Mutex<K>>,
    processor: Arc<P>,
    progress: Arc<dyn ProgressMonitor>,
    shutdown_rx: ShutdownRx,
}

impl<S, K, P> ProcessingWorker<S, K, P> {
    pub fn new(
        state: ProcessingWorkerState,
        source: Arc<Mutex<S>>,
        sink: Arc<Mutex<K>>,
        processor: Arc<P>,
        progress: Arc<dyn ProgressMonitor>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            state,
            source,
            sink,
            processor,
            progress,
            shutdown_rx,
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.state.worker_id()
    }
}

impl<S, K, P> ProcessingWorker<S, K, P>
where
    S: DataSource + Send + 'static,
    S::Item: Send + 'static,
    K: DataSink + Send + 'static,
    K::Item: Send + 'static,
    P: Processor<S::Item, K::Item>,
{
    async fn run(self) -> WorkerOutcome {
        let _finish_guard = FinishGuard(self.state.clone());
        let mut pause_rx = self.state.subscribe_pause();
        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            if is_shutdown_requested(&shutdown_rx) {
                info!("cancellation requested, stopping worker");
                return WorkerOutcome::Cancelled;
            }

            let fetched = tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("cancellation requested while fetching, stopping worker");
                    return WorkerOutcome::Cancelled;
                }
                fetched = async {
                    let mut source = self.source.lock().await;
                    source.get().await
                } => fetched,
            };

            let item = match fetched {
                Ok(Some(item)) => item,
                Ok(None) => {
                    info!(
                        items_processed = self.state.items_processed(),
                        "source exhausted, worker completed"
                    );
                    return WorkerOutcome::Completed;
                }
                Err(err) => return self.fail("failed to fetch an item from the source", err),
            };

            let processor = self.processor.clone();
            let transformed = tokio::task::spawn_blocking(move || processor.process(item)).await;

            let result = match transformed {
                Ok(Ok(result)) => result,
                Ok(Err(err)) => return self.fail("failed to transform an item", err),
                Err(err) => {
                    let err = pipeline_error!(
                        ErrorKind::TransformPanic,
                        "Transform panicked",
                        source: err
                    );
                    return self.fail("transform panicked", err);
                }
            };

            let delivered = {
                let mut sink = self.sink.lock().await;
                sink.put(result).await
            };

            if let Err(err) = delivered {
                return self.fail("failed to deliver a result to the sink", err);
            }

            self.state.record_processed();
            self.progress.worked(1);

            if self.state.is_paused() {
                debug!("worker paused");

                tokio::select! {
                    biased;

                    _ = wait_for_shutdown(&mut shutdown_rx) => {
                        info!("cancellation requested while paused, stopping worker");
                        return WorkerOutcome::Cancelled;
                    }
                    _ = wait_until_resumed(&mut pause_rx) => {
                        debug!("worker resumed");
                    }
                }
            }
        }
    }

    fn fail(&self, message: &'static str, err: PipelineError) -> WorkerOutcome {
        error!(
            error = %err,
            items_processed = self.state.items_processed(),
            "{message}"
        );

        WorkerOutcome::Failed(err)
    }
}

impl<S, K, P> Worker<ProcessingWorkerHandle, ProcessingWorkerState> for ProcessingWorker<S, K, P>
where
    S: DataSource + Send + 'static,
    S::Item: Send + 'static,
    K: DataSink + Send + 'static,
    K::Item: Send + 'static,
    P: Processor<S::Item, K::Item>,
{
    type Error = PipelineError;

    async fn start(self) -> Result<ProcessingWorkerHandle, Self::Error> {
        let worker_id = self.worker_id();
        let state = self.state.clone();

        debug!(worker_id, "starting processing worker");

        let worker_span = tracing::info_span!("processing_worker", worker_id);
        let handle = tokio::spawn(self.run().instrument(worker_span.or_current()));

        Ok(ProcessingWorkerHandle { state, handle })
    }
}
