use std::sync::Arc;
use std::time::Instant;

use config::shared::PipelineConfig;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::bail;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::error::{ErrorKind, PipelineResult};
use crate::processor::Processor;
use crate::progress::{NoopProgress, ProgressMonitor};
use crate::report::{ControllerReport, PipelineReport};
use crate::sink::DataSink;
use crate::source::DataSource;
use crate::workers::base::{Worker, WorkerHandle};
use crate::workers::controller::{ThrottleController, ThrottleControllerHandle};
use crate::workers::pool::ProcessingWorkerPool;
use crate::workers::processing::{ProcessingWorker, ProcessingWorkerState};

/// Name reported to the progress monitor when none is set.
const DEFAULT_TASK_NAME: &str = "processing";

/// Phase announced once every worker is running.
const PROCESSING_PHASE: &str = "processing";

/// Phase announced once the workers stopped and the sink and source are being closed.
const CLOSING_PHASE: &str = "closing";

#[derive(Debug)]
enum PipelineState {
    NotStarted,
    Started {
        pool: ProcessingWorkerPool,
        controller: ThrottleControllerHandle,
        started_at: Instant,
    },
}

/// Orchestrator of a throttled processing run.
///
/// A pipeline owns the source, the sink and the processor for a single run. [`Pipeline::start`]
/// spawns `num_workers` processing workers and the throttle controller, [`Pipeline::wait`] joins
/// them, closes the sink and then the source, and returns a [`PipelineReport`].
///
/// A worker failure stops that worker only. Failures are collected in the report, see
/// [`PipelineReport::into_result`].
pub struct Pipeline<S, K, P> {
    config: Arc<PipelineConfig>,
    source: Arc<Mutex<S>>,
    sink: Arc<Mutex<K>>,
    processor: Arc<P>,
    progress: Arc<dyn ProgressMonitor>,
    task_name: String,
    state: PipelineState,
    shutdown_tx: ShutdownTx,
}

impl<S, K, P> Pipeline<S, K, P>
where
    S: DataSource + Send + 'static,
    S::Item: Send + 'static,
    K: DataSink + Send + 'static,
    K::Item: Send + 'static,
    P: Processor<S::Item, K::Item>,
{
    pub fn new(config: PipelineConfig, source: S, sink: K, processor: P) -> Self {
        // Receivers are created from the sender for each worker, so the first one is dropped.
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            config: Arc::new(config),
            source: Arc::new(Mutex::new(source)),
            sink: Arc::new(Mutex::new(sink)),
            processor: Arc::new(processor),
            progress: Arc::new(NoopProgress),
            task_name: DEFAULT_TASK_NAME.to_string(),
            state: PipelineState::NotStarted,
            shutdown_tx,
        }
    }

    /// Reports progress of the run to `progress`.
    pub fn with_progress<M>(mut self, progress: M) -> Self
    where
        M: ProgressMonitor,
    {
        self.progress = Arc::new(progress);
        self
    }

    /// Sets the task name announced to the progress monitor.
    pub fn with_task_name(mut self, task_name: impl Into<String>) -> Self {
        self.task_name = task_name.into();
        self
    }

    /// Returns the cancellation handle of the run.
    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    /// Returns the states of the processing workers, empty before the pipeline started.
    pub fn worker_states(&self) -> Vec<ProcessingWorkerState> {
        match &self.state {
            PipelineState::NotStarted => Vec::new(),
            PipelineState::Started { pool, .. } => pool.states(),
        }
    }

    pub async fn start(&mut self) -> PipelineResult<()> {
        if let PipelineState::Started { .. } = self.state {
            error!("pipeline was already started");

            bail!(
                ErrorKind::InvalidState,
                "Pipeline already started",
                "A pipeline runs once, create a new one for another run"
            );
        }

        self.config.validate()?;

        // Taken before any worker holds the lock.
        let (total_work, gauge) = {
            let source = self.source.lock().await;
            (source.total_work(), source.gauge())
        };

        info!(
            num_workers = self.config.num_workers,
            poll_interval_ms = self.config.poll_interval_ms,
            total_work,
            "starting pipeline"
        );

        self.progress.begin_task(&self.task_name, total_work);
        let started_at = Instant::now();

        let mut pool = ProcessingWorkerPool::new();
        for worker_id in 0..self.config.num_workers {
            let worker = ProcessingWorker::new(
                ProcessingWorkerState::new(worker_id),
                self.source.clone(),
                self.sink.clone(),
                self.processor.clone(),
                self.progress.clone(),
                self.shutdown_tx.subscribe(),
            );

            pool.push(worker.start().await?);
        }

        // The controller works on a snapshot of the worker set taken now.
        let controller = ThrottleController::new(
            self.config.clone(),
            gauge,
            pool.states(),
            self.shutdown_tx.subscribe(),
        )
        .start()
        .await?;

        self.progress.sub_task(PROCESSING_PHASE);

        self.state = PipelineState::Started {
            pool,
            controller,
            started_at,
        };

        Ok(())
    }

    pub async fn wait(self) -> PipelineResult<PipelineReport> {
        let PipelineState::Started {
            pool,
            controller,
            started_at,
        } = self.state
        else {
            info!("pipeline was not started, nothing to wait for");

            return Ok(PipelineReport::default());
        };

        info!("waiting for processing workers to complete");

        let workers = pool.wait_all().await;

        // The controller may still be polling if the workers stopped before the source was
        // exhausted, for example after failures.
        controller.stop();

        let mut errors = vec![];

        let controller_report = match controller.wait().await {
            Ok(report) => report,
            Err(err) => {
                error!(error = %err, "throttle controller failed");
                errors.push(err);

                ControllerReport::default()
            }
        };

        self.progress.sub_task(CLOSING_PHASE);

        debug!("closing sink");
        if let Err(err) = self.sink.lock().await.close().await {
            error!(error = %err, "failed to close the sink");
            errors.push(err);
        }

        debug!("closing source");
        if let Err(err) = self.source.lock().await.close().await {
            error!(error = %err, "failed to close the source");
            errors.push(err);
        }

        self.progress.done();

        let elapsed = started_at.elapsed();
        let cancelled = self.shutdown_tx.is_shutdown();
        let report = PipelineReport {
            workers,
            controller: controller_report,
            elapsed,
            cancelled,
        };

        if cancelled {
            info!(
                task = %self.task_name,
                elapsed_ms = elapsed.as_millis() as u64,
                items_processed = report.items_processed(),
                "task canceled"
            );
        } else {
            info!(
                task = %self.task_name,
                elapsed_ms = elapsed.as_millis() as u64,
                items_processed = report.items_processed(),
                "task done"
            );
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        Ok(report)
    }

    /// Requests cancellation of the run. Workers stop before fetching their next item.
    pub fn shutdown(&self) {
        info!("trying to shut down the pipeline");

        if self.shutdown_tx.shutdown() {
            info!("shut down signal successfully sent to all workers");
        } else {
            debug!("shut down was already requested");
        }
    }

    pub async fn shutdown_and_wait(self) -> PipelineResult<PipelineReport> {
        self.shutdown();
        self.wait().await
    }
}
