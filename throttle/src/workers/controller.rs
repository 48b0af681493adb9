use std::sync::Arc;

use config::shared::PipelineConfig;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{Instrument, debug, info};

use crate::concurrency::shutdown::{
    ShutdownRx, ShutdownTx, create_shutdown_channel, wait_for_shutdown,
};
use crate::error::{ErrorKind, PipelineError, PipelineResult};
use crate::pipeline_error;
use crate::report::ControllerReport;
use crate::source::{BufferGauge, BufferStatus};
use crate::workers::base::{Worker, WorkerHandle, WorkerType};
use crate::workers::policy::{ThrottleDecision, decide};
use crate::workers::processing::{ProcessingWorkerState, WorkerPhase};

/// Result of a single buffer status poll.
#[derive(Debug, Clone, Copy)]
struct SourcePoll {
    end_of_data: bool,
    status: BufferStatus,
}

/// Handle of a running throttle controller.
#[derive(Debug)]
pub struct ThrottleControllerHandle {
    workers: Vec<ProcessingWorkerState>,
    stop_tx: ShutdownTx,
    handle: JoinHandle<ControllerReport>,
}

impl ThrottleControllerHandle {
    /// Asks the controller to stop at its next suspension point.
    ///
    /// Used by the pipeline once every processing worker stopped, so that a run whose workers
    /// all failed does not wait for the source to be exhausted.
    pub fn stop(&self) {
        self.stop_tx.shutdown();
    }
}

impl WorkerHandle<Vec<ProcessingWorkerState>> for ThrottleControllerHandle {
    type Output = PipelineResult<ControllerReport>;

    fn state(&self) -> Vec<ProcessingWorkerState> {
        self.workers.clone()
    }

    async fn wait(self) -> PipelineResult<ControllerReport> {
        self.handle.await.map_err(|err| {
            if err.is_cancelled() {
                pipeline_error!(
                    ErrorKind::ControllerCancelled,
                    "Throttle controller was cancelled",
                    WorkerType::Controller,
                    source: err
                )
            } else {
                pipeline_error!(
                    ErrorKind::ControllerPanic,
                    "Throttle controller panicked",
                    WorkerType::Controller,
                    source: err
                )
            }
        })
    }
}

/// Controller that throttles processing workers based on the buffer status of the source.
///
/// Every polling interval it reads the buffer status from the source gauge and applies [`decide`]: a buffer running
/// out pauses one worker, a buffer filling up resumes one. It stops when the source is
/// exhausted, on cancellation, or when asked through its handle, and always resumes every
/// paused worker before returning.
///
/// The gauge is read without locking the source, so a worker waiting inside
/// [`DataSource::get`](crate::source::DataSource::get) never delays a poll. The worker set is a
/// snapshot taken at construction, indexed by worker id.
pub struct ThrottleController<G> {
    config: Arc<PipelineConfig>,
    gauge: G,
    workers: Vec<ProcessingWorkerState>,
    shutdown_rx: ShutdownRx,
}

impl<G> ThrottleController<G> {
    pub fn new(
        config: Arc<PipelineConfig>,
        gauge: G,
        workers: Vec<ProcessingWorkerState>,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            config,
            gauge,
            workers,
            shutdown_rx,
        }
    }
}

impl<G> ThrottleController<G>
where
    G: BufferGauge,
{
    async fn run(self, mut stop_rx: ShutdownRx) -> ControllerReport {
        let mut report = ControllerReport::default();
        let mut shutdown_rx = self.shutdown_rx.clone();

        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let poll = tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("cancellation requested, stopping throttle controller");
                    break;
                }

                _ = wait_for_shutdown(&mut stop_rx) => {
                    debug!("processing workers stopped, stopping throttle controller");
                    break;
                }

                poll = self.poll_source(&mut ticker) => poll,
            };

            report.polls += 1;

            if poll.end_of_data {
                info!("source exhausted, stopping throttle controller");
                break;
            }

            let snapshots: Vec<_> = self.workers.iter().map(|w| w.snapshot()).collect();
            let decision = decide(poll.status, &snapshots);
            self.apply(decision, poll.status, &mut report);
        }

        self.drain(&mut report);

        report
    }

    async fn poll_source(&self, ticker: &mut Interval) -> SourcePoll {
        ticker.tick().await;

        SourcePoll {
            end_of_data: self.gauge.is_end_of_data(),
            status: self.gauge.buffer_status(),
        }
    }

    fn apply(
        &self,
        decision: ThrottleDecision,
        status: BufferStatus,
        report: &mut ControllerReport,
    ) {
        match decision {
            ThrottleDecision::Hold => {}
            ThrottleDecision::Pause(index) => {
                let worker = &self.workers[index];
                if worker.pause() {
                    info!(worker_id = worker.worker_id(), %status, "pausing worker");
                    report.pauses.push(worker.worker_id());
                }
            }
            ThrottleDecision::Resume(index) => {
                let worker = &self.workers[index];
                if worker.resume() {
                    info!(worker_id = worker.worker_id(), %status, "resuming worker");
                    report.resumes.push(worker.worker_id());
                }
            }
            ThrottleDecision::Unstall(index) => {
                let worker = &self.workers[index];
                if worker.resume() {
                    info!(
                        worker_id = worker.worker_id(),
                        %status,
                        "no running worker left, resuming paused worker"
                    );
                    report.resumes.push(worker.worker_id());
                }
            }
        }

        self.log_census(status);
    }

    fn drain(&self, report: &mut ControllerReport) {
        for worker in &self.workers {
            if worker.resume() {
                debug!(worker_id = worker.worker_id(), "resuming worker on shutdown");
                report.drained.push(worker.worker_id());
            }
        }

        info!(
            polls = report.polls,
            pauses = report.pauses.len(),
            resumes = report.resumes.len(),
            drained = report.drained.len(),
            "throttle controller stopped"
        );
    }

    fn log_census(&self, status: BufferStatus) {
        let mut running = 0;
        let mut paused = 0;
        for worker in &self.workers {
            match worker.phase() {
                WorkerPhase::Running => running += 1,
                WorkerPhase::Paused => paused += 1,
                WorkerPhase::Stopped => {}
            }
        }

        debug!(%status, running, paused, "worker census");
    }
}

impl<G> Worker<ThrottleControllerHandle, Vec<ProcessingWorkerState>> for ThrottleController<G>
where
    G: BufferGauge,
{
    type Error = PipelineError;

    async fn start(self) -> Result<ThrottleControllerHandle, Self::Error> {
        info!(
            workers = self.workers.len(),
            poll_interval_ms = self.config.poll_interval_ms,
            "starting throttle controller"
        );

        let (stop_tx, stop_rx) = create_shutdown_channel();
        let workers = self.workers.clone();

        let controller_span = tracing::info_span!("throttle_controller");
        let handle = tokio::spawn(self.run(stop_rx).instrument(controller_span.or_current()));

        Ok(ThrottleControllerHandle {
            workers,
            stop_tx,
            handle,
        })
    }
}
