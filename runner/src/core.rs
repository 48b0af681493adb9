use config::shared::{BufferConfig, PipelineConfig, RunnerConfig, WorkloadConfig};
use serde::Serialize;
use throttle::pipeline::Pipeline;
use throttle::processor::Processor;
use throttle::progress::ProgressTracker;
use throttle::report::PipelineReport;
use throttle::sink::DataSink;
use throttle::sink::memory::MemorySink;
use throttle::source::DataSource;
use throttle::source::buffered::BufferedSource;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use crate::workload::{TraceStats, synthetic_traces, trace_stats};

/// Name announced to the progress monitor.
const TASK_NAME: &str = "trace statistics";

/// Summary of a run, logged as a single JSON document.
#[derive(Debug, Serialize)]
struct RunSummary {
    traces_processed: u64,
    failed_workers: usize,
    cancelled: bool,
    elapsed_ms: u64,
    progress: f64,
    mean_rms: Option<f32>,
    max_peak: Option<f32>,
    polls: u64,
    pauses: usize,
    resumes: usize,
}

impl RunSummary {
    fn new(report: &PipelineReport, stats: &[TraceStats], progress: &ProgressTracker) -> Self {
        let mean_rms = (!stats.is_empty())
            .then(|| stats.iter().map(|s| s.rms).sum::<f32>() / stats.len() as f32);
        let max_peak = stats.iter().map(|s| s.peak).reduce(f32::max);

        Self {
            traces_processed: report.items_processed(),
            failed_workers: report.failures().count(),
            cancelled: report.cancelled,
            elapsed_ms: report.elapsed.as_millis() as u64,
            progress: progress.fraction(),
            mean_rms,
            max_peak,
            polls: report.controller.polls,
            pauses: report.controller.pauses.len(),
            resumes: report.controller.resumes.len(),
        }
    }
}

/// Runs the synthetic trace workload described by `runner_config`.
///
/// Traces are produced by a background reader into a bounded buffer, reduced to their RMS and
/// peak amplitude by the pipeline workers and collected in memory. A cancelled run is not an
/// error, a run where some worker failed is.
pub async fn start_runner_with_config(runner_config: RunnerConfig) -> anyhow::Result<()> {
    info!("starting runner");

    log_config(&runner_config);

    let RunnerConfig {
        pipeline: pipeline_config,
        buffer,
        workload,
    } = runner_config;

    let source = BufferedSource::spawn(&buffer, workload.traces, synthetic_traces(&workload))?;
    let sink = MemorySink::new();
    let progress = ProgressTracker::new();

    let pipeline = Pipeline::new(pipeline_config, source, sink.clone(), trace_stats)
        .with_progress(progress.clone())
        .with_task_name(TASK_NAME);

    let report = start_pipeline(pipeline).await?;

    let summary = RunSummary::new(&report, &sink.items().await, &progress);
    info!(summary = %serde_json::to_string(&summary)?, "run summary");

    report.into_result()?;

    info!("runner completed");

    Ok(())
}

fn log_config(config: &RunnerConfig) {
    log_pipeline_config(&config.pipeline);
    log_buffer_config(&config.buffer);
    log_workload_config(&config.workload);
}

fn log_pipeline_config(config: &PipelineConfig) {
    debug!(
        num_workers = config.num_workers,
        poll_interval_ms = config.poll_interval_ms,
        "pipeline config"
    );
}

fn log_buffer_config(config: &BufferConfig) {
    debug!(
        capacity = config.capacity,
        low_watermark = config.low_watermark,
        high_watermark = config.high_watermark,
        "buffer config"
    );
}

fn log_workload_config(config: &WorkloadConfig) {
    debug!(
        traces = config.traces,
        samples_per_trace = config.samples_per_trace,
        noise_amplitude = config.noise_amplitude,
        seed = config.seed,
        "workload config"
    );
}

/// Starts a pipeline and shuts it down on SIGINT or SIGTERM.
///
/// After a signal, workers finish the item in hand and stop before fetching another one.
#[tracing::instrument(skip(pipeline))]
async fn start_pipeline<S, K, P>(mut pipeline: Pipeline<S, K, P>) -> anyhow::Result<PipelineReport>
where
    S: DataSource + Send + 'static,
    S::Item: Send + 'static,
    K: DataSink + Send + 'static,
    K::Item: Send + 'static,
    P: Processor<S::Item, K::Item>,
{
    pipeline.start().await?;

    let shutdown_tx = pipeline.shutdown_tx();
    let shutdown_handle = tokio::spawn(async move {
        wait_for_signal().await;

        if shutdown_tx.shutdown() {
            info!("shutdown signal sent to the pipeline");
        }
    });

    let result = pipeline.wait().await;

    // The listener is still waiting when the run ended on its own.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    Ok(result?)
}

/// Resolves on the first SIGINT (Ctrl+C) or SIGTERM.
async fn wait_for_signal() {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => Some(sigterm),
        Err(err) => {
            warn!(error = %err, "failed to register sigterm handler, listening for ctrl+c only");
            None
        }
    };

    let sigterm_received = async {
        match sigterm.as_mut() {
            Some(sigterm) => {
                sigterm.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(error = %err, "failed to listen for ctrl+c");
                return;
            }

            info!("sigint (ctrl+c) received, shutting down pipeline");
        }
        _ = sigterm_received => {
            info!("sigterm received, shutting down pipeline");
        }
    }
}
