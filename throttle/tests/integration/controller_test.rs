use std::sync::Arc;
use std::time::Duration;

use telemetry::tracing::init_test_tracing;
use throttle::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use throttle::source::{BufferStatus, DataSource};
use throttle::test_utils::pipeline::test_pipeline_config;
use throttle::test_utils::source::{ControlledSource, SourceControl};
use throttle::workers::base::{Worker, WorkerHandle};
use throttle::workers::controller::{ThrottleController, ThrottleControllerHandle};
use throttle::workers::processing::ProcessingWorkerState;
use tokio::time::sleep;

/// Polling interval used by every test, in milliseconds of paused tokio time.
const POLL_INTERVAL_MS: u64 = 100;

fn worker_states(count: u16) -> Vec<ProcessingWorkerState> {
    (0..count).map(ProcessingWorkerState::new).collect()
}

/// Starts a controller over standalone worker states and a source that is never drained.
///
/// The source reports `script` first and `default_status` afterwards.
async fn start_controller(
    workers: &[ProcessingWorkerState],
    items: u32,
    script: &[BufferStatus],
    default_status: BufferStatus,
) -> (ThrottleControllerHandle, SourceControl, ShutdownTx) {
    let (source, control) = ControlledSource::new(0..items);
    control.script_statuses(script.iter().copied());
    control.set_default_status(default_status);

    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

    let config = test_pipeline_config(workers.len() as u16, POLL_INTERVAL_MS);
    let handle = ThrottleController::new(
        Arc::new(config),
        source.gauge(),
        workers.to_vec(),
        shutdown_rx,
    )
    .start()
    .await
    .unwrap();

    (handle, control, shutdown_tx)
}

fn paused_ids(workers: &[ProcessingWorkerState]) -> Vec<u16> {
    workers
        .iter()
        .filter(|w| w.is_paused())
        .map(|w| w.worker_id())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn running_out_once_pauses_one_worker_and_filling_up_resumes_it() {
    init_test_tracing();

    let workers = worker_states(3);
    let (handle, control, _shutdown_tx) = start_controller(
        &workers,
        10,
        &[BufferStatus::RunningOut, BufferStatus::FillingUp],
        BufferStatus::Normal,
    )
    .await;

    // First poll happens immediately.
    sleep(Duration::from_millis(POLL_INTERVAL_MS / 2)).await;
    assert_eq!(paused_ids(&workers), vec![2]);

    // Second poll resumes the same worker.
    sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    assert!(paused_ids(&workers).is_empty());

    handle.stop();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.pauses, vec![2]);
    assert_eq!(report.resumes, vec![2]);
    assert!(report.drained.is_empty());
    assert_eq!(report.polls, control.status_polls());
}

#[tokio::test(start_paused = true)]
async fn repeated_running_out_pauses_from_the_highest_worker_down_to_one() {
    init_test_tracing();

    let workers = worker_states(4);
    let (handle, _control, _shutdown_tx) =
        start_controller(&workers, 10, &[], BufferStatus::RunningOut).await;

    sleep(Duration::from_millis(POLL_INTERVAL_MS * 6)).await;

    // Worker 0 is never paused, so the run keeps making progress.
    assert_eq!(paused_ids(&workers), vec![1, 2, 3]);

    handle.stop();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.pauses, vec![3, 2, 1]);
    assert_eq!(report.drained, vec![1, 2, 3]);
    assert!(workers.iter().all(|w| !w.is_paused()));
}

#[tokio::test(start_paused = true)]
async fn filling_up_resumes_lowest_paused_worker_first() {
    init_test_tracing();

    let workers = worker_states(4);
    for worker in &workers[1..] {
        worker.pause();
    }

    let (handle, _control, _shutdown_tx) = start_controller(
        &workers,
        10,
        &[BufferStatus::FillingUp, BufferStatus::FillingUp],
        BufferStatus::Normal,
    )
    .await;

    sleep(Duration::from_millis(POLL_INTERVAL_MS * 5 / 2)).await;
    assert_eq!(paused_ids(&workers), vec![3]);

    handle.stop();
    let report = handle.wait().await.unwrap();

    assert_eq!(report.resumes, vec![1, 2]);
    assert_eq!(report.drained, vec![3]);
}

#[tokio::test(start_paused = true)]
async fn single_worker_is_never_paused() {
    init_test_tracing();

    let workers = worker_states(1);
    let (handle, _control, _shutdown_tx) =
        start_controller(&workers, 10, &[], BufferStatus::RunningOut).await;

    sleep(Duration::from_millis(POLL_INTERVAL_MS * 10)).await;
    assert!(!workers[0].is_paused());

    handle.stop();
    let report = handle.wait().await.unwrap();

    assert!(report.polls >= 10);
    assert!(report.pauses.is_empty());
    assert!(report.drained.is_empty());
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_within_one_interval_and_drains_paused_workers() {
    init_test_tracing();

    let workers = worker_states(3);
    let (handle, _control, shutdown_tx) =
        start_controller(&workers, 10, &[], BufferStatus::RunningOut).await;

    sleep(Duration::from_millis(POLL_INTERVAL_MS * 3 / 2)).await;
    assert_eq!(paused_ids(&workers), vec![1, 2]);

    shutdown_tx.shutdown();

    let report = tokio::time::timeout(Duration::from_millis(POLL_INTERVAL_MS), handle.wait())
        .await
        .expect("controller should stop within one polling interval")
        .unwrap();

    assert_eq!(report.pauses, vec![2, 1]);
    assert_eq!(report.drained, vec![1, 2]);
    assert!(paused_ids(&workers).is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhausted_source_stops_the_controller_and_drains() {
    init_test_tracing();

    let workers = worker_states(2);
    workers[1].pause();

    let (handle, control, _shutdown_tx) =
        start_controller(&workers, 0, &[], BufferStatus::Normal).await;

    let report = tokio::time::timeout(Duration::from_millis(POLL_INTERVAL_MS), handle.wait())
        .await
        .expect("controller should stop on the first poll")
        .unwrap();

    assert_eq!(report.polls, 1);
    assert_eq!(report.drained, vec![1]);
    assert!(control.is_exhausted());
    assert!(!workers[1].is_paused());
}
