use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use config::shared::BufferConfig;
use telemetry::tracing::init_test_tracing;
use throttle::bail;
use throttle::error::{ErrorKind, PipelineResult};
use throttle::pipeline::Pipeline;
use throttle::progress::ProgressTracker;
use throttle::report::WorkerOutcome;
use throttle::sink::DataSink;
use throttle::sink::memory::MemorySink;
use throttle::source::buffered::BufferedSource;
use throttle::source::memory::{MemoryGauge, MemorySource};
use throttle::source::{BufferStatus, DataSource};
use throttle::test_utils::pipeline::{identity, slow_identity, test_pipeline_config};
use throttle::test_utils::source::ControlledSource;
use tokio::time::{sleep, timeout};

/// Upper bound for a whole run in these tests.
const RUN_TIMEOUT: Duration = Duration::from_secs(30);

async fn sorted_items(sink: &MemorySink<u32>) -> Vec<u32> {
    let mut items = sink.items().await;
    items.sort_unstable();
    items
}

#[tokio::test(flavor = "multi_thread")]
async fn three_workers_deliver_a_permutation_of_all_items() {
    init_test_tracing();

    let (source, control) = ControlledSource::new(0..10u32);
    let sink = MemorySink::new();

    let mut pipeline = Pipeline::new(
        test_pipeline_config(3, 50),
        source,
        sink.clone(),
        identity::<u32>,
    );
    pipeline.start().await.unwrap();

    let report = timeout(RUN_TIMEOUT, pipeline.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(sorted_items(&sink).await, (0..10).collect::<Vec<_>>());
    assert_eq!(report.items_processed(), 10);
    assert_eq!(control.fetches(), 10);
    assert!(control.is_exhausted());
    assert!(!report.cancelled);
    assert_eq!(report.workers.len(), 3);
    assert!(report.workers.iter().all(|w| w.outcome.is_completed()));
}

#[tokio::test(flavor = "multi_thread")]
async fn running_out_then_filling_up_pauses_and_resumes_the_same_worker() {
    init_test_tracing();

    let (source, control) = ControlledSource::new(0..100u32);
    control.script_statuses([BufferStatus::RunningOut, BufferStatus::FillingUp]);
    let sink = MemorySink::new();

    let mut pipeline = Pipeline::new(
        test_pipeline_config(3, 50),
        source,
        sink.clone(),
        slow_identity::<u32>(Duration::from_millis(5)),
    );
    pipeline.start().await.unwrap();

    let report = timeout(RUN_TIMEOUT, pipeline.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.controller.pauses, vec![2]);
    assert_eq!(report.controller.resumes, vec![2]);
    assert!(report.controller.drained.is_empty());

    // Pausing and resuming neither loses nor repeats items.
    assert_eq!(sorted_items(&sink).await, (0..100).collect::<Vec<_>>());
    assert!(report.workers.iter().all(|w| w.outcome.is_completed()));
}

#[tokio::test(flavor = "multi_thread")]
async fn single_worker_keeps_running_while_the_buffer_runs_out() {
    init_test_tracing();

    let (source, control) = ControlledSource::new(0..40u32);
    control.set_default_status(BufferStatus::RunningOut);
    let sink = MemorySink::new();

    let mut pipeline = Pipeline::new(
        test_pipeline_config(1, 10),
        source,
        sink.clone(),
        slow_identity::<u32>(Duration::from_millis(2)),
    );
    pipeline.start().await.unwrap();

    let report = timeout(RUN_TIMEOUT, pipeline.wait())
        .await
        .unwrap()
        .unwrap();

    assert!(report.controller.polls >= 1);
    assert!(report.controller.pauses.is_empty());
    assert_eq!(report.items_processed(), 40);
    assert_eq!(sink.len().await, 40);
}

#[tokio::test(flavor = "multi_thread")]
async fn heavy_throttling_neither_loses_nor_duplicates_items() {
    init_test_tracing();

    let (source, control) = ControlledSource::new(0..200u32);
    for _ in 0..20 {
        control.script_statuses([
            BufferStatus::RunningOut,
            BufferStatus::RunningOut,
            BufferStatus::FillingUp,
            BufferStatus::FillingUp,
        ]);
    }
    let sink = MemorySink::new();

    let mut pipeline = Pipeline::new(
        test_pipeline_config(4, 5),
        source,
        sink.clone(),
        slow_identity::<u32>(Duration::from_millis(1)),
    );
    pipeline.start().await.unwrap();

    let report = timeout(RUN_TIMEOUT, pipeline.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(sorted_items(&sink).await, (0..200).collect::<Vec<_>>());
    assert_eq!(report.items_processed(), 200);
    assert!(!report.controller.pauses.contains(&0));
    assert!(report.workers.iter().all(|w| w.outcome.is_completed()));
}

#[tokio::test(flavor = "multi_thread")]
async fn transform_failure_stops_one_worker_and_is_surfaced() {
    init_test_tracing();

    let (source, _control) = ControlledSource::new(0..30u32);
    let sink = MemorySink::new();

    let failing_on_seven = |item: u32| -> PipelineResult<u32> {
        std::thread::sleep(Duration::from_millis(2));
        if item == 7 {
            bail!(ErrorKind::TransformFailed, "Transform failed", "item 7");
        }

        Ok(item)
    };

    let mut pipeline = Pipeline::new(
        test_pipeline_config(3, 20),
        source,
        sink.clone(),
        failing_on_seven,
    );
    pipeline.start().await.unwrap();

    let report = timeout(RUN_TIMEOUT, pipeline.wait())
        .await
        .unwrap()
        .unwrap();

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(
        failures[0].outcome.error().map(|e| e.kind()),
        Some(ErrorKind::TransformFailed)
    );
    assert_eq!(
        report
            .workers
            .iter()
            .filter(|w| w.outcome.is_completed())
            .count(),
        2
    );

    // The failed item is not retried or delivered, every other item is.
    let expected: Vec<u32> = (0..30).filter(|item| *item != 7).collect();
    assert_eq!(sorted_items(&sink).await, expected);

    let err = report.into_result().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransformFailed);
}

/// Sink rejecting one specific item.
#[derive(Debug)]
struct RejectingSink {
    inner: MemorySink<u32>,
    rejected: u32,
}

impl DataSink for RejectingSink {
    type Item = u32;

    async fn put(&mut self, item: u32) -> PipelineResult<()> {
        if item == self.rejected {
            bail!(ErrorKind::SinkError, "Sink rejected the item", item);
        }

        self.inner.put(item).await
    }

    async fn close(&mut self) -> PipelineResult<()> {
        self.inner.close().await
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn sink_failure_stops_only_the_delivering_worker() {
    init_test_tracing();

    let sink = MemorySink::new();
    let rejecting = RejectingSink {
        inner: sink.clone(),
        rejected: 3,
    };

    let mut pipeline = Pipeline::new(
        test_pipeline_config(2, 20),
        MemorySource::new(0..20u32),
        rejecting,
        slow_identity::<u32>(Duration::from_millis(1)),
    );
    pipeline.start().await.unwrap();

    let report = timeout(RUN_TIMEOUT, pipeline.wait())
        .await
        .unwrap()
        .unwrap();

    let failed: Vec<_> = report
        .failures()
        .map(|w| w.outcome.error().map(|e| e.kind()))
        .collect();
    assert_eq!(failed, vec![Some(ErrorKind::SinkError)]);
    assert_eq!(sink.len().await, 19);
    assert!(sink.is_closed().await);
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_stops_every_worker_without_losing_fetched_items() {
    init_test_tracing();

    let (source, control) = ControlledSource::new(0..1_000u32);
    let sink = MemorySink::new();
    let progress = ProgressTracker::new();

    let mut pipeline = Pipeline::new(
        test_pipeline_config(3, 20),
        source,
        sink.clone(),
        slow_identity::<u32>(Duration::from_millis(5)),
    )
    .with_progress(progress.clone());
    pipeline.start().await.unwrap();

    control.wait_for_fetches(10).await;

    let report = timeout(RUN_TIMEOUT, pipeline.shutdown_and_wait())
        .await
        .unwrap()
        .unwrap();

    assert!(report.cancelled);
    assert!(report.workers.iter().all(|w| w.outcome.is_cancelled()));
    assert!(report.items_processed() < 1_000);

    // Every fetched item was delivered before the worker stopped.
    assert_eq!(report.items_processed(), control.fetches());
    assert_eq!(sink.len().await as u64, control.fetches());
    assert_eq!(progress.completed(), control.fetches());
    assert!(progress.is_done());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_releases_paused_workers() {
    init_test_tracing();

    let (source, control) = ControlledSource::new(0..10_000u32);
    control.set_default_status(BufferStatus::RunningOut);
    let sink = MemorySink::new();

    let mut pipeline = Pipeline::new(
        test_pipeline_config(3, 10),
        source,
        sink.clone(),
        slow_identity::<u32>(Duration::from_millis(2)),
    );
    pipeline.start().await.unwrap();

    let states = pipeline.worker_states();
    timeout(RUN_TIMEOUT, async {
        while !(states[1].is_paused() && states[2].is_paused()) {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("workers 1 and 2 should be paused");
    assert!(!states[0].is_paused());

    let shutdown_tx = pipeline.shutdown_tx();
    shutdown_tx.shutdown();

    let report = timeout(RUN_TIMEOUT, pipeline.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.controller.pauses, vec![2, 1]);
    assert_eq!(report.controller.drained, vec![1, 2]);
    assert!(report.workers.iter().all(|w| w.outcome.is_cancelled()));
    assert!(states.iter().all(|s| !s.is_paused() && s.is_finished()));
    assert_eq!(sink.len().await as u64, control.fetches());
}

#[tokio::test(flavor = "multi_thread")]
async fn controller_keeps_polling_while_a_worker_waits_on_a_slow_source() {
    init_test_tracing();

    let (source, control) = ControlledSource::new(0..6u32);
    control.set_default_status(BufferStatus::RunningOut);
    // Each fetch holds the source lock for the whole delay.
    control.set_fetch_delay(Duration::from_millis(200));
    let sink = MemorySink::new();

    let mut pipeline = Pipeline::new(
        test_pipeline_config(3, 20),
        source,
        sink.clone(),
        identity::<u32>,
    );
    pipeline.start().await.unwrap();

    let states = pipeline.worker_states();
    timeout(Duration::from_millis(150), async {
        while !(states[1].is_paused() && states[2].is_paused()) {
            sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("throttling should not wait for a pending fetch");

    let report = timeout(RUN_TIMEOUT, pipeline.wait())
        .await
        .unwrap()
        .unwrap()
        .into_result()
        .unwrap();

    // Six fetches of 200ms take more than a second, polled every 20ms.
    assert!(
        report.controller.polls >= 20,
        "controller polled only {} times",
        report.controller.polls
    );
    assert_eq!(report.controller.pauses, vec![2, 1]);
    assert_eq!(sorted_items(&sink).await, (0..6).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_reader_does_not_delay_throttling() {
    init_test_tracing();

    let buffer = BufferConfig {
        capacity: 4,
        low_watermark: 1,
        high_watermark: 3,
    };
    let reader = (0..8u32).map(|item| {
        std::thread::sleep(Duration::from_millis(200));
        Ok(item)
    });
    let source = BufferedSource::spawn(&buffer, 8, reader).unwrap();
    let sink = MemorySink::new();

    let mut pipeline = Pipeline::new(
        test_pipeline_config(3, 20),
        source,
        sink.clone(),
        identity::<u32>,
    );
    pipeline.start().await.unwrap();

    // Workers wait on an empty buffer, which is when throttling matters most.
    let states = pipeline.worker_states();
    timeout(Duration::from_millis(150), async {
        while !(states[1].is_paused() && states[2].is_paused()) {
            sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("running out should pause workers within a few intervals");

    let report = timeout(RUN_TIMEOUT, pipeline.wait())
        .await
        .unwrap()
        .unwrap()
        .into_result()
        .unwrap();

    assert!(
        report.controller.polls >= 40,
        "controller polled only {} times",
        report.controller.polls
    );
    assert_eq!(report.controller.pauses, vec![2, 1]);
    assert_eq!(sorted_items(&sink).await, (0..8).collect::<Vec<_>>());
}

#[tokio::test(flavor = "multi_thread")]
async fn cancellation_completes_while_the_reader_is_stalled() {
    init_test_tracing();

    let (feed_tx, feed_rx) = std_mpsc::channel::<u32>();
    let source =
        BufferedSource::spawn(&BufferConfig::default(), 100, feed_rx.into_iter().map(Ok)).unwrap();
    let sink = MemorySink::new();
    let progress = ProgressTracker::new();

    let mut pipeline = Pipeline::new(
        test_pipeline_config(2, 20),
        source,
        sink.clone(),
        identity::<u32>,
    )
    .with_progress(progress.clone());
    pipeline.start().await.unwrap();

    // One item goes through, then the reader blocks inside its iterator.
    feed_tx.send(7).unwrap();
    timeout(RUN_TIMEOUT, async {
        while progress.completed() < 1 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let report = timeout(Duration::from_secs(3), pipeline.shutdown_and_wait())
        .await
        .expect("pipeline should stop although the reader is stalled")
        .unwrap();

    assert!(report.cancelled);
    assert!(report.workers.iter().all(|w| w.outcome.is_cancelled()));
    assert_eq!(report.items_processed(), 1);
    assert_eq!(sink.items().await, vec![7]);

    // Lets the detached reader return.
    drop(feed_tx);
}

/// Close calls observed by [`ClosingLogSource`] and [`ClosingLogSink`].
type CloseLog = Arc<StdMutex<Vec<&'static str>>>;

struct ClosingLogSource {
    inner: MemorySource<u32>,
    log: CloseLog,
}

impl DataSource for ClosingLogSource {
    type Item = u32;

    type Gauge = MemoryGauge;

    async fn get(&mut self) -> PipelineResult<Option<u32>> {
        self.inner.get().await
    }

    fn gauge(&self) -> MemoryGauge {
        self.inner.gauge()
    }

    fn total_work(&self) -> u64 {
        self.inner.total_work()
    }

    async fn close(&mut self) -> PipelineResult<()> {
        self.log.lock().unwrap().push("source");
        Ok(())
    }
}

struct ClosingLogSink {
    log: CloseLog,
}

impl DataSink for ClosingLogSink {
    type Item = u32;

    async fn put(&mut self, _item: u32) -> PipelineResult<()> {
        Ok(())
    }

    async fn close(&mut self) -> PipelineResult<()> {
        self.log.lock().unwrap().push("sink");
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn sink_is_closed_once_before_the_source() {
    init_test_tracing();

    let log = CloseLog::default();
    let source = ClosingLogSource {
        inner: MemorySource::new(0..5),
        log: log.clone(),
    };
    let sink = ClosingLogSink { log: log.clone() };

    let mut pipeline = Pipeline::new(test_pipeline_config(2, 20), source, sink, identity::<u32>);
    pipeline.start().await.unwrap();
    timeout(RUN_TIMEOUT, pipeline.wait())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["sink", "source"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn buffered_source_feeds_the_pipeline_end_to_end() {
    init_test_tracing();

    let buffer = BufferConfig {
        capacity: 16,
        low_watermark: 4,
        high_watermark: 12,
    };
    let source = BufferedSource::spawn(&buffer, 300, (0..300u32).map(Ok)).unwrap();
    let sink = MemorySink::new();
    let progress = ProgressTracker::new();

    let mut pipeline = Pipeline::new(
        test_pipeline_config(4, 5),
        source,
        sink.clone(),
        slow_identity::<u32>(Duration::from_millis(1)),
    )
    .with_progress(progress.clone());
    pipeline.start().await.unwrap();

    let report = timeout(RUN_TIMEOUT, pipeline.wait())
        .await
        .unwrap()
        .unwrap()
        .into_result()
        .unwrap();

    assert_eq!(sorted_items(&sink).await, (0..300).collect::<Vec<_>>());
    assert_eq!(report.items_processed(), 300);
    assert!(!report.controller.pauses.contains(&0));
    assert!((progress.fraction() - 1.0).abs() < f64::EPSILON);
}

#[tokio::test(flavor = "multi_thread")]
async fn source_errors_fail_the_receiving_worker() {
    init_test_tracing();

    let items = (0..10u32).map(|item| {
        if item == 4 {
            Err(throttle::pipeline_error!(
                ErrorKind::SourceIoError,
                "Trace read failed"
            ))
        } else {
            Ok(item)
        }
    });
    let source = BufferedSource::spawn(&BufferConfig::default(), 10, items).unwrap();
    let sink = MemorySink::<u32>::new();

    let mut pipeline =
        Pipeline::new(test_pipeline_config(2, 20), source, sink.clone(), identity::<u32>);
    pipeline.start().await.unwrap();

    let report = timeout(RUN_TIMEOUT, pipeline.wait())
        .await
        .unwrap()
        .unwrap();

    let failed: Vec<_> = report.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(
        failed[0].outcome,
        WorkerOutcome::Failed(throttle::pipeline_error!(
            ErrorKind::SourceIoError,
            "Trace read failed"
        ))
    );
    assert_eq!(sink.len().await, 9);
}
