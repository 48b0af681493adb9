use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use config::shared::BufferConfig;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{ErrorKind, PipelineResult};
use crate::pipeline_error;
use crate::source::{BufferGauge, BufferStatus, DataSource};

/// Time [`BufferedSource::close`] waits for the reader before detaching it.
const READER_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct BufferedGaugeInner {
    occupancy: AtomicUsize,
    reader_done: AtomicBool,
    low_watermark: usize,
    high_watermark: usize,
}

/// Gauge of a [`BufferedSource`], updated by the reader and by [`DataSource::get`].
#[derive(Debug, Clone)]
pub struct BufferedGauge {
    inner: Arc<BufferedGaugeInner>,
}

impl BufferedGauge {
    fn new(config: &BufferConfig) -> Self {
        Self {
            inner: Arc::new(BufferedGaugeInner {
                occupancy: AtomicUsize::new(0),
                reader_done: AtomicBool::new(false),
                low_watermark: config.low_watermark,
                high_watermark: config.high_watermark,
            }),
        }
    }

    /// Returns the number of items staged in the buffer.
    ///
    /// An item counts from the moment the reader starts handing it over until a worker took it.
    pub fn occupancy(&self) -> usize {
        self.inner.occupancy.load(Ordering::Acquire)
    }

    /// Returns `true` once the reader stopped producing, whatever the reason.
    pub fn is_reader_done(&self) -> bool {
        self.inner.reader_done.load(Ordering::Acquire)
    }

    fn staged(&self) {
        self.inner.occupancy.fetch_add(1, Ordering::AcqRel);
    }

    fn unstaged(&self) {
        self.inner.occupancy.fetch_sub(1, Ordering::AcqRel);
    }
}

impl BufferGauge for BufferedGauge {
    fn is_end_of_data(&self) -> bool {
        // Nothing is staged once the reader is done, so both conditions stay true.
        self.is_reader_done() && self.occupancy() == 0
    }

    fn buffer_status(&self) -> BufferStatus {
        let occupancy = self.occupancy();

        if occupancy >= self.inner.high_watermark {
            BufferStatus::FillingUp
        } else if occupancy <= self.inner.low_watermark && !self.is_reader_done() {
            BufferStatus::RunningOut
        } else {
            BufferStatus::Normal
        }
    }
}

/// Marks the reader as done when it returns, including by a panic of the iterator.
struct ReaderDoneGuard(BufferedGauge);

impl Drop for ReaderDoneGuard {
    fn drop(&mut self) {
        self.0.inner.reader_done.store(true, Ordering::Release);
    }
}

/// Source fed by a background reader that stages items in a bounded buffer.
///
/// The reader runs on tokio's blocking pool and pulls from any iterator, so it can wrap blocking
/// I/O such as reading traces from disk. Errors yielded by the iterator are forwarded in order
/// and fail the worker that receives them.
///
/// The buffer status follows the occupancy of the staging buffer:
///
/// - at or above [`BufferConfig::high_watermark`] it is [`BufferStatus::FillingUp`];
/// - at or below [`BufferConfig::low_watermark`] while the reader is still producing it is
///   [`BufferStatus::RunningOut`];
/// - otherwise it is [`BufferStatus::Normal`].
#[derive(Debug)]
pub struct BufferedSource<T> {
    rx: mpsc::Receiver<PipelineResult<T>>,
    reader: Option<JoinHandle<()>>,
    gauge: BufferedGauge,
    total_work: u64,
}

impl<T> BufferedSource<T>
where
    T: Send + 'static,
{
    /// Starts the background reader over `reader` and returns the source draining it.
    ///
    /// `total_work` is the number of items the reader is expected to produce and is only used
    /// for progress reporting. Must be called from within a tokio runtime.
    pub fn spawn<I>(config: &BufferConfig, total_work: u64, reader: I) -> PipelineResult<Self>
    where
        I: IntoIterator<Item = PipelineResult<T>>,
        I::IntoIter: Send + 'static,
    {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.capacity);
        let gauge = BufferedGauge::new(config);
        let items = reader.into_iter();

        let reader_gauge = gauge.clone();
        let reader = tokio::task::spawn_blocking(move || {
            let _done = ReaderDoneGuard(reader_gauge.clone());

            let mut produced = 0u64;
            for item in items {
                // Counted before the send, so a worker never takes an item that is not counted.
                reader_gauge.staged();
                if tx.blocking_send(item).is_err() {
                    reader_gauge.unstaged();
                    debug!(produced, "source closed, stopping reader early");
                    return;
                }

                produced += 1;
            }

            debug!(produced, "reader finished producing items");
        });

        Ok(Self {
            rx,
            reader: Some(reader),
            gauge,
            total_work,
        })
    }

    /// Returns the number of items currently staged in the buffer.
    pub fn buffered(&self) -> usize {
        self.gauge.occupancy()
    }
}

impl<T> DataSource for BufferedSource<T>
where
    T: Send + 'static,
{
    type Item = T;

    type Gauge = BufferedGauge;

    async fn get(&mut self) -> PipelineResult<Option<T>> {
        // `recv` is cancel safe and the gauge is only updated once it returned.
        let received = self.rx.recv().await;
        if received.is_some() {
            self.gauge.unstaged();
        }

        match received {
            Some(Ok(item)) => Ok(Some(item)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }

    fn gauge(&self) -> BufferedGauge {
        self.gauge.clone()
    }

    fn total_work(&self) -> u64 {
        self.total_work
    }

    /// Closes the buffer and waits for the reader to stop.
    ///
    /// A reader blocked on a full buffer stops right away. A reader stuck inside its iterator is
    /// detached after a short grace period.
    async fn close(&mut self) -> PipelineResult<()> {
        self.rx.close();

        let Some(reader) = self.reader.take() else {
            return Ok(());
        };

        match tokio::time::timeout(READER_SHUTDOWN_GRACE, reader).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                warn!(error = %err, "source reader did not finish cleanly");

                Err(pipeline_error!(
                    ErrorKind::SourceError,
                    "Source reader panicked",
                    source: err
                ))
            }
            Err(_) => {
                warn!(
                    grace_ms = READER_SHUTDOWN_GRACE.as_millis() as u64,
                    "source reader is still producing, detaching it"
                );

                Ok(())
            }
        }
    }
}
