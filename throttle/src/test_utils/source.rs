use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

use crate::error::PipelineResult;
use crate::source::{BufferGauge, BufferStatus, DataSource};
use crate::test_utils::notify::TimedNotify;

#[derive(Debug, Default)]
struct SourceControlInner {
    scripted: Mutex<VecDeque<BufferStatus>>,
    default_status: Mutex<BufferStatus>,
    fetch_delay: Mutex<Duration>,
    remaining: AtomicUsize,
    status_polls: AtomicU64,
    fetches: AtomicU64,
    exhausted: AtomicBool,
    fetched: Arc<Notify>,
}

/// Test handle driving a [`ControlledSource`], also used as its gauge.
///
/// Every call to [`BufferGauge::buffer_status`] consumes the next scripted status, falling back
/// to the default status once the script is exhausted.
#[derive(Debug, Clone, Default)]
pub struct SourceControl {
    inner: Arc<SourceControlInner>,
}

impl SourceControl {
    /// Appends statuses to the script.
    pub fn script_statuses(&self, statuses: impl IntoIterator<Item = BufferStatus>) {
        self.inner.scripted.lock().unwrap().extend(statuses);
    }

    /// Sets the status reported once the script is exhausted.
    pub fn set_default_status(&self, status: BufferStatus) {
        *self.inner.default_status.lock().unwrap() = status;
    }

    /// Makes every [`DataSource::get`] wait for `delay` before handing out an item.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.inner.fetch_delay.lock().unwrap() = delay;
    }

    /// Returns how many times the buffer status was read.
    pub fn status_polls(&self) -> u64 {
        self.inner.status_polls.load(Ordering::SeqCst)
    }

    /// Returns how many items were handed out.
    pub fn fetches(&self) -> u64 {
        self.inner.fetches.load(Ordering::SeqCst)
    }

    /// Returns `true` once the source reported that it has no more items.
    pub fn is_exhausted(&self) -> bool {
        self.inner.exhausted.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` items were handed out.
    ///
    /// Panics if that does not happen within the default notification timeout.
    pub async fn wait_for_fetches(&self, count: u64) {
        let notify = TimedNotify::new(self.inner.fetched.clone());
        while self.fetches() < count {
            notify.notified().await;
        }
    }

    fn fetch_delay(&self) -> Duration {
        *self.inner.fetch_delay.lock().unwrap()
    }

    fn record_exhausted(&self) {
        self.inner.exhausted.store(true, Ordering::SeqCst);
    }

    fn record_fetch(&self) {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);
        // A single waiter is expected, `notify_one` keeps the permit if it is not waiting yet.
        self.inner.fetched.notify_one();
    }
}

impl BufferGauge for SourceControl {
    fn is_end_of_data(&self) -> bool {
        let end_of_data = self.inner.remaining.load(Ordering::SeqCst) == 0;
        if end_of_data {
            self.record_exhausted();
        }

        end_of_data
    }

    fn buffer_status(&self) -> BufferStatus {
        self.inner.status_polls.fetch_add(1, Ordering::SeqCst);

        let scripted = self.inner.scripted.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| *self.inner.default_status.lock().unwrap())
    }
}

/// In-memory source whose buffer status is scripted by the test.
#[derive(Debug)]
pub struct ControlledSource<T> {
    items: VecDeque<T>,
    total_work: u64,
    control: SourceControl,
}

impl<T> ControlledSource<T> {
    /// Creates a source yielding `items` in order, and the handle controlling it.
    pub fn new(items: impl IntoIterator<Item = T>) -> (Self, SourceControl) {
        let items: VecDeque<T> = items.into_iter().collect();
        let control = SourceControl::default();
        control.inner.remaining.store(items.len(), Ordering::SeqCst);

        let source = Self {
            total_work: items.len() as u64,
            items,
            control: control.clone(),
        };

        (source, control)
    }
}

impl<T> DataSource for ControlledSource<T>
where
    T: Send,
{
    type Item = T;

    type Gauge = SourceControl;

    async fn get(&mut self) -> PipelineResult<Option<T>> {
        // Nothing is taken before the delay elapsed, so a cancelled fetch loses no item.
        let delay = self.control.fetch_delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let item = self.items.pop_front();
        self.control
            .inner
            .remaining
            .store(self.items.len(), Ordering::SeqCst);

        match item {
            Some(_) => self.control.record_fetch(),
            None => self.control.record_exhausted(),
        }

        Ok(item)
    }

    fn gauge(&self) -> SourceControl {
        self.control.clone()
    }

    fn total_work(&self) -> u64 {
        self.total_work
    }
}
