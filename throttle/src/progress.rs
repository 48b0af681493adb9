//! Progress reporting of pipeline runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

/// Receiver of progress notifications of a pipeline run.
///
/// The pipeline calls [`ProgressMonitor::begin_task`] once at start, workers call
/// [`ProgressMonitor::worked`] once per delivered item, the pipeline names its phases through
/// [`ProgressMonitor::sub_task`] and calls [`ProgressMonitor::done`] once every component
/// stopped. Every method defaults to a no-op.
pub trait ProgressMonitor: Send + Sync + 'static {
    /// Announces a task expecting `total_work` units of work.
    fn begin_task(&self, _name: &str, _total_work: u64) {}

    /// Reports `work` additional completed units.
    fn worked(&self, _work: u64) {}

    /// Names the current phase of the task.
    fn sub_task(&self, _name: &str) {}

    /// Reports the end of the task, successful or not.
    fn done(&self) {}
}

/// Progress monitor that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressMonitor for NoopProgress {}

#[derive(Debug, Default)]
struct TrackerInner {
    total_work: AtomicU64,
    completed: AtomicU64,
    done: AtomicBool,
    sub_tasks: Mutex<Vec<String>>,
}

/// Progress monitor counting completed work with atomics.
///
/// Clones share the same counters, so the host can keep one clone to poll while the pipeline
/// reports into another.
#[derive(Debug, Default, Clone)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total work announced by the last [`ProgressMonitor::begin_task`].
    pub fn total_work(&self) -> u64 {
        self.inner.total_work.load(Ordering::Relaxed)
    }

    /// Returns the work completed so far.
    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::Relaxed)
    }

    /// Returns the phases announced since the last [`ProgressMonitor::begin_task`], oldest first.
    pub fn sub_tasks(&self) -> Vec<String> {
        self.sub_tasks_guard().clone()
    }

    /// Returns `true` once [`ProgressMonitor::done`] was called.
    pub fn is_done(&self) -> bool {
        self.inner.done.load(Ordering::Acquire)
    }

    /// Returns the completed fraction in `[0, 1]`.
    ///
    /// A task without announced work counts as complete once it is done.
    pub fn fraction(&self) -> f64 {
        let total = self.total_work();
        if total == 0 {
            return if self.is_done() { 1.0 } else { 0.0 };
        }

        (self.completed() as f64 / total as f64).min(1.0)
    }

    // The list is only pushed to, a panic while holding the lock leaves it consistent.
    fn sub_tasks_guard(&self) -> std::sync::MutexGuard<'_, Vec<String>> {
        self.inner
            .sub_tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressMonitor for ProgressTracker {
    fn begin_task(&self, name: &str, total_work: u64) {
        self.inner.total_work.store(total_work, Ordering::Relaxed);
        self.inner.completed.store(0, Ordering::Relaxed);
        self.inner.done.store(false, Ordering::Release);
        self.sub_tasks_guard().clear();

        info!(task = name, total_work, "task started");
    }

    fn worked(&self, work: u64) {
        self.inner.completed.fetch_add(work, Ordering::Relaxed);
    }

    fn sub_task(&self, name: &str) {
        debug!(sub_task = name, completed = self.completed(), "sub task");
        self.sub_tasks_guard().push(name.to_string());
    }

    fn done(&self) {
        self.inner.done.store(true, Ordering::Release);
    }
}
