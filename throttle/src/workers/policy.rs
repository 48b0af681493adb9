use crate::source::BufferStatus;

/// Point-in-time view of a processing worker used by the throttle policy.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct WorkerSnapshot {
    /// The pause flag is raised.
    pub paused: bool,
    /// The worker stopped and will not take further items.
    pub finished: bool,
}

impl WorkerSnapshot {
    /// Running and not asked to pause.
    fn is_active(&self) -> bool {
        !self.paused && !self.finished
    }

    /// Paused and still waiting to be resumed.
    fn is_waiting(&self) -> bool {
        self.paused && !self.finished
    }
}

/// Action the controller takes after a buffer status poll.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ThrottleDecision {
    /// Leave every worker as it is.
    Hold,
    /// Pause the worker at this index because the buffer is running out.
    Pause(usize),
    /// Resume the worker at this index because the buffer is filling up.
    Resume(usize),
    /// Resume the worker at this index because every unpaused worker already stopped.
    Unstall(usize),
}

/// Decides what the controller does for the polled `status`.
///
/// Indexes in `workers` are worker ids. At most one worker changes per poll:
///
/// - [`BufferStatus::RunningOut`] pauses the highest active index, but never index `0` nor the
///   lowest active worker, so at least one worker keeps pulling and the run makes progress;
/// - [`BufferStatus::FillingUp`] resumes the lowest index that is waiting;
/// - [`BufferStatus::Normal`] holds.
///
/// Before applying the status, if no worker is active while some are waiting, the lowest
/// waiting worker is resumed regardless of the status.
pub fn decide(status: BufferStatus, workers: &[WorkerSnapshot]) -> ThrottleDecision {
    let any_active = workers.iter().any(WorkerSnapshot::is_active);
    if !any_active && let Some(index) = lowest_waiting(workers) {
        return ThrottleDecision::Unstall(index);
    }

    match status {
        BufferStatus::RunningOut => {
            let Some(lowest_active) = workers.iter().position(WorkerSnapshot::is_active) else {
                return ThrottleDecision::Hold;
            };

            workers
                .iter()
                .enumerate()
                .skip(lowest_active + 1)
                .rev()
                .find(|(_, worker)| worker.is_active())
                .map(|(index, _)| ThrottleDecision::Pause(index))
                .unwrap_or(ThrottleDecision::Hold)
        }
        BufferStatus::FillingUp => lowest_waiting(workers)
            .map(ThrottleDecision::Resume)
            .unwrap_or(ThrottleDecision::Hold),
        BufferStatus::Normal => ThrottleDecision::Hold,
    }
}

fn lowest_waiting(workers: &[WorkerSnapshot]) -> Option<usize> {
    workers.iter().position(WorkerSnapshot::is_waiting)
}
