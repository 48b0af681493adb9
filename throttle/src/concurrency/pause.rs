use tokio::sync::watch;

/// Transmitter side of the pause/resume channel of a single processing worker.
///
/// [`PauseTx`] is held by the worker state and driven by the throttle controller. Pausing only
/// raises the flag: the worker observes it after delivering its current item and then waits
/// until the flag is cleared again.
#[derive(Debug, Clone)]
pub struct PauseTx(watch::Sender<bool>);

impl PauseTx {
    /// Wraps a watch sender into a [`PauseTx`].
    pub fn new(tx: watch::Sender<bool>) -> Self {
        Self(tx)
    }

    /// Requests the worker to pause. Returns `true` if the flag changed.
    pub fn pause(&self) -> bool {
        self.set(true)
    }

    /// Requests the worker to resume and wakes it if it is waiting. Returns `true` if the flag
    /// changed.
    pub fn resume(&self) -> bool {
        self.set(false)
    }

    /// Returns the current value of the pause flag.
    pub fn is_paused(&self) -> bool {
        *self.0.borrow()
    }

    /// Creates a new pause receiver subscription.
    pub fn subscribe(&self) -> PauseRx {
        self.0.subscribe()
    }

    fn set(&self, paused: bool) -> bool {
        // Works without subscribers, so a worker can be paused before it starts.
        self.0.send_if_modified(|current| {
            if *current == paused {
                return false;
            }

            *current = paused;
            true
        })
    }
}

/// Receiver side of the pause/resume channel.
pub type PauseRx = watch::Receiver<bool>;

/// Creates a new pause channel in the "running" state.
pub fn create_pause_channel() -> (PauseTx, PauseRx) {
    let (tx, rx) = watch::channel(false);
    (PauseTx::new(tx), rx)
}

/// Waits until the pause flag is cleared.
///
/// The flag is checked under the channel lock before suspending, so a resume issued between the
/// check and the wait is never lost. Returns immediately when the worker is not paused, and also
/// returns if the transmitter is dropped.
pub async fn wait_until_resumed(pause_rx: &mut PauseRx) {
    let _ = pause_rx.wait_for(|paused| !*paused).await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[test]
    fn pause_and_resume_report_changes() {
        let (tx, rx) = create_pause_channel();

        assert!(tx.pause());
        assert!(!tx.pause());
        assert!(tx.is_paused());
        assert!(*rx.borrow());

        assert!(tx.resume());
        assert!(!tx.resume());
        assert!(!tx.is_paused());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_not_paused() {
        let (_tx, mut rx) = create_pause_channel();

        timeout(Duration::from_secs(1), wait_until_resumed(&mut rx))
            .await
            .expect("worker should not wait when running");
    }

    #[tokio::test]
    async fn resume_before_wait_is_not_lost() {
        let (tx, mut rx) = create_pause_channel();

        // Pause and resume both happen before the waiter looks at the flag.
        tx.pause();
        tx.resume();

        timeout(Duration::from_secs(1), wait_until_resumed(&mut rx))
            .await
            .expect("an earlier resume must release the waiter");
    }

    #[tokio::test]
    async fn paused_waiter_is_released_by_resume() {
        let (tx, mut rx) = create_pause_channel();
        tx.pause();

        let waiter = tokio::spawn(async move {
            wait_until_resumed(&mut rx).await;
        });

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        tx.resume();

        timeout(Duration::from_secs(5), waiter)
            .await
            .expect("waiter should be released")
            .unwrap();
    }
}
