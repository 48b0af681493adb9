use tokio::sync::watch;

/// Receiver side of the cancellation handle of a run.
///
/// Every worker and the controller hold their own clone and check it cooperatively.
pub type ShutdownRx = watch::Receiver<bool>;

/// Transmitter side of the cancellation handle of a run.
///
/// The flag is latched: once [`ShutdownTx::shutdown`] has been called it never resets, and
/// receivers created afterwards observe it immediately.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Wraps a watch sender into a [`ShutdownTx`].
    pub fn new(tx: watch::Sender<bool>) -> Self {
        Self(tx)
    }

    /// Requests shutdown of every current and future subscriber.
    ///
    /// Returns `true` if this call is the one that requested it.
    pub fn shutdown(&self) -> bool {
        // `send_replace` stores the value even when nobody is subscribed yet.
        !self.0.send_replace(true)
    }

    /// Returns `true` once shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Creates a new receiver of the cancellation flag.
    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

/// Creates a new cancellation handle in the "running" state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx::new(tx), rx)
}

/// Non-blocking cancellation check, used at the top of the worker and controller loops.
pub fn is_shutdown_requested(shutdown_rx: &ShutdownRx) -> bool {
    *shutdown_rx.borrow()
}

/// Waits until shutdown is requested.
///
/// Never resolves if the transmitter is dropped without requesting shutdown.
pub async fn wait_for_shutdown(shutdown_rx: &mut ShutdownRx) {
    if shutdown_rx.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}
