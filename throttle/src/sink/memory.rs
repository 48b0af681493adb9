use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::bail;
use crate::error::{ErrorKind, PipelineResult};
use crate::sink::DataSink;

#[derive(Debug)]
struct Inner<T> {
    items: Vec<T>,
    closed: bool,
}

/// In-memory sink for tests and development.
///
/// Clones share the same storage, so a clone kept by the caller can inspect what the pipeline
/// delivered after the run.
#[derive(Debug)]
pub struct MemorySink<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> MemorySink<T> {
    /// Creates a new empty memory sink.
    pub fn new() -> Self {
        let inner = Inner {
            items: Vec::new(),
            closed: false,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Returns the number of stored items.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.items.len()
    }

    /// Returns `true` if no item was stored.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.items.is_empty()
    }

    /// Returns `true` once the sink has been closed.
    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }
}

impl<T> MemorySink<T>
where
    T: Clone,
{
    /// Returns a copy of all stored items, in delivery order.
    pub async fn items(&self) -> Vec<T> {
        let inner = self.inner.lock().await;
        inner.items.clone()
    }
}

impl<T> Clone for MemorySink<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for MemorySink<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DataSink for MemorySink<T>
where
    T: Send,
{
    type Item = T;

    async fn put(&mut self, item: T) -> PipelineResult<()> {
        let mut inner = self.inner.lock().await;

        if inner.closed {
            bail!(
                ErrorKind::SinkClosed,
                "Sink is closed",
                "An item was delivered after the sink was closed"
            );
        }

        inner.items.push(item);

        Ok(())
    }

    async fn close(&mut self) -> PipelineResult<()> {
        let mut inner = self.inner.lock().await;

        if !inner.closed {
            inner.closed = true;
            debug!(items = inner.items.len(), "memory sink closed");
        }

        Ok(())
    }
}
