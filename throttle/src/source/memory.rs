use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::PipelineResult;
use crate::source::{BufferGauge, BufferStatus, DataSource};

/// Gauge of a [`MemorySource`], tracking how many items are left.
#[derive(Debug, Clone)]
pub struct MemoryGauge {
    remaining: Arc<AtomicUsize>,
}

impl BufferGauge for MemoryGauge {
    fn is_end_of_data(&self) -> bool {
        self.remaining.load(Ordering::Acquire) == 0
    }

    fn buffer_status(&self) -> BufferStatus {
        BufferStatus::Normal
    }
}

/// In-memory source backed by a queue of items known upfront.
///
/// Its buffer status is always [`BufferStatus::Normal`], so it never triggers throttling.
#[derive(Debug)]
pub struct MemorySource<T> {
    items: VecDeque<T>,
    total_work: u64,
    remaining: Arc<AtomicUsize>,
}

impl<T> MemorySource<T> {
    /// Creates a source that yields `items` in order.
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        let items: VecDeque<T> = items.into_iter().collect();
        let total_work = items.len() as u64;
        let remaining = Arc::new(AtomicUsize::new(items.len()));

        Self {
            items,
            total_work,
            remaining,
        }
    }

    /// Returns the number of items not yet handed out.
    pub fn remaining(&self) -> usize {
        self.items.len()
    }
}

impl<T> FromIterator<T> for MemorySource<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<T> DataSource for MemorySource<T>
where
    T: Send,
{
    type Item = T;

    type Gauge = MemoryGauge;

    async fn get(&mut self) -> PipelineResult<Option<T>> {
        let item = self.items.pop_front();
        self.remaining.store(self.items.len(), Ordering::Release);

        Ok(item)
    }

    fn gauge(&self) -> MemoryGauge {
        MemoryGauge {
            remaining: self.remaining.clone(),
        }
    }

    fn total_work(&self) -> u64 {
        self.total_work
    }
}
