use std::fmt;
use std::future::Future;

use crate::error::PipelineResult;

/// Occupancy signal of the internal buffer of a [`DataSource`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BufferStatus {
    /// Occupancy is within bounds, no throttling is needed.
    #[default]
    Normal,
    /// The buffer is close to full, more consumers are welcome.
    FillingUp,
    /// The buffer is close to empty, consumers outpace the producer.
    RunningOut,
}

impl fmt::Display for BufferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::FillingUp => write!(f, "filling_up"),
            Self::RunningOut => write!(f, "running_out"),
        }
    }
}

/// Lock-free view of the buffer of a [`DataSource`].
///
/// The throttle controller polls the gauge instead of the source, so a worker waiting inside
/// [`DataSource::get`] while holding the source lock never delays a poll. Clones observe the same
/// buffer.
pub trait BufferGauge: Clone + Send + Sync + 'static {
    /// Returns `true` once the source will never produce another item. Monotonic.
    fn is_end_of_data(&self) -> bool;

    /// Returns the current occupancy signal. The value may be slightly stale.
    fn buffer_status(&self) -> BufferStatus;
}

/// Trait for systems that produce work items for a pipeline.
///
/// The pipeline shares a single source between all processing workers behind a mutex that is
/// held for exactly one [`DataSource::get`] call, so implementations never see concurrent calls.
/// Buffer state is published through [`DataSource::gauge`], which the controller reads without
/// taking that mutex.
///
/// Once [`DataSource::is_end_of_data`] returned `true` it must keep returning `true`, and
/// [`DataSource::get`] must return `None` from then on.
pub trait DataSource {
    /// Type of the work items handed to workers.
    type Item;

    /// Gauge publishing the buffer state of this source.
    type Gauge: BufferGauge;

    /// Returns the next item, or `None` if the source is exhausted.
    ///
    /// A `None` makes the calling worker stop, so sources that may temporarily run dry wait for
    /// more data instead of returning early. Workers drop the returned future when cancellation
    /// is requested, so it must be cancel safe: no item may be lost if it is dropped before
    /// completing.
    fn get(&mut self) -> impl Future<Output = PipelineResult<Option<Self::Item>>> + Send;

    /// Returns a gauge over the buffer of this source.
    fn gauge(&self) -> Self::Gauge;

    /// Returns `true` once no further items will ever be produced.
    fn is_end_of_data(&self) -> bool {
        self.gauge().is_end_of_data()
    }

    /// Returns the current occupancy signal.
    fn buffer_status(&self) -> BufferStatus {
        self.gauge().buffer_status()
    }

    /// Returns the total number of items this source expects to produce.
    ///
    /// Only used for progress reporting.
    fn total_work(&self) -> u64;

    /// Releases the resources of the source.
    ///
    /// Called exactly once by the pipeline after every worker stopped. The default
    /// implementation is a no-op.
    fn close(&mut self) -> impl Future<Output = PipelineResult<()>> + Send {
        async { Ok(()) }
    }
}
