//! Per-item transformation supplied by the host.

use crate::error::PipelineResult;

/// Transformation applied by processing workers to every item taken from the source.
///
/// [`Processor::process`] runs on tokio's blocking pool without holding the source or the sink
/// locks, so it may be CPU heavy and run in parallel on several workers. An error, or a panic,
/// stops the worker that hit it and is reported in its outcome.
///
/// Any `Fn(I) -> PipelineResult<O>` closure is a processor.
pub trait Processor<I, O>: Send + Sync + 'static {
    /// Transforms a single item.
    fn process(&self, item: I) -> PipelineResult<O>;
}

impl<I, O, F> Processor<I, O> for F
where
    F: Fn(I) -> PipelineResult<O> + Send + Sync + 'static,
{
    fn process(&self, item: I) -> PipelineResult<O> {
        self(item)
    }
}
