use std::future::Future;

use crate::error::PipelineResult;

/// Trait for systems that consume the results of a pipeline.
///
/// The pipeline shares a single sink between all processing workers behind a mutex that is held
/// for exactly one [`DataSink::put`] call, so implementations never see concurrent calls. Results
/// arrive in no particular order.
pub trait DataSink {
    /// Type of the results accepted by the sink.
    type Item;

    /// Stores one result.
    ///
    /// An error fails the worker that delivered the result; other workers keep running.
    fn put(&mut self, item: Self::Item) -> impl Future<Output = PipelineResult<()>> + Send;

    /// Flushes and releases the sink.
    ///
    /// Called exactly once by the pipeline, after every worker stopped and before the source is
    /// closed.
    fn close(&mut self) -> impl Future<Output = PipelineResult<()>> + Send;
}
