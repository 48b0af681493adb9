//! Runner binary.
//!
//! Loads the runner configuration, initializes tracing and processes a synthetic seismic trace
//! workload through a throttled pipeline until it completes or a shutdown signal arrives.

use crate::config::load_runner_config;
use crate::core::start_runner_with_config;

use ::config::shared::RunnerConfig;
use telemetry::tracing::init_tracing;
use tracing::error;

mod config;
mod core;
mod workload;

fn main() -> anyhow::Result<()> {
    let runner_config = load_runner_config()?;

    // The flusher must outlive the runtime so the tail of the log is written.
    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(runner_config))?;

    Ok(())
}

async fn async_main(runner_config: RunnerConfig) -> anyhow::Result<()> {
    if let Err(err) = start_runner_with_config(runner_config).await {
        error!("{err:#}");

        return Err(err);
    }

    Ok(())
}
