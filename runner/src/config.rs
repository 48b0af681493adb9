use anyhow::Context;
use config::load_config;
use config::shared::RunnerConfig;

/// Loads and validates the runner configuration.
pub fn load_runner_config() -> anyhow::Result<RunnerConfig> {
    let config = load_config::<RunnerConfig>().context("failed to load runner configuration")?;
    config
        .validate()
        .context("invalid runner configuration")?;

    Ok(config)
}
