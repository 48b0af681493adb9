use std::io;
use std::sync::Once;

use ::tracing::info;
use ::tracing::subscriber::SetGlobalDefaultError;
use config::Environment;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Environment variable that turns on log output in tests.
const ENABLE_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

/// Crates whose logs are shown at `info` when `RUST_LOG` is not set.
const DEFAULT_LOG_TARGETS: &[&str] = &["throttle", "telemetry"];

static INIT_TEST_TRACING: Once = Once::new();

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to determine the runtime environment: {0}")]
    Environment(#[from] io::Error),

    #[error("failed to bridge `log` records into tracing: {0}")]
    LogBridge(#[from] tracing_log::log::SetLoggerError),

    #[error("failed to install the global tracing subscriber: {0}")]
    Subscriber(#[from] SetGlobalDefaultError),
}

/// Flushes buffered log lines when dropped.
///
/// Binaries must keep it alive until they exit, otherwise the tail of the log is lost.
#[must_use = "dropping the flusher stops the background log writer"]
pub struct LogFlusher {
    _guard: WorkerGuard,
}

/// Installs the global subscriber for a binary named `app_name`.
///
/// Development builds get human readable output; production builds emit one JSON object per
/// line. Filtering follows `RUST_LOG` and defaults to `info` for the pipeline crates.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let environment = Environment::load()?;

    LogTracer::init()?;

    let (writer, guard) = tracing_appender::non_blocking(io::stdout());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(app_name)));

    let (pretty_layer, json_layer) = match environment {
        Environment::Dev => (Some(fmt::layer().with_writer(writer)), None),
        Environment::Prod => (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(writer),
            ),
        ),
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(pretty_layer)
        .with(json_layer);

    ::tracing::subscriber::set_global_default(subscriber)?;

    info!(app = app_name, %environment, "tracing initialized");

    Ok(LogFlusher { _guard: guard })
}

/// Installs a test subscriber once per process when `ENABLE_TRACING` is set.
///
/// Output goes through the test writer so it is captured per test.
pub fn init_test_tracing() {
    INIT_TEST_TRACING.call_once(|| {
        if std::env::var(ENABLE_TRACING_ENV_NAME).is_err() {
            return;
        }

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("throttle=debug"));

        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

fn default_directives(app_name: &str) -> String {
    let mut directives = vec![format!("{app_name}=info")];
    directives.extend(
        DEFAULT_LOG_TARGETS
            .iter()
            .map(|target| format!("{target}=info")),
    );

    directives.join(",")
}
