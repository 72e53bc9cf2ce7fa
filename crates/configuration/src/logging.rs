use crate::error::ConfigError;
use crate::settings::LoggingParams;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global tracing subscriber: a console layer plus a daily rolling file.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. The returned guard
/// must be kept alive for the lifetime of the process or buffered file output is lost.
pub fn init_tracing(params: &LoggingParams) -> Result<WorkerGuard, ConfigError> {
    let file_appender = tracing_appender::rolling::daily(&params.directory, &params.file_prefix);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .map_err(|e| ConfigError::LoggingError(e.to_string()))?;

    Ok(guard)
}
