use std::path::Path;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{ConfigError, LogArgs};

/// Install the global subscriber.
///
/// Logs go to stderr, since stdout carries the MCP stream. `RUST_LOG` takes
/// precedence over `--log-level` when set. The returned guard must be held
/// until exit so buffered file output is flushed.
pub fn init_tracing(args: &LogArgs) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter = build_filter(std::env::var("RUST_LOG").ok(), &args.log_level)?;

    let (file_layer, guard) = match &args.log_file {
        Some(path) => {
            let (writer, guard) = file_writer(path)?;
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    Ok(guard)
}

fn build_filter(rust_log: Option<String>, level: &str) -> Result<EnvFilter, ConfigError> {
    let directives = rust_log
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| level.to_string());

    EnvFilter::try_new(&directives)
        .map_err(|e| ConfigError::Logging(format!("invalid log filter '{}': {}", directives, e)))
}

/// Non-blocking appender for a single, never-rotated log file
fn file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard), ConfigError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| ConfigError::Logging(format!("{} is not a file path", path.display())))?;
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy().into_owned())
        .build(directory)
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    Ok(tracing_appender::non_blocking(appender))
}
