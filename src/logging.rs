//! Structured logging setup using tracing.

use crate::config::{FileLoggingConfig, LogFormat, LogRotation, LoggingConfig};
use std::fs;
use std::io;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Guard that must be kept alive for the duration of the program.
/// When dropped, flushes and closes the file writer.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the logging system based on configuration.
/// Returns a guard that must be kept alive for file logging to work.
pub fn init_logging(config: &LoggingConfig) -> LogGuard {
    if !config.log_requests {
        return LogGuard { _file_guard: None };
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (file_writer, file_guard) = config.file.as_ref().map(create_file_writer).unzip();

    // A None layer is a no-op
    match config.format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_writer(io::stdout))
            .with(file_writer.map(|w| fmt::layer().json().with_writer(w)))
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(io::stdout))
            .with(file_writer.map(|w| fmt::layer().json().with_writer(w)))
            .init(),
    }

    LogGuard {
        _file_guard: file_guard,
    }
}

fn create_file_writer(config: &FileLoggingConfig) -> (NonBlocking, WorkerGuard) {
    // Ensure log directory exists
    fs::create_dir_all(&config.log_dir).ok();

    let rotation = match config.rotation {
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Never => Rotation::NEVER,
    };

    let file_appender = RollingFileAppender::new(rotation, &config.log_dir, &config.file_prefix);

    tracing_appender::non_blocking(file_appender)
}
