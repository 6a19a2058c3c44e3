//! Logging infrastructure for the portaglobe server.
//!
//! Structured logging with file and console output:
//! - Writes to `logs/portaglobe.log` via a non-blocking appender
//! - Also prints to stdout for CLI tailing
//! - Configurable via the RUST_LOG environment variable
//!
//! Operational logging stays on this stream; user-facing globe metadata
//! lives in [`crate::info::GlobeInfo`] records, never in log files.

use std::fs;
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard flushes and closes the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initializes the logging system.
///
/// # Arguments
///
/// * `log_dir` - Directory for log files (e.g., "logs")
/// * `log_file` - Log filename (e.g., "portaglobe.log")
///
/// # Errors
///
/// Returns an error if the log directory cannot be created.
pub fn init_logging(log_dir: &str, log_file: &str) -> Result<LoggingGuard, io::Error> {
    fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    // Compact single-line format: tile serving is high-volume.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .compact();

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true)
        .compact();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Default log directory path.
pub fn default_log_dir() -> &'static str {
    "logs"
}

/// Default log file name.
pub fn default_log_file() -> &'static str {
    "portaglobe.log"
}
