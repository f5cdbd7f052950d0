//! Structured logging setup using `tracing-subscriber` and `tracing-appender`.
//!
//! Two modes:
//! - **File** ([`init_with_file`]): JSON file layer (daily rotation) plus a
//!   console layer, for long-running deployments.
//! - **Console** ([`init_console`]): console-only.
//!
//! Both respect `RUST_LOG`; without it the receiver logs at `info`, which
//! covers breaker state changes, poll-loop lifecycle, and rejected webhook
//! requests.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix for the daily-rotated JSON log.
const LOG_FILE_NAME: &str = "receiver.log";

/// Holds the non-blocking writer guard for file logging.
///
/// The [`WorkerGuard`] must be kept alive for the duration of the process.
/// Dropping it flushes pending log entries and closes the file.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialise logging with a JSON file layer and a console layer.
///
/// Writes JSON logs to `{logs_dir}/receiver.log.YYYY-MM-DD` with daily
/// rotation, plus human-readable output to stderr.
///
/// Returns a [`LoggingGuard`] that must be kept alive for log flushing.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created or a global
/// subscriber is already installed.
pub fn init_with_file(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir).with_context(|| {
        format!("failed to create logs directory {}", logs_dir.display())
    })?;

    let file_appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking);

    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(json_layer)
        .with(console_layer)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    Ok(LoggingGuard { _guard: guard })
}

/// Initialise console-only logging.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_console() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("a global tracing subscriber is already installed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_init_creates_directory_and_rejects_reinit() {
        let dir = std::env::temp_dir().join(format!("receiver-logs-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let guard = init_with_file(&dir).expect("first init succeeds");
        assert!(dir.is_dir(), "logs directory must exist after init");
        tracing::info!("receiver logging online");

        // The global subscriber slot is taken now; a second init must fail
        // cleanly rather than panic.
        assert!(init_with_file(&dir).is_err());
        assert!(init_console().is_err());

        drop(guard);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
