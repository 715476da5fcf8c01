//! Logging initialization for campaignctl.
//!
//! Watch mode: logs to `<state>/logs/campaignctl-{datetime}.log`
//! One-shot commands: log to stderr

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

/// Result of logging initialization
pub struct LoggingHandle {
    /// Flushes buffered log lines when dropped; keep alive for the whole run
    pub _guard: Option<WorkerGuard>,

    /// Path to the log file (only set in watch mode with file logging enabled)
    pub log_file_path: Option<PathBuf>,
}

/// Level to use, honouring `--debug`
fn effective_level(config: &Config, debug_override: bool) -> String {
    if debug_override {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    }
}

/// Timestamped log file name
fn log_file_name(now: chrono::DateTime<chrono::Utc>) -> String {
    format!("campaignctl-{}.log", now.format("%Y%m%dT%H%M%SZ"))
}

/// Whether this run writes to a log file instead of stderr
fn logs_to_file(config: &Config, is_watch_mode: bool) -> bool {
    is_watch_mode && config.logging.to_file
}

/// Initialize logging based on mode and configuration.
///
/// `RUST_LOG` overrides the configured level. Watch modes keep the terminal
/// clear for the polled view, so they log to a file when `logging.to_file` is set.
pub fn init_logging(
    config: &Config,
    is_watch_mode: bool,
    debug_override: bool,
) -> Result<LoggingHandle> {
    let log_level = effective_level(config, debug_override);
    let filter = tracing_subscriber::EnvFilter::new(std::env::var("RUST_LOG").unwrap_or(log_level));

    if logs_to_file(config, is_watch_mode) {
        let logs_dir = config.logs_path();
        std::fs::create_dir_all(&logs_dir)?;

        let log_filename = log_file_name(chrono::Utc::now());
        let log_file_path = logs_dir.join(&log_filename);
        let (non_blocking, guard) = file_writer(&logs_dir, &log_filename);

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .init();

        Ok(LoggingHandle {
            _guard: Some(guard),
            log_file_path: Some(log_file_path),
        })
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();

        Ok(LoggingHandle {
            _guard: None,
            log_file_path: None,
        })
    }
}

fn file_writer(
    logs_dir: &Path,
    file_name: &str,
) -> (tracing_appender::non_blocking::NonBlocking, WorkerGuard) {
    let file_appender = tracing_appender::rolling::never(logs_dir, file_name);
    tracing_appender::non_blocking(file_appender)
}
