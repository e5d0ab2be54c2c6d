//! Logging setup for the cleanup job.
//!
//! Events go to the console and to daily-rolling files in the log directory:
//!
//! - `claims-cleanup.<date>.log`: everything the filter lets through
//! - `error.<date>.log`: warnings and errors only
//!
//! Ten files of each kind are kept. The filter defaults to `info` and can be
//! overridden with `RUST_LOG`. When the files cannot be set up,
//! [`init_console`] installs the console output alone.
//!
//! ```no_run
//! claims_cleanup::logging::init().expect("Failed to initialize logging");
//! tracing::info!("Job started");
//! ```

use crate::config;
use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

const LOG_PREFIX: &str = "claims-cleanup";
const ERROR_LOG_PREFIX: &str = "error";
const MAX_LOG_FILES: usize = 10;

/// Log directory: `CLAIMS_CLEANUP_LOG_DIR` when set, otherwise
/// `<data dir>/claims-cleanup/logs` (e.g. `~/.local/share/claims-cleanup/logs`).
/// Created if missing.
///
/// # Errors
///
/// Returns an error if no data directory is known or it cannot be created.
pub fn get_log_dir() -> Result<PathBuf> {
    let log_dir = match config::log_dir_override(config::env_lookup) {
        Some(dir) => dir,
        None => dirs::data_dir()
            .context("Failed to determine data directory")?
            .join(LOG_PREFIX)
            .join("logs"),
    };

    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;
    }

    Ok(log_dir)
}

fn appender(log_dir: &Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(log_dir)
        .with_context(|| format!("Failed to create {prefix} file appender"))
}

fn env_filter() -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to create env filter")
}

/// Install the global subscriber.
///
/// # Errors
///
/// Returns an error if the log directory or appenders cannot be created, or a
/// subscriber is already installed.
pub fn init() -> Result<()> {
    let log_dir = get_log_dir()?;

    let env_filter = env_filter()?;

    let console_layer = fmt::layer().with_target(false).compact();

    let all_logs_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(appender(&log_dir, LOG_PREFIX)?);

    let error_logs_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(appender(&log_dir, ERROR_LOG_PREFIX)?)
        .with_filter(EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(all_logs_layer)
        .with(error_logs_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!("Logging initialized, log directory: {}", log_dir.display());
    Ok(())
}

/// Install a console-only subscriber, for when [`init`] fails.
///
/// # Errors
///
/// Returns an error if a subscriber is already installed.
pub fn init_console() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter()?)
        .with(fmt::layer().with_target(false).compact())
        .try_init()
        .context("Failed to install console subscriber")
}
