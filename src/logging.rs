//! Logging setup for the capset CLI.
//!
//! Logs go to stderr plus a daily-rolling file under the config directory,
//! so a long materialization run leaves a record even when the terminal
//! scrollback is gone.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging system.
///
/// Log level can be controlled via the `CAPSET_LOG` environment variable:
/// - `CAPSET_LOG=debug` for verbose output
/// - `CAPSET_LOG=info` for standard output (default)
/// - `CAPSET_LOG=warn` for warnings and errors only
/// - `CAPSET_LOG=error` for errors only
pub fn init(log_dir: Option<PathBuf>) -> Result<()> {
    let env_filter = EnvFilter::try_from_env("CAPSET_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let log_dir = log_dir.unwrap_or_else(|| {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("capset")
            .join("logs")
    });

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "capset.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Store the guard in a static to prevent it from being dropped
    // This is safe because we only call init() once at startup
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(_guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    tracing::debug!("Logging initialized, file backend at {:?}", log_dir);
    Ok(())
}
