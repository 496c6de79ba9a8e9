//! Tracing subscriber setup.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

use crate::config::{LogConfig, LogFormat};

const LOG_FILE_NAME: &str = "rpcservice.log";

/// Install the global subscriber.
///
/// `RUST_LOG`, when set, takes precedence over the configured level. When a
/// log directory is configured the returned guard must be kept alive for the
/// lifetime of the program; dropping it stops the background writer.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::builder().parse_lossy(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone()),
    );

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    let Some(directory) = &config.directory else {
        match config.format {
            LogFormat::Text => builder.try_init(),
            LogFormat::Json => builder.json().try_init(),
        }
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;
        return Ok(None);
    };

    std::fs::create_dir_all(directory)
        .with_context(|| format!("failed to create log directory {}", directory.display()))?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, directory, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let builder = builder.with_writer(non_blocking).with_ansi(false);

    match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    tracing::info!("File logging enabled to {}/{}", directory.display(), LOG_FILE_NAME);
    Ok(Some(guard))
}
