//! Shared logging setup for the Easel binary.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "easel=info,easel_db=info,easel_renderer=info,easel_workflow=info";

/// Logging configuration.
pub struct LogConfig<'a> {
    /// Filter string, typically from `LOG_LEVEL`. Falls back to the
    /// crate-scoped default when empty or unparsable.
    pub filter: Option<&'a str>,
    /// Optional append-mode log file next to the database.
    pub file: Option<&'a Path>,
}

/// Initialize tracing with a stderr layer and an optional file layer.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let make_filter = || {
        config
            .filter
            .filter(|f| !f.trim().is_empty())
            .and_then(|f| EnvFilter::try_new(f).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(make_filter());

    let file_layer = match config.file {
        Some(path) => {
            let file = open_log_file(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_filter(make_filter()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .init();

    Ok(())
}

fn open_log_file(path: &Path) -> std::io::Result<std::fs::File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Default log file path: alongside the database file.
pub fn default_log_path(db_path: &Path) -> PathBuf {
    db_path.with_extension("log")
}
