use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber: stdout always, plus a daily rolling file when enabled.
pub fn init_logger(cfg: &LoggingConfig) -> Result<()> {
    init_logger_at(cfg, Path::new(&cfg.file_path))
}

/// Same as [`init_logger`] but writing to `file_name` next to the configured log file.
pub fn init_logger_named(cfg: &LoggingConfig, file_name: &str) -> Result<()> {
    init_logger_at(cfg, &sibling_log_path(&cfg.file_path, file_name))
}

fn init_logger_at(cfg: &LoggingConfig, file_path: &Path) -> Result<()> {
    let filter = EnvFilter::try_new(&cfg.level).unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = fmt::layer()
        .with_target(false)
        .with_ansi(true)
        .with_writer(std::io::stdout);

    if cfg.to_file {
        let dir = file_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("./logs"));
        let name = file_path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("spider.log"));
        let appender = rolling::daily(dir, name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        GUARD.set(guard).ok();

        let file_layer = fmt::layer()
            .with_target(true)
            .with_ansi(false)
            .with_writer(non_blocking);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .context("Failed to install tracing subscriber")
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .try_init()
            .context("Failed to install tracing subscriber")
    }
}

fn sibling_log_path(file_path: &str, file_name: &str) -> PathBuf {
    Path::new(file_path)
        .parent()
        .map(|dir| dir.join(file_name))
        .unwrap_or_else(|| PathBuf::from(file_name))
}
