//! Tracing subscriber setup.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::settings::LoggingSettings;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Log file prefix inside the log directory
pub const LOG_FILE: &str = "mixforge.log";

/// Filter from `RUST_LOG`, falling back to `default_level`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber: a daily rolling file plus, when
/// `console` is set, human-readable output on stderr.
///
/// Returns the log directory. Calling this twice is harmless.
pub fn init_logging(settings: &LoggingSettings, console: bool) -> PathBuf {
    let log_dir = settings.resolved_directory();
    let _ = std::fs::create_dir_all(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    // stdout is reserved for command output and progress.
    let console_layer = console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_ansi(cfg!(debug_assertions))
    });

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter(&settings.level))
        .with(console_layer)
        .with(file_layer);

    let _ = tracing::subscriber::set_global_default(subscriber);
    log_dir
}
