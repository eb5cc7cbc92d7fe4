//! Tracing subscriber setup.
//!
//! The engine itself only emits `tracing` events; embedding applications
//! call one of these helpers (or install their own subscriber).

use std::path::Path;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "fathom_core=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs a stderr subscriber filtered by `RUST_LOG`.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Installs a subscriber writing daily-rotated files under `dir`.
///
/// The returned guard must be kept alive for the lifetime of the
/// process; dropping it stops the background writer.
pub fn init_with_file(dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, "fathom.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}
