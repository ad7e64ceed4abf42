use anyhow::Result;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

// Keeps the non-blocking writer alive for the lifetime of the process.
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize tracing to a log file.
///
/// Stdout is reserved for user lines and CI annotations, so diagnostics go
/// to `pullsmith.log` in `PULLSMITH_LOG_DIR` (default: the temp dir).
/// Filter with `PULLSMITH_LOG`, e.g. `PULLSMITH_LOG=debug`.
pub fn init() -> Result<()> {
    let dir = std::env::var_os("PULLSMITH_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir);
    let appender = tracing_appender::rolling::never(dir, "pullsmith.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    GUARD.set(guard).ok();

    let filter = EnvFilter::try_from_env("PULLSMITH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(())
}
