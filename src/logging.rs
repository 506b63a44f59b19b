use std::env;
use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "GESTURECAM_LOG";
pub const LOG_FILE_NAME: &str = "gesturecam.log";

/// Build the filter from `GESTURECAM_LOG`, defaulting to `info`.
/// `1`/`true`/`yes` turn on debug output.
pub fn env_filter() -> EnvFilter {
    match env::var(LOG_ENV) {
        Ok(value) if matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES") => {
            EnvFilter::new("debug")
        }
        Ok(value) => EnvFilter::try_new(value).unwrap_or_else(|_| EnvFilter::new("info")),
        Err(_) => EnvFilter::new("info"),
    }
}

/// Send logs to `<dir>/gesturecam.log`. The terminal belongs to the UI, so
/// nothing is written to stdout. Keep the guard alive until exit so buffered
/// lines are flushed.
pub fn init_logging(dir: &Path) -> std::io::Result<WorkerGuard> {
    fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init();

    Ok(guard)
}
