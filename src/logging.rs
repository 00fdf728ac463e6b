use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use time::macros::format_description;
use time::UtcOffset;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{self, fmt, prelude::*};

const LOG_RETENTION_DAYS: u64 = 7;

/// Where session logs are written, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileLogging {
    /// Stderr only (tests, embedding callers that own their own subscriber).
    Disabled,
    /// The user-specific OS cache directory, e.g. `~/.cache/genesis/`.
    CacheDir,
    /// An explicit directory.
    Dir(PathBuf),
}

/// Get the log directory path in the user-specific OS cache directory
fn default_log_dir() -> io::Result<PathBuf> {
    let mut log_dir = dirs::cache_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "Unable to determine user cache directory"))?;
    log_dir.push("genesis");
    Ok(log_dir)
}

/// Clean up session logs older than LOG_RETENTION_DAYS
fn cleanup_old_logs(log_dir: &Path) -> io::Result<()> {
    let now = std::time::SystemTime::now();
    let retention = std::time::Duration::from_secs(LOG_RETENTION_DAYS * 24 * 60 * 60);

    for entry in fs::read_dir(log_dir)?.flatten() {
        let Ok(metadata) = entry.metadata() else { continue };
        let is_session_log = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with("session-") && name.ends_with(".log"));
        if !metadata.is_file() || !is_session_log {
            continue;
        }
        let expired = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > retention);
        if expired {
            if let Err(e) = fs::remove_file(entry.path()) {
                eprintln!("Failed to remove old log file {:?}: {}", entry.path(), e);
            }
        }
    }
    Ok(())
}

fn is_already_set(e: &dyn std::error::Error) -> bool {
    let text = e.to_string();
    text.contains("already been set") || text.contains("already initialized")
}

/// Initialize the tracing subscriber for a mining or repair session.
/// Returns a WorkerGuard that must be kept alive while file logging is in use.
///
/// # Arguments
/// * `no_color` - Disable ANSI colors in stderr output
/// * `log_level` - Override log level (otherwise uses RUST_LOG or defaults to "info")
/// * `file_logging` - Where to write the DEBUG-level session log
///
/// Calling this twice is harmless: the second call keeps the first subscriber.
pub fn init_logger(no_color: bool, log_level: Option<&str>, file_logging: FileLogging) -> io::Result<WorkerGuard> {
    let timer = fmt::time::OffsetTime::new(
        UtcOffset::UTC,
        format_description!("[[[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z]"),
    );

    let stderr_filter = match log_level {
        Some(level) => tracing_subscriber::EnvFilter::new(level),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_ansi(!no_color)
        .with_filter(stderr_filter);

    let log_dir = match file_logging {
        FileLogging::Disabled => None,
        FileLogging::CacheDir => Some(default_log_dir()?),
        FileLogging::Dir(dir) => Some(dir),
    };

    let Some(log_dir) = log_dir else {
        let (_, guard) = tracing_appender::non_blocking(std::io::sink());
        return match tracing_subscriber::registry().with(stderr_layer).try_init() {
            Ok(()) => Ok(guard),
            Err(e) if is_already_set(&e) => Ok(guard),
            Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
        };
    };

    fs::create_dir_all(&log_dir)?;
    cleanup_old_logs(&log_dir)?;

    let timestamp = time::OffsetDateTime::now_utc()
        .format(format_description!("[year][month][day]-[hour][minute][second]"))
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let log_path = log_dir.join(format!("session-{}-{}.log", timestamp, std::process::id()));
    let file = fs::OpenOptions::new().create(true).append(true).open(&log_path)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_timer(timer)
        .with_ansi(false)
        .with_filter(tracing_subscriber::EnvFilter::new("debug"));

    match tracing_subscriber::registry().with(stderr_layer).with(file_layer).try_init() {
        Ok(()) => Ok(guard),
        Err(e) if is_already_set(&e) => Ok(guard),
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let _first = init_logger(true, Some("warn"), FileLogging::Disabled).unwrap();
        let _second = init_logger(true, Some("debug"), FileLogging::Disabled).unwrap();
    }

    #[test]
    fn test_cleanup_keeps_fresh_logs() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("session-fresh.log");
        let other = dir.path().join("notes.txt");
        fs::write(&fresh, "x").unwrap();
        fs::write(&other, "y").unwrap();
        cleanup_old_logs(dir.path()).unwrap();
        assert!(fresh.exists());
        assert!(other.exists());
    }
}
