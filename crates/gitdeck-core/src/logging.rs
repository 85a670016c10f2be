//! Logging infrastructure for gitdeck.
//!
//! Structured logging with the `tracing` ecosystem. The terminal belongs to
//! the dashboard while it runs, so logs only go to a JSON lines file.
//!
//! ## Example
//!
//! ```no_run
//! use gitdeck_core::logging;
//!
//! let _guard = logging::init_logging(None, false).expect("logging init");
//!
//! tracing::info!("gitdeck started");
//! tracing::debug!(window = "main", generation = 3, "task submitted");
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{DeckError, Result};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "GITDECK_LOG";

/// Guard that must be held to ensure log flushing on shutdown.
///
/// Keep this guard alive for the lifetime of the application.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the gitdeck logging system.
///
/// Logs are written as JSON lines to `<log_dir>/gitdeck.log` (rolled daily)
/// through a non-blocking writer, so a slow disk never stalls the UI thread.
///
/// * `log_dir` - Optional custom log directory. Defaults to [`default_log_dir`].
/// * `verbose` - If true, the default level is DEBUG instead of INFO.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| DeckError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "gitdeck.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(format!("gitdeck={default_level}")));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Initialize minimal logging for tests. Safe to call more than once.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Get the default log directory path.
///
/// Returns `<state dir>/gitdeck/logs`, falling back to `~/.local/state` when
/// the platform has no state directory.
pub fn default_log_dir() -> Result<PathBuf> {
    if let Some(state) = dirs::state_dir() {
        return Ok(state.join("gitdeck").join("logs"));
    }

    let home = dirs::home_dir()
        .ok_or_else(|| DeckError::internal("home directory could not be determined"))?;

    Ok(home.join(".local").join("state").join("gitdeck").join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_dir_ends_with_gitdeck_logs() {
        let dir = default_log_dir().unwrap();
        assert!(dir.ends_with("gitdeck/logs"));
    }

    #[test]
    fn test_init_test_logging() {
        // Should not panic, even when called twice
        init_test_logging();
        init_test_logging();
    }
}
