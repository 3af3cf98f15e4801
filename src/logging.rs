//! Logging configuration.
//!
//! Logs go to stderr by default so stdout stays clean for results. With
//! `--log-file` they go to a file in the platform state directory instead.

use std::fs::{self, File};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init(log_file: bool) {
    if log_file {
        init_file_logging();
    } else {
        init_stderr_logging();
    }
}

/// Logs to `~/.local/state/sql-warden/warden.log` on Linux, or the
/// platform-appropriate equivalent.
pub fn init_file_logging() {
    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging();
            return;
        }
    }

    // Append so an audit of past runs survives restarts.
    let log_file = match File::options().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file: {e}");
            init_stderr_logging();
            return;
        }
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false)
        .try_init();
}

pub fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Returns the path for the log file.
pub fn get_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("sql-warden").join("warden.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("sql-warden").join("warden.log");
    }

    std::env::temp_dir().join("warden.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_path_is_absolute() {
        assert!(get_log_path().is_absolute());
    }

    #[test]
    fn test_log_path_file_name() {
        assert!(get_log_path().ends_with("warden.log"));
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init(false);
        init(false);
    }
}
