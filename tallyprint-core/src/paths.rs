//! Filesystem layout.
//!
//! ```text
//! ~/.tallyprint/
//!   config.yaml
//!   daemon.sock
//!   logs/
//!     app-<YYYY-MM-DD>.log
//! ```
//!
//! Every helper takes an explicit `home` so tests can point it at a `TempDir`.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::error::ConfigError;

pub const APP_DIR: &str = ".tallyprint";
pub const CONFIG_FILE: &str = "config.yaml";
pub const DAEMON_SOCKET: &str = "daemon.sock";
pub const LOG_FILE_PREFIX: &str = "app-";
pub const LOG_FILE_SUFFIX: &str = ".log";

pub fn app_root(home: &Path) -> PathBuf {
    home.join(APP_DIR)
}

pub fn config_path(home: &Path) -> PathBuf {
    app_root(home).join(CONFIG_FILE)
}

pub fn socket_path(home: &Path) -> PathBuf {
    app_root(home).join(DAEMON_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    app_root(home).join("logs")
}

/// Default directory for generated print artifacts.
pub fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("tallyprint")
}

/// `app-2025-01-15.log`
pub fn log_file_name(date: NaiveDate) -> String {
    format!("{LOG_FILE_PREFIX}{}{LOG_FILE_SUFFIX}", date.format("%Y-%m-%d"))
}

/// Inverse of [`log_file_name`]; `None` for anything that is not a daily log.
pub fn parse_log_file_date(file_name: &str) -> Option<NaiveDate> {
    let date = file_name
        .strip_prefix(LOG_FILE_PREFIX)?
        .strip_suffix(LOG_FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Current user's home directory.
pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}
