//! YAML configuration at `~/.tallyprint/config.yaml`.
//!
//! Every field is optional; a missing file yields [`Config::default`].
//! `TALLYPRINT_ENV` overrides `environment`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::log_store::{LogStoreOptions, DEFAULT_CAPACITY};
use crate::notify::NotifyDelays;
use crate::paths;

pub const ENV_VAR: &str = "TALLYPRINT_ENV";
pub const DEVELOPMENT: &str = "development";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Free-form environment label recorded in every log entry.
    pub environment: Option<String>,
    pub log_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub log_capacity: usize,
    /// Daily log files older than this many days are pruned.
    pub retention_days: u32,
    pub locator: LocatorConfig,
    pub notify: NotifyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: None,
            log_dir: None,
            temp_dir: None,
            log_capacity: DEFAULT_CAPACITY,
            retention_days: 14,
            locator: LocatorConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

/// Where and what to look for when resolving the print helper binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub tool_name: String,
    pub extension: String,
    /// Probed before every built-in location.
    pub extra_dirs: Vec<PathBuf>,
    /// Root for development lookups; defaults to the working directory.
    pub project_root: Option<PathBuf>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            tool_name: "SumatraPDF".to_string(),
            extension: "exe".to_string(),
            extra_dirs: Vec::new(),
            project_root: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub delay_ms: u64,
    pub error_delay_ms: u64,
    pub read_throttle_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            delay_ms: 500,
            error_delay_ms: 100,
            read_throttle_ms: 1000,
        }
    }
}

impl Config {
    /// Load `<home>/.tallyprint/config.yaml`, then apply `TALLYPRINT_ENV`.
    pub fn load_at(home: &Path) -> Result<Self, ConfigError> {
        let config = Self::load_file(&paths::config_path(home))?;
        Ok(config.with_env_override(std::env::var(ENV_VAR).ok()))
    }

    /// `load_at` convenience wrapper using the current user's home.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&paths::home()?)
    }

    /// Parse a config file; a missing file is the default config.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_env_override(mut self, env: Option<String>) -> Self {
        if let Some(env) = env.filter(|v| !v.trim().is_empty()) {
            self.environment = Some(env);
        }
        self
    }

    pub fn is_development(&self) -> bool {
        self.environment.as_deref() == Some(DEVELOPMENT)
    }

    /// Explicit `log_dir`, else `./logs` in development, else `~/.tallyprint/logs`.
    pub fn log_dir_at(&self, home: &Path) -> PathBuf {
        if let Some(dir) = &self.log_dir {
            return dir.clone();
        }
        if self.is_development() {
            if let Ok(cwd) = std::env::current_dir() {
                return cwd.join("logs");
            }
        }
        paths::logs_dir(home)
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(paths::default_temp_dir)
    }

    pub fn log_store_options(&self) -> LogStoreOptions {
        LogStoreOptions {
            capacity: self.log_capacity.max(1),
            read_throttle: Duration::from_millis(self.notify.read_throttle_ms),
            environment: self.environment.clone(),
            mirror_to_console: self.is_development(),
        }
    }

    pub fn notify_delays(&self) -> NotifyDelays {
        NotifyDelays {
            normal: Duration::from_millis(self.notify.delay_ms),
            urgent: Duration::from_millis(self.notify.error_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(home: &TempDir, yaml: &str) {
        let path = paths::config_path(home.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, yaml).unwrap();
    }

    #[test]
    fn missing_file_yields_defaults() {
        let home = TempDir::new().unwrap();
        let config = Config::load_file(&paths::config_path(home.path())).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.locator.tool_name, "SumatraPDF");
        assert_eq!(config.notify.error_delay_ms, 100);
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let home = TempDir::new().unwrap();
        write_config(
            &home,
            "environment: production\nlocator:\n  extra_dirs: [/opt/tools]\nnotify:\n  delay_ms: 250\n",
        );
        let config = Config::load_file(&paths::config_path(home.path())).unwrap();
        assert_eq!(config.environment.as_deref(), Some("production"));
        assert_eq!(config.locator.extra_dirs, vec![PathBuf::from("/opt/tools")]);
        assert_eq!(config.locator.extension, "exe");
        assert_eq!(config.notify.delay_ms, 250);
        assert_eq!(config.notify.read_throttle_ms, 1000);
        assert_eq!(config.log_capacity, 100);
    }

    #[test]
    fn malformed_file_reports_path() {
        let home = TempDir::new().unwrap();
        write_config(&home, "log_capacity: [not, a, number\n");
        let err = Config::load_file(&paths::config_path(home.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn env_override_replaces_environment() {
        let config = Config::default().with_env_override(Some(DEVELOPMENT.to_string()));
        assert!(config.is_development());
        assert!(config.log_store_options().mirror_to_console);

        let unchanged = Config::default().with_env_override(Some("  ".to_string()));
        assert_eq!(unchanged.environment, None);
    }

    #[test]
    fn explicit_log_dir_wins() {
        let config = Config {
            log_dir: Some(PathBuf::from("/var/log/tallyprint")),
            ..Config::default()
        };
        assert_eq!(
            config.log_dir_at(Path::new("/home/ana")),
            PathBuf::from("/var/log/tallyprint")
        );
        assert_eq!(
            Config::default().log_dir_at(Path::new("/home/ana")),
            PathBuf::from("/home/ana/.tallyprint/logs")
        );
    }
}
