//! Configuration for the schedule store and the sync queue.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Local SQLite settings.
    pub database: DatabaseConfig,
    /// Rotation defaults.
    pub schedule: ScheduleConfig,
    /// Remote authority settings.
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database file, created when missing.
    pub path: PathBuf,
    pub max_connections: u32,
    /// How long a connection waits for the write lock before failing.
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("planning.db"),
            max_connections: 5,
            busy_timeout_ms: 5_000,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Entry date given to people created without one.
    pub default_entry_date: NaiveDate,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            default_entry_date: NaiveDate::from_ymd_opt(2025, 11, 1).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Base URL of the remote authority (None = queue only, never drains).
    pub endpoint: Option<String>,
    /// Upper bound for one submission.
    pub request_timeout_ms: u64,
    /// Re-drain period while online, in seconds (0 = only on reconnect).
    pub retry_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            request_timeout_ms: 10_000,
            retry_interval_secs: 300,
        }
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }

    pub fn retry_interval(&self) -> Option<Duration> {
        (self.retry_interval_secs > 0).then(|| Duration::from_secs(self.retry_interval_secs))
    }
}

impl AppConfig {
    /// Load from a TOML file. Missing sections fall back to defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load from `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_round_trip_keeps_values() {
        let mut config = AppConfig::default();
        config.sync.endpoint = Some("https://planning.example/api".to_string());
        config.sync.retry_interval_secs = 0;

        let text = toml::to_string_pretty(&config).unwrap();
        let loaded: AppConfig = toml::from_str(&text).unwrap();

        assert_eq!(loaded, config);
        assert!(loaded.sync.retry_interval().is_none());
    }

    #[test]
    fn partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str("[sync]\nrequest_timeout_ms = 250\n").unwrap();

        assert_eq!(config.sync.request_timeout(), Duration::from_millis(250));
        assert_eq!(config.database, DatabaseConfig::default());
        assert_eq!(
            config.schedule.default_entry_date,
            NaiveDate::from_ymd_opt(2025, 11, 1).unwrap()
        );
    }
}
