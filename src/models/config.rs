//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP fetch behavior settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Poll cycle and file forwarding settings
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Job scheduling settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Durable state locations
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Subjects allowed to issue track/untrack requests.
    /// An empty list allows everyone (development mode).
    #[serde(default)]
    pub authorized_subjects: Vec<String>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetch.user_agent is empty"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(AppError::validation("fetch.timeout_secs must be > 0"));
        }
        if self.monitor.max_file_bytes == 0 {
            return Err(AppError::validation("monitor.max_file_bytes must be > 0"));
        }
        if self.scheduler.min_interval_minutes == 0 {
            return Err(AppError::validation(
                "scheduler.min_interval_minutes must be > 0",
            ));
        }
        if self.scheduler.quiet_start_hour >= 24 || self.scheduler.quiet_end_hour > 24 {
            return Err(AppError::validation("scheduler quiet hours out of range"));
        }
        if self.scheduler.quiet_start_hour >= self.scheduler.quiet_end_hour {
            return Err(AppError::validation(
                "scheduler.quiet_start_hour must precede quiet_end_hour",
            ));
        }
        Ok(())
    }
}

/// HTTP client behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// Poll cycle and file forwarding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Maximum size of a forwarded file in bytes
    #[serde(default = "defaults::max_file_bytes")]
    pub max_file_bytes: u64,

    /// Directory for in-flight file downloads
    #[serde(default = "defaults::download_dir")]
    pub download_dir: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: defaults::max_file_bytes(),
            download_dir: defaults::download_dir(),
        }
    }
}

/// Job scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Lower bound on polling intervals; shorter requests are clamped up
    #[serde(default = "defaults::min_interval_minutes")]
    pub min_interval_minutes: u64,

    /// First hour of the allowed daily window for quiet-hours targets
    #[serde(default = "defaults::quiet_start_hour")]
    pub quiet_start_hour: u32,

    /// First hour past the allowed daily window
    #[serde(default = "defaults::quiet_end_hour")]
    pub quiet_end_hour: u32,

    /// Missed fires older than this are dropped instead of replayed
    #[serde(default = "defaults::misfire_grace_secs")]
    pub misfire_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_interval_minutes: defaults::min_interval_minutes(),
            quiet_start_hour: defaults::quiet_start_hour(),
            quiet_end_hour: defaults::quiet_end_hour(),
            misfire_grace_secs: defaults::misfire_grace_secs(),
        }
    }
}

/// Durable state locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding targets.json and jobs.json
    #[serde(default = "defaults::data_dir")]
    pub data_dir: String,

    /// Directory the development notifier delivers into
    #[serde(default = "defaults::outbox_dir")]
    pub outbox_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: defaults::data_dir(),
            outbox_dir: defaults::outbox_dir(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (error, warn, info, debug, trace)
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    // Fetch defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; sitewatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Monitor defaults
    pub fn max_file_bytes() -> u64 {
        45 * 1024 * 1024
    }
    pub fn download_dir() -> String {
        "data/downloads".into()
    }

    // Scheduler defaults
    pub fn min_interval_minutes() -> u64 {
        5
    }
    pub fn quiet_start_hour() -> u32 {
        6
    }
    pub fn quiet_end_hour() -> u32 {
        22
    }
    pub fn misfire_grace_secs() -> u64 {
        3600
    }

    // Storage defaults
    pub fn data_dir() -> String {
        "data".into()
    }
    pub fn outbox_dir() -> String {
        "data/outbox".into()
    }

    // Logging defaults
    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = Config::default();
        config.scheduler.min_interval_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_quiet_window() {
        let mut config = Config::default();
        config.scheduler.quiet_start_hour = 23;
        config.scheduler.quiet_end_hour = 6;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml = r#"
            [fetch]
            timeout_secs = 10

            [scheduler]
            min_interval_minutes = 1
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.fetch.timeout_secs, 10);
        assert_eq!(config.scheduler.min_interval_minutes, 1);
        assert_eq!(config.monitor.max_file_bytes, 45 * 1024 * 1024);
        assert_eq!(config.scheduler.quiet_end_hour, 22);
    }
}
