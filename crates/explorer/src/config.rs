//! Configuration management for the folder explorer.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/vfolder-explorer/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use protocol::DROP_UPLOAD_LIMIT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::files::UploadSettings;

/// Longest accepted linger for completed uploads.
const MAX_LINGER_MS: u64 = 60_000;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),

    #[error("drop_size_limit must be greater than 0")]
    InvalidDropSizeLimit,

    #[error("linger_ms must be at most 60000, got {0}")]
    InvalidLinger(u64),

    #[error("allowed_hosts must not be empty")]
    NoAllowedHosts,

    #[error("default_host {0} is not in allowed_hosts")]
    DefaultHostNotAllowed(String),

    #[error("event capacity must be greater than 0")]
    InvalidEventCapacity,
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the explorer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub explorer: ExplorerConfig,

    /// Upload queue settings.
    pub upload: UploadConfig,

    /// Local storage backend settings.
    pub storage: StorageConfig,

    /// Event bus settings.
    pub events: EventsConfig,
}

/// General explorer configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Where downloads are saved unless a destination is given.
    pub download_dir: PathBuf,
}

/// Upload queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    /// Dropped files above this size in bytes are skipped (default: 1MiB).
    pub drop_size_limit: u64,

    /// Milliseconds a completed upload stays in the queue.
    pub linger_ms: u64,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the folder registry and folder contents.
    pub root: PathBuf,

    /// Host preselected when creating a folder.
    pub default_host: String,

    /// Hosts folders may be created on.
    pub allowed_hosts: Vec<String>,
}

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventsConfig {
    /// Buffered events per subscriber before the slowest one lags.
    pub capacity: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            download_dir: default_download_dir(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            drop_size_limit: DROP_UPLOAD_LIMIT,
            linger_ms: 1000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            default_host: "local".to_string(),
            allowed_hosts: vec!["local".to_string()],
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl UploadConfig {
    pub fn settings(&self) -> UploadSettings {
        UploadSettings {
            drop_size_limit: self.drop_size_limit,
            linger: Duration::from_millis(self.linger_ms),
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vfolder-explorer")
        .join("config.toml")
}

/// Returns the default storage root.
fn default_storage_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vfolder-explorer")
}

/// Returns the default download directory.
fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - VFOLDER_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - VFOLDER_STORAGE_ROOT: Override the storage root directory
    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("VFOLDER_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.explorer.log_level = level;
            }
        }

        if let Ok(root) = std::env::var("VFOLDER_STORAGE_ROOT") {
            if !root.is_empty() {
                tracing::info!("Overriding storage root from environment: {}", root);
                self.storage.root = PathBuf::from(root);
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.explorer.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(
                self.explorer.log_level.clone(),
            ));
        }

        if self.upload.drop_size_limit == 0 {
            return Err(ConfigError::InvalidDropSizeLimit);
        }

        if self.upload.linger_ms > MAX_LINGER_MS {
            return Err(ConfigError::InvalidLinger(self.upload.linger_ms));
        }

        if self.storage.allowed_hosts.is_empty() {
            return Err(ConfigError::NoAllowedHosts);
        }

        if !self
            .storage
            .allowed_hosts
            .contains(&self.storage.default_host)
        {
            return Err(ConfigError::DefaultHostNotAllowed(
                self.storage.default_host.clone(),
            ));
        }

        if self.events.capacity == 0 {
            return Err(ConfigError::InvalidEventCapacity);
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.explorer.log_level, "info");
        assert_eq!(config.upload.drop_size_limit, 1_048_576);
        assert_eq!(config.upload.linger_ms, 1000);
        assert_eq!(config.storage.default_host, "local");
        assert_eq!(config.storage.allowed_hosts, vec!["local".to_string()]);
        assert_eq!(config.events.capacity, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_storage_root() {
        let config = StorageConfig::default();
        assert!(config.root.to_string_lossy().contains("vfolder-explorer"));
    }

    #[test]
    fn test_upload_settings() {
        let config = UploadConfig {
            drop_size_limit: 10,
            linger_ms: 250,
        };
        let settings = config.settings();
        assert_eq!(settings.drop_size_limit, 10);
        assert_eq!(settings.linger, Duration::from_millis(250));
    }

    #[test]
    fn test_from_toml_empty() {
        // Empty TOML should use all defaults
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let toml = r#"
[explorer]
log_level = "debug"

[upload]
linger_ms = 200
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.explorer.log_level, "debug");
        assert_eq!(config.upload.linger_ms, 200);
        assert_eq!(config.upload.drop_size_limit, DROP_UPLOAD_LIMIT);
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_from_toml_full() {
        let toml = r#"
[explorer]
log_level = "warn"
download_dir = "/tmp/downloads"

[upload]
drop_size_limit = 2048
linger_ms = 0

[storage]
root = "/srv/vfolders"
default_host = "nfs1"
allowed_hosts = ["nfs1", "nfs2"]

[events]
capacity = 16
"#;
        let config = Config::from_toml(toml).unwrap();

        assert_eq!(config.explorer.download_dir, PathBuf::from("/tmp/downloads"));
        assert_eq!(config.upload.drop_size_limit, 2048);
        assert_eq!(config.storage.root, PathBuf::from("/srv/vfolders"));
        assert_eq!(config.storage.allowed_hosts.len(), 2);
        assert_eq!(config.events.capacity, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[explorer\nlog_level = ");
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML configuration"));
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let result = Config::from_toml("[upload]\ndrop_size_limit = \"big\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_roundtrip() {
        let mut config = Config::default();
        config.storage.allowed_hosts.push("nfs1".to_string());
        config.upload.linger_ms = 500;

        let toml = config.to_toml().unwrap();
        assert_eq!(Config::from_toml(&toml).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let config = Config::load("/nonexistent/vfolder/config.toml").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.explorer.log_level = "trace".to_string();
        config.save(&path).unwrap();

        assert!(path.exists());
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "not = [valid").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("vfolder-explorer/config.toml"));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.explorer.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );

        config.explorer.log_level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_upload_limits() {
        let mut config = Config::default();
        config.upload.drop_size_limit = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidDropSizeLimit));

        let mut config = Config::default();
        config.upload.linger_ms = 60_001;
        assert_eq!(config.validate(), Err(ConfigError::InvalidLinger(60_001)));

        config.upload.linger_ms = 60_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_hosts() {
        let mut config = Config::default();
        config.storage.allowed_hosts.clear();
        assert_eq!(config.validate(), Err(ConfigError::NoAllowedHosts));

        let mut config = Config::default();
        config.storage.default_host = "nfs9".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::DefaultHostNotAllowed("nfs9".to_string()))
        );
    }

    #[test]
    fn test_validate_event_capacity() {
        let mut config = Config::default();
        config.events.capacity = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidEventCapacity));
    }

    #[test]
    #[serial]
    fn test_env_override_log_level() {
        std::env::remove_var("VFOLDER_STORAGE_ROOT");
        std::env::set_var("VFOLDER_LOG_LEVEL", "debug");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.explorer.log_level, "debug");

        std::env::remove_var("VFOLDER_LOG_LEVEL");
    }

    #[test]
    #[serial]
    fn test_env_override_storage_root() {
        std::env::remove_var("VFOLDER_LOG_LEVEL");
        std::env::set_var("VFOLDER_STORAGE_ROOT", "/srv/override");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.storage.root, PathBuf::from("/srv/override"));

        std::env::remove_var("VFOLDER_STORAGE_ROOT");
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        std::env::set_var("VFOLDER_LOG_LEVEL", "");
        std::env::set_var("VFOLDER_STORAGE_ROOT", "");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config, Config::default());

        std::env::remove_var("VFOLDER_LOG_LEVEL");
        std::env::remove_var("VFOLDER_STORAGE_ROOT");
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        std::env::remove_var("VFOLDER_LOG_LEVEL");
        std::env::remove_var("VFOLDER_STORAGE_ROOT");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config, Config::default());
    }
}
