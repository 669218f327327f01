//! Configuration loading and management
//!
//! SDK options are passed explicitly when an [`Analytics`](crate::Analytics)
//! instance is built. Applications that prefer a file can load them from
//! `~/.config/beacon/config.toml`:
//!
//! ```toml
//! [sdk]
//! app_name = "My App"
//! batch_size = 20
//! flush_interval_ms = 2000
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/beacon/` (~/.config/beacon/)
//! - Data: `$XDG_DATA_HOME/beacon/` (~/.local/share/beacon/)
//! - State/Logs: `$XDG_STATE_HOME/beacon/` (~/.local/state/beacon/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// SDK options (optional; callers may build [`SdkOptions`] in code instead)
    #[serde(default)]
    pub sdk: Option<SdkOptions>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// File storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Options recognised by the SDK facade.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SdkOptions {
    /// Application name, reported in every event context
    pub app_name: String,

    /// Application version
    #[serde(default = "default_version")]
    pub version: String,

    /// Queue length that triggers an immediate flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Milliseconds between timer-driven flushes
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Emit per-event debug logging
    #[serde(default)]
    pub debug: bool,

    /// Load and save identity through the storage backend
    #[serde(default = "default_true")]
    pub enable_persistence: bool,

    /// Whether consent is granted at startup
    #[serde(default = "default_true")]
    pub initial_consent: bool,

    /// Storage key override; derived from `app_name` when unset
    #[serde(default)]
    pub storage_key: Option<String>,
}

impl SdkOptions {
    /// Options for `app_name` with every other field at its default.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            version: default_version(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            debug: false,
            enable_persistence: true,
            initial_consent: true,
            storage_key: None,
        }
    }

    /// Key under which identity is persisted.
    ///
    /// `analytics_sdk_<app name>` with the name lower-cased and every
    /// whitespace character replaced by `_`, unless overridden.
    pub fn storage_key(&self) -> String {
        if let Some(key) = &self.storage_key {
            return key.clone();
        }
        let name: String = self
            .app_name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_whitespace() { '_' } else { c })
            .collect();
        format!("analytics_sdk_{}", name)
    }

    /// Flush interval as a [`Duration`].
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Validate options, returning an error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(Error::Config("sdk.app_name is required".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config(
                "sdk.batch_size must be at least 1".to_string(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(Error::Config(
                "sdk.flush_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_batch_size() -> usize {
    10
}

fn default_flush_interval_ms() -> u64 {
    5000
}

fn default_true() -> bool {
    true
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

/// File storage configuration
#[derive(Debug, Deserialize, Default)]
pub struct StorageConfig {
    /// Directory for persisted identity files (defaults to the data dir)
    pub dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        if let Some(sdk) = &config.sdk {
            sdk.validate()?;
        }

        Ok(config)
    }

    /// Directory used by [`FileStorage`](crate::storage::FileStorage),
    /// honouring the `[storage] dir` override.
    pub fn storage_dir(&self) -> PathBuf {
        self.storage
            .dir
            .clone()
            .unwrap_or_else(|| Self::data_dir().join("storage"))
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/beacon/config.toml` (~/.config/beacon/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("beacon").join("config.toml")
    }

    /// Returns the data directory path
    ///
    /// `$XDG_DATA_HOME/beacon/` (~/.local/share/beacon/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("beacon")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/beacon/` (~/.local/state/beacon/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("beacon")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("beacon.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = SdkOptions::new("test-app");
        assert_eq!(options.version, "1.0.0");
        assert_eq!(options.batch_size, 10);
        assert_eq!(options.flush_interval_ms, 5000);
        assert!(!options.debug);
        assert!(options.enable_persistence);
        assert!(options.initial_consent);
        assert!(options.storage_key.is_none());
    }

    #[test]
    fn test_storage_key_derivation() {
        let options = SdkOptions::new("My Enterprise\tApp");
        assert_eq!(options.storage_key(), "analytics_sdk_my_enterprise_app");

        let options = SdkOptions {
            storage_key: Some("custom_key".to_string()),
            ..SdkOptions::new("My App")
        };
        assert_eq!(options.storage_key(), "custom_key");
    }

    #[test]
    fn test_options_validation() {
        assert!(SdkOptions::new("app").validate().is_ok());
        assert!(SdkOptions::new("  ").validate().is_err());

        let options = SdkOptions {
            batch_size: 0,
            ..SdkOptions::new("app")
        };
        assert!(options.validate().is_err());

        let options = SdkOptions {
            flush_interval_ms: 0,
            ..SdkOptions::new("app")
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.sdk.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(config.storage.dir.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[sdk]
app_name = "integration-test-app"
batch_size = 2
flush_interval_ms = 50
debug = true
initial_consent = false

[logging]
level = "debug"

[storage]
dir = "/tmp/beacon-test"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        let sdk = config.sdk.unwrap();
        assert_eq!(sdk.app_name, "integration-test-app");
        assert_eq!(sdk.batch_size, 2);
        assert_eq!(sdk.flush_interval(), Duration::from_millis(50));
        assert!(sdk.debug);
        assert!(!sdk.initial_consent);
        assert!(sdk.enable_persistence);
        assert_eq!(sdk.version, "1.0.0");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.storage.dir.as_deref(),
            Some(Path::new("/tmp/beacon-test"))
        );
    }

    #[test]
    fn test_load_from_rejects_invalid_sdk_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sdk]\napp_name = \"app\"\nbatch_size = 0\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_from_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sdk\napp_name = ").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
