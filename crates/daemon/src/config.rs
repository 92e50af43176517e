//! Configuration management for the FileBridge daemon.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/filebridge/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::files::{DEFAULT_MAX_CONCURRENCY, DEFAULT_MAX_FILE_SIZE};

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("max_file_size must be greater than 0, got {0}")]
    InvalidMaxFileSize(u64),

    #[error("max_results must be between 1 and 10000, got {0}")]
    InvalidMaxResults(usize),

    #[error("max_matches_per_file must be greater than 0, got {0}")]
    InvalidMaxMatches(usize),

    #[error("max_tree_depth must be between 1 and 64, got {0}")]
    InvalidMaxTreeDepth(u32),

    #[error("default_tree_depth must be between 1 and max_tree_depth ({max}), got {got}")]
    InvalidDefaultTreeDepth { got: u32, max: u32 },

    #[error("max_concurrency must be between 1 and 1024, got {0}")]
    InvalidMaxConcurrency(usize),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the FileBridge daemon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Filesystem service configuration.
    pub files: FileConfig,

    /// Local socket configuration.
    pub ipc: IpcConfig,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Filesystem service configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    /// Directory every request is confined to.
    pub root: PathBuf,

    /// Largest file accepted by write and upload, in bytes.
    pub max_file_size: u64,

    /// Search results returned per request.
    pub max_results: usize,

    /// Content matches reported per file.
    pub max_matches_per_file: usize,

    /// Upper bound on requested tree depth.
    pub max_tree_depth: u32,

    /// Tree depth used when a request leaves it unset.
    pub default_tree_depth: u32,

    /// Fan-out for concurrent copy, tree and search traversals.
    pub max_concurrency: usize,
}

/// Local socket configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct IpcConfig {
    /// Socket path; unset or empty uses the runtime directory.
    pub socket_path: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_results: 100,
            max_matches_per_file: 10,
            max_tree_depth: 16,
            default_tree_depth: protocol::DEFAULT_TREE_DEPTH,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl IpcConfig {
    /// The configured socket path, ignoring an empty value.
    pub fn socket_path(&self) -> Option<&Path> {
        self.socket_path
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("filebridge")
        .join("config.toml")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - FILEBRIDGE_ROOT: Override the root directory
    /// - FILEBRIDGE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    /// - FILEBRIDGE_SOCKET: Override the socket path
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("FILEBRIDGE_ROOT") {
            if !root.is_empty() {
                tracing::info!("Overriding root from environment: {}", root);
                self.files.root = PathBuf::from(root);
            }
        }

        if let Ok(level) = std::env::var("FILEBRIDGE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }

        if let Ok(socket) = std::env::var("FILEBRIDGE_SOCKET") {
            if !socket.is_empty() {
                tracing::info!("Overriding socket_path from environment: {}", socket);
                self.ipc.socket_path = Some(PathBuf::from(socket));
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let files = &self.files;

        if files.max_file_size == 0 {
            return Err(ConfigError::InvalidMaxFileSize(files.max_file_size));
        }

        if files.max_results < 1 || files.max_results > 10_000 {
            return Err(ConfigError::InvalidMaxResults(files.max_results));
        }

        if files.max_matches_per_file == 0 {
            return Err(ConfigError::InvalidMaxMatches(files.max_matches_per_file));
        }

        if files.max_tree_depth < 1 || files.max_tree_depth > 64 {
            return Err(ConfigError::InvalidMaxTreeDepth(files.max_tree_depth));
        }

        if files.default_tree_depth < 1 || files.default_tree_depth > files.max_tree_depth {
            return Err(ConfigError::InvalidDefaultTreeDepth {
                got: files.default_tree_depth,
                max: files.max_tree_depth,
            });
        }

        if files.max_concurrency < 1 || files.max_concurrency > 1024 {
            return Err(ConfigError::InvalidMaxConcurrency(files.max_concurrency));
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
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

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
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

    fn clear_env() {
        std::env::remove_var("FILEBRIDGE_ROOT");
        std::env::remove_var("FILEBRIDGE_LOG_LEVEL");
        std::env::remove_var("FILEBRIDGE_SOCKET");
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.files.root, PathBuf::from("."));
        assert_eq!(config.files.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.files.max_results, 100);
        assert_eq!(config.files.max_matches_per_file, 10);
        assert_eq!(config.files.default_tree_depth, 3);
        assert_eq!(config.files.max_concurrency, 32);
        assert!(config.ipc.socket_path().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_empty() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = Config::from_toml(
            r#"
            [files]
            root = "/srv/share"
            max_results = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.files.root, PathBuf::from("/srv/share"));
        assert_eq!(config.files.max_results, 25);
        // Unspecified fields keep their defaults
        assert_eq!(config.files.max_matches_per_file, 10);
        assert_eq!(config.daemon.log_level, "info");
    }

    #[test]
    fn test_from_toml_full() {
        let config = Config::from_toml(
            r#"
            [daemon]
            log_level = "debug"

            [files]
            root = "/data"
            max_file_size = 2048
            max_results = 50
            max_matches_per_file = 5
            max_tree_depth = 8
            default_tree_depth = 2
            max_concurrency = 4

            [ipc]
            socket_path = "/run/filebridge.sock"
            "#,
        )
        .unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.files.max_file_size, 2048);
        assert_eq!(config.files.max_tree_depth, 8);
        assert_eq!(config.files.default_tree_depth, 2);
        assert_eq!(config.files.max_concurrency, 4);
        assert_eq!(
            config.ipc.socket_path(),
            Some(Path::new("/run/filebridge.sock"))
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_socket_path_is_unset() {
        let config = Config::from_toml("[ipc]\nsocket_path = \"\"\n").unwrap();
        assert!(config.ipc.socket_path().is_none());
    }

    #[test]
    fn test_from_toml_invalid_syntax() {
        let result = Config::from_toml("[files\nroot = 1");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Invalid TOML configuration"), "{}", err);
    }

    #[test]
    fn test_from_toml_wrong_type() {
        let result = Config::from_toml("[files]\nmax_results = \"many\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let config = Config::from_toml("[files]\nfuture_option = true\n").unwrap();
        assert_eq!(config.files, FileConfig::default());
    }

    #[test]
    fn test_roundtrip_custom() {
        let mut config = Config::default();
        config.files.root = PathBuf::from("/tmp/share");
        config.files.max_results = 42;
        config.ipc.socket_path = Some(PathBuf::from("/tmp/fb.sock"));

        let parsed = Config::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/dir/config.toml");

        let mut config = Config::default();
        config.daemon.log_level = "warn".to_string();
        config.save(&path).unwrap();

        assert!(path.exists());
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "not = [valid").unwrap();

        let err = format!("{:#}", Config::load(&path).unwrap_err());
        assert!(err.contains("Failed to parse config file"), "{}", err);
    }

    #[test]
    fn test_default_config_path() {
        let path = default_config_path();
        assert!(path.ends_with("filebridge/config.toml"));
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("FILEBRIDGE_ROOT", "/srv/files");
        std::env::set_var("FILEBRIDGE_LOG_LEVEL", "trace");
        std::env::set_var("FILEBRIDGE_SOCKET", "/tmp/custom.sock");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.files.root, PathBuf::from("/srv/files"));
        assert_eq!(config.daemon.log_level, "trace");
        assert_eq!(config.ipc.socket_path(), Some(Path::new("/tmp/custom.sock")));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_empty_does_not_override() {
        clear_env();
        std::env::set_var("FILEBRIDGE_ROOT", "");
        std::env::set_var("FILEBRIDGE_LOG_LEVEL", "");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config, Config::default());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_override_unset_does_not_override() {
        clear_env();

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_validate_file_limits() {
        let mut config = Config::default();
        config.files.max_file_size = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxFileSize(0)));

        let mut config = Config::default();
        config.files.max_results = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxResults(0)));

        let mut config = Config::default();
        config.files.max_matches_per_file = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxMatches(0)));

        let mut config = Config::default();
        config.files.max_concurrency = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxConcurrency(0)));
    }

    #[test]
    fn test_validate_tree_depths() {
        let mut config = Config::default();
        config.files.max_tree_depth = 65;
        assert_eq!(config.validate(), Err(ConfigError::InvalidMaxTreeDepth(65)));

        let mut config = Config::default();
        config.files.max_tree_depth = 2;
        config.files.default_tree_depth = 3;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidDefaultTreeDepth { got: 3, max: 2 })
        );

        let mut config = Config::default();
        config.files.max_tree_depth = 1;
        config.files.default_tree_depth = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.daemon.log_level = "WARN".to_string();
        assert!(config.validate().is_ok());

        config.daemon.log_level = "verbose".to_string();
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }
}
