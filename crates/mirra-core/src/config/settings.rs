//! Engine configuration loaded from a TOML file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Top-level engine configuration.
///
/// All fields have sensible defaults so Mirra works without a config file.
/// Call [`Config::load`] to read from a TOML path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub staging: StagingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub hashing: HashingConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Loads configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the file does not exist.
    /// - [`CoreError::PermissionDenied`] if the file is not readable.
    /// - [`CoreError::ConfigParse`] if the TOML is malformed.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => CoreError::PermissionDenied(path.to_path_buf()),
            _ => CoreError::Io(e),
        })?;
        toml::from_str(&content).map_err(|e| CoreError::ConfigParse(e.to_string()))
    }

    /// Loads `path` if it exists, otherwise returns the defaults.
    ///
    /// Parse and permission errors are still reported.
    pub fn load_or_default(path: &Path) -> CoreResult<Self> {
        match Self::load(path) {
            Err(CoreError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// Serializes the effective configuration back to TOML.
    pub fn to_toml(&self) -> CoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| CoreError::ConfigParse(e.to_string()))
    }

    /// Returns `$HOME/.config/mirra/config.toml`.
    pub fn default_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(".config")
            .join("mirra")
            .join("config.toml")
    }
}

/// What the scanner accepts while reconciling a directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Lower-case file extensions (without the dot) that are mirrored.
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,
    /// Directories whose name starts with this prefix are never mirrored.
    #[serde(default = "default_hidden_prefix")]
    pub hidden_prefix: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            media_extensions: default_media_extensions(),
            hidden_prefix: default_hidden_prefix(),
        }
    }
}

/// Soft-delete staging area.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Name of the hidden directory created at the top of the root.
    #[serde(default = "default_staging_dir")]
    pub dir_name: String,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            dir_name: default_staging_dir(),
        }
    }
}

/// Undo history settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_capacity")]
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: default_history_capacity(),
        }
    }
}

/// Content-address hashing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashingConfig {
    /// Only the first `prefix_bytes` of a file are hashed.
    #[serde(default = "default_prefix_bytes")]
    pub prefix_bytes: u64,
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            prefix_bytes: default_prefix_bytes(),
        }
    }
}

/// Filesystem watcher used by the front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Log output of the front end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_file")]
    pub file: String,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            level: default_log_level(),
        }
    }
}

fn default_media_extensions() -> Vec<String> {
    crate::fs::media::DEFAULT_EXTENSIONS
        .iter()
        .map(|e| (*e).to_string())
        .collect()
}

fn default_hidden_prefix() -> String {
    ".".to_string()
}

fn default_staging_dir() -> String {
    ".trash".to_string()
}

fn default_history_capacity() -> usize {
    50
}

fn default_prefix_bytes() -> u64 {
    2 * 1024 * 1024
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    200
}

fn default_log_file() -> String {
    "/tmp/mirra.log".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_config_scan() {
        let config = Config::default();

        assert_eq!(config.scan.hidden_prefix, ".");
        assert!(config.scan.media_extensions.iter().any(|e| e == "jpg"));
        assert!(config.scan.media_extensions.iter().any(|e| e == "mkv"));
        assert!(config.scan.media_extensions.iter().any(|e| e == "flac"));
    }

    #[test]
    fn default_config_staging_and_history() {
        let config = Config::default();

        assert_eq!(config.staging.dir_name, ".trash");
        assert_eq!(config.history.capacity, 50);
        assert_eq!(config.hashing.prefix_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn default_config_watch_and_log() {
        let config = Config::default();

        assert!(config.watch.enabled);
        assert_eq!(config.watch.debounce_ms, 200);
        assert_eq!(config.log.file, "/tmp/mirra.log");
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn load_full_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[scan]
media_extensions = ["jpg", "png"]
hidden_prefix = "_"

[staging]
dir_name = ".bin"

[history]
capacity = 5

[hashing]
prefix_bytes = 4096

[watch]
enabled = false
debounce_ms = 50

[log]
file = "/var/log/mirra.log"
level = "debug"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.scan.media_extensions, vec!["jpg", "png"]);
        assert_eq!(config.scan.hidden_prefix, "_");
        assert_eq!(config.staging.dir_name, ".bin");
        assert_eq!(config.history.capacity, 5);
        assert_eq!(config.hashing.prefix_bytes, 4096);
        assert!(!config.watch.enabled);
        assert_eq!(config.watch.debounce_ms, 50);
        assert_eq!(config.log.file, "/var/log/mirra.log");
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn load_partial_toml_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            r#"
[history]
capacity = 10
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();

        assert_eq!(config.history.capacity, 10);
        assert_eq!(config.staging.dir_name, ".trash");
        assert_eq!(config.scan.hidden_prefix, ".");
    }

    #[test]
    fn load_nonexistent_returns_not_found() {
        let tmp = TempDir::new().unwrap();
        let result = Config::load(&tmp.path().join("nonexistent.toml"));
        assert!(matches!(result.unwrap_err(), CoreError::NotFound(_)));
    }

    #[test]
    fn load_or_default_tolerates_missing_file() {
        let tmp = TempDir::new().unwrap();
        let config = Config::load_or_default(&tmp.path().join("missing.toml")).unwrap();
        assert_eq!(config.history.capacity, 50);
    }

    #[test]
    fn load_invalid_toml_returns_config_parse() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "this is not valid [[[toml").unwrap();

        let result = Config::load_or_default(&path);
        assert!(matches!(result.unwrap_err(), CoreError::ConfigParse(_)));
    }

    #[test]
    fn to_toml_round_trips_through_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        let mut config = Config::default();
        config.history.capacity = 7;

        fs::write(&path, config.to_toml().unwrap()).unwrap();
        let loaded = Config::load(&path).unwrap();

        assert_eq!(loaded.history.capacity, 7);
        assert_eq!(loaded.scan.media_extensions, config.scan.media_extensions);
    }

    #[test]
    fn default_path_ends_with_config_toml() {
        let path = Config::default_path();
        assert!(path.ends_with(".config/mirra/config.toml"));
    }
}
