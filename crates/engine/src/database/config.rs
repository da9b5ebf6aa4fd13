//! Store configuration via `tictoc.toml`
//!
//! A default `tictoc.toml` can be written next to the application's data.
//! To change settings, edit the file and reopen the store.

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tictoc_core::{Error, IsolationLevel, MergeOperator, Result};
use tictoc_storage::merge_operator_by_name;

use super::transactions::RetryConfig;

/// Conventional config file name.
pub const CONFIG_FILE_NAME: &str = "tictoc.toml";

/// Store configuration loaded from `tictoc.toml`.
///
/// # Example
///
/// ```toml
/// # "serializable" (default), "snapshot" or "repeatable_read"
/// isolation = "serializable"
/// lock_backoff_ns = 1000
/// merge = "replace"
///
/// [retry]
/// max_retries = 3
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Default isolation level for new transactions.
    #[serde(default = "default_isolation_str")]
    pub isolation: String,
    /// Sleep between write-set lock attempts, in nanoseconds.
    #[serde(default = "default_lock_backoff_ns")]
    pub lock_backoff_ns: u64,
    /// Application merge operator: `"replace"`, `"append"` or `"counter"`.
    #[serde(default = "default_merge_str")]
    pub merge: String,
    /// Retry policy of closure transactions.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_isolation_str() -> String {
    IsolationLevel::default().as_str().to_string()
}

fn default_lock_backoff_ns() -> u64 {
    1_000
}

fn default_merge_str() -> String {
    "replace".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            isolation: default_isolation_str(),
            lock_backoff_ns: default_lock_backoff_ns(),
            merge: default_merge_str(),
            retry: RetryConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Parse the isolation string.
    ///
    /// # Errors
    ///
    /// `Error::InvalidConfig` for an unknown level.
    pub fn isolation_level(&self) -> Result<IsolationLevel> {
        self.isolation.parse()
    }

    /// Resolve the merge operator by name.
    ///
    /// # Errors
    ///
    /// `Error::InvalidConfig` for an unknown operator.
    pub fn merge_operator(&self) -> Result<Arc<dyn MergeOperator>> {
        merge_operator_by_name(&self.merge).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "Invalid merge operator '{}' in tictoc.toml. Expected \"replace\", \"append\" or \"counter\".",
                self.merge
            ))
        })
    }

    /// Lock backoff as a duration.
    pub fn lock_backoff(&self) -> Duration {
        Duration::from_nanos(self.lock_backoff_ns)
    }

    /// Check every field that needs parsing.
    pub fn validate(&self) -> Result<()> {
        self.isolation_level()?;
        self.merge_operator()?;
        Ok(())
    }

    /// Commented `tictoc.toml` template holding the default values.
    pub fn default_toml() -> &'static str {
        r#"# TicToc store configuration
#
# Default isolation level for new transactions:
#   "serializable"    = full serializability (default)
#   "snapshot"        = commit at the read timestamp, write skew possible
#   "repeatable_read" = never extends stored read timestamps
isolation = "serializable"

# Sleep between attempts to lock a transaction's write set, in nanoseconds.
lock_backoff_ns = 1000

# Merge operator for partial updates: "replace" (default), "append" or "counter"
merge = "replace"

# Retry policy for closure transactions aborted by a conflict.
[retry]
max_retries = 3
base_delay_ms = 10
max_delay_ms = 100
"#
    }

    /// Load a store configuration from a `tictoc.toml` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        let config: StoreConfig = toml::from_str(&content).map_err(|e| {
            Error::InvalidConfig(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Create `path` from the default template unless it exists.
    ///
    /// An existing file is left untouched.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::Io(io::Error::new(
                    e.kind(),
                    format!("Failed to write default config file '{}': {}", path.display(), e),
                ))
            })?;
        }
        Ok(())
    }

    /// Write this configuration as TOML to `path`, replacing any file there.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::InvalidConfig(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::Io(io::Error::new(
                e.kind(),
                format!("Failed to write config file '{}': {}", path.display(), e),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_is_serializable() {
        let config = StoreConfig::default();
        assert_eq!(config.isolation, "serializable");
        assert_eq!(config.isolation_level().unwrap(), IsolationLevel::Serializable);
        assert_eq!(config.lock_backoff(), Duration::from_micros(1));
        assert_eq!(config.merge_operator().unwrap().name(), "replace");
    }

    #[test]
    fn parse_each_isolation() {
        for (s, level) in [
            ("serializable", IsolationLevel::Serializable),
            ("snapshot", IsolationLevel::SnapshotIsolation),
            ("repeatable_read", IsolationLevel::RepeatableRead),
        ] {
            let config: StoreConfig = toml::from_str(&format!("isolation = \"{}\"", s)).unwrap();
            assert_eq!(config.isolation_level().unwrap(), level);
        }
    }

    #[test]
    fn parse_invalid_isolation_returns_error() {
        let config: StoreConfig = toml::from_str("isolation = \"chaos\"").unwrap();
        assert!(matches!(
            config.isolation_level(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn parse_invalid_merge_returns_error() {
        let config: StoreConfig = toml::from_str("merge = \"multiply\"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_toml_parses_correctly() {
        let config: StoreConfig = toml::from_str(StoreConfig::default_toml()).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn partial_retry_table_uses_defaults() {
        let config: StoreConfig = toml::from_str("[retry]\nmax_retries = 9\n").unwrap();
        assert_eq!(config.retry.max_retries, 9);
        assert_eq!(config.retry.base_delay_ms, 10);
    }

    #[test]
    fn write_default_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        StoreConfig::write_default_if_missing(&path).unwrap();
        assert!(path.exists());

        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config.isolation, "serializable");
    }

    #[test]
    fn write_default_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        std::fs::write(&path, "isolation = \"snapshot\"\n").unwrap();
        StoreConfig::write_default_if_missing(&path).unwrap();

        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config.isolation, "snapshot");
    }

    #[test]
    fn from_file_with_missing_field_uses_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "").unwrap();

        let config = StoreConfig::from_file(&path).unwrap();
        assert_eq!(config, StoreConfig::default());
    }

    #[test]
    fn from_file_rejects_bad_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "merge = \"nope\"\n").unwrap();
        assert!(StoreConfig::from_file(&path).is_err());

        std::fs::write(&path, "lock_backoff_ns = \"fast\"\n").unwrap();
        assert!(matches!(
            StoreConfig::from_file(&path),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn from_file_missing_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = StoreConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let config = StoreConfig {
            isolation: "repeatable_read".to_string(),
            lock_backoff_ns: 250,
            merge: "counter".to_string(),
            retry: RetryConfig::no_retry(),
        };

        config.write_to_file(&path).unwrap();
        let loaded = StoreConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
