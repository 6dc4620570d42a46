//! Configuration management
//!
//! Built-in defaults, then an optional `huddle.toml`, then `HUDDLE__*`
//! environment variables (`HUDDLE__STORAGE__DRIVER=postgres`,
//! `HUDDLE__STORAGE__FILE__DATA_DIR=/var/lib/huddle`, ...). `DATABASE_URL`
//! overrides the PostgreSQL URL when set.

use crate::domain::call::TransitionPolicy;
use crate::domain::collection::Collection;
use crate::domain::shared::error::{DomainError, Result};
use crate::domain::storage::StorageDriver;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub cleanup: CleanupConfig,
    pub lifecycle: TransitionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub driver: StorageDriver,
    pub file: FileStoreConfig,
    pub postgres: DatabaseConfig,
}

/// What a file store does with a document it cannot parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryPolicy {
    /// Report it and read the collection as empty
    #[default]
    Lenient,
    /// Fail the read with [`DomainError::Corrupted`]
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStoreConfig {
    pub data_dir: PathBuf,
    pub subscribers_file: PathBuf,
    pub users_file: PathBuf,
    pub calls_file: PathBuf,
    /// Defaults to `data_dir`
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
    pub backups_enabled: bool,
    /// Minimum spacing between two backups of the same file
    pub backup_interval_secs: u64,
    #[serde(default)]
    pub recovery: RecoveryPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    /// Server-side `statement_timeout`; 0 disables it
    pub statement_timeout_ms: u64,
    pub run_migrations: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Non-pending calls untouched for longer than this are removed
    pub retention_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                driver: StorageDriver::File,
                file: FileStoreConfig::default(),
                postgres: DatabaseConfig::default(),
            },
            cleanup: CleanupConfig::default(),
            lifecycle: TransitionPolicy::Permissive,
        }
    }
}

impl Default for FileStoreConfig {
    fn default() -> Self {
        Self::in_dir("data")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/huddle".to_string(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_secs: 5,
            idle_timeout_secs: 600,  // 10 minutes
            max_lifetime_secs: 1800, // 30 minutes
            statement_timeout_ms: 5_000,
            run_migrations: true,
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300,
            retention_secs: 3600,
        }
    }
}

impl AppConfig {
    /// Load from `huddle.toml` (if present) and the environment
    pub fn load() -> Result<Self> {
        Self::load_from("huddle")
    }

    /// Load using `file` as the config file stem; the file is optional
    pub fn load_from(file: &str) -> Result<Self> {
        let defaults = ::config::Config::try_from(&Self::default()).map_err(config_error)?;

        let mut loaded: AppConfig = ::config::Config::builder()
            .add_source(defaults)
            .add_source(::config::File::with_name(file).required(false))
            .add_source(
                ::config::Environment::with_prefix("HUDDLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_error)?
            .try_deserialize()
            .map_err(config_error)?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            loaded.storage.postgres.url = url;
        }

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<()> {
        match self.storage.driver {
            StorageDriver::File => self.storage.file.validate()?,
            StorageDriver::Postgres => self.storage.postgres.validate()?,
        }
        self.cleanup.validate()
    }
}

impl FileStoreConfig {
    /// Default file names under `data_dir`
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            subscribers_file: PathBuf::from("subscribers.json"),
            users_file: PathBuf::from("users.json"),
            calls_file: PathBuf::from("calls.json"),
            backup_dir: None,
            backups_enabled: true,
            backup_interval_secs: 60,
            recovery: RecoveryPolicy::Lenient,
        }
    }

    /// Document path for a collection. Relative names resolve against `data_dir`.
    pub fn path_for(&self, collection: Collection) -> Result<PathBuf> {
        let file = match collection {
            Collection::Subscribers => &self.subscribers_file,
            Collection::Users => &self.users_file,
            Collection::Calls => &self.calls_file,
        };

        if file.as_os_str().is_empty() {
            return Err(DomainError::Configuration(format!(
                "no file path configured for {}",
                collection
            )));
        }

        Ok(resolve(&self.data_dir, file))
    }

    pub fn backup_dir(&self) -> PathBuf {
        match &self.backup_dir {
            Some(dir) => resolve(&self.data_dir, dir),
            None => self.data_dir.clone(),
        }
    }

    pub fn backup_interval(&self) -> Duration {
        Duration::from_secs(self.backup_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(DomainError::Configuration(
                "data directory is not configured".to_string(),
            ));
        }
        for collection in Collection::ALL {
            self.path_for(collection)?;
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(DomainError::Configuration(
                "database url is not configured".to_string(),
            ));
        }
        if self.min_connections > self.max_connections {
            return Err(DomainError::Configuration(format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )));
        }
        Ok(())
    }
}

impl CleanupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// Retention as a signed window for cutoff arithmetic
    pub fn retention_window(&self) -> Result<chrono::Duration> {
        retention_window(self.retention())
    }

    pub fn validate(&self) -> Result<()> {
        self.retention_window().map(|_| ())
    }
}

/// Convert a retention period, rejecting ones too large to subtract from a timestamp
pub fn retention_window(retention: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(retention).map_err(|_| {
        DomainError::Configuration(format!(
            "cleanup retention of {}s is out of range",
            retention.as_secs()
        ))
    })
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn config_error(e: ::config::ConfigError) -> DomainError {
    DomainError::Configuration(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.storage.driver, StorageDriver::File);
        assert_eq!(config.storage.file.backup_interval(), Duration::from_secs(60));
        assert_eq!(config.storage.postgres.max_connections, 10);
        assert_eq!(config.lifecycle, TransitionPolicy::Permissive);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_paths_resolve_against_data_dir() {
        let mut file = FileStoreConfig::in_dir("/srv/huddle");
        file.calls_file = PathBuf::from("/elsewhere/calls.json");

        assert_eq!(
            file.path_for(Collection::Subscribers).unwrap(),
            PathBuf::from("/srv/huddle/subscribers.json")
        );
        assert_eq!(
            file.path_for(Collection::Calls).unwrap(),
            PathBuf::from("/elsewhere/calls.json")
        );
        assert_eq!(file.backup_dir(), PathBuf::from("/srv/huddle"));

        file.backup_dir = Some(PathBuf::from("backups"));
        assert_eq!(file.backup_dir(), PathBuf::from("/srv/huddle/backups"));
    }

    #[test]
    fn test_missing_file_path_is_configuration_error() {
        let mut file = FileStoreConfig::in_dir("/srv/huddle");
        file.users_file = PathBuf::new();

        let err = file.validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_database_pool_bounds() {
        let db = DatabaseConfig {
            min_connections: 20,
            ..Default::default()
        };
        assert!(db.validate().is_err());
    }

    #[test]
    fn test_out_of_range_retention_is_configuration_error() {
        let mut config = AppConfig::default();
        config.cleanup.retention_secs = u64::MAX;

        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
        assert!(config.cleanup.retention_window().is_err());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load_from("definitely-not-a-huddle-config").unwrap();
        assert_eq!(config.storage.file.subscribers_file, PathBuf::from("subscribers.json"));
        assert_eq!(config.cleanup.retention_secs, 3600);
    }
}
