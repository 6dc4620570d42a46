//! JSON document backend
//!
//! Each collection lives in one document shaped `{ "<collection>": [ ... ] }`.
//! Writes replace the whole document through a temporary sibling and a rename,
//! after copying the previous version to a timestamped `.bak` file at most
//! once per backup interval.

use crate::config::{FileStoreConfig, RecoveryPolicy};
use crate::domain::collection::{Collection, CollectionStore};
use crate::domain::shared::error::{DomainError, Result};
use crate::infrastructure::persistence::locks::CollectionLocks;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Details of a document that could not be parsed
#[derive(Debug, Clone)]
pub struct CorruptionReport {
    pub collection: Collection,
    pub path: PathBuf,
    pub reason: String,
}

/// Called whenever a document cannot be parsed, before the recovery policy applies
pub type CorruptionHandler = Arc<dyn Fn(&CorruptionReport) + Send + Sync>;

pub struct FileBackend {
    paths: HashMap<Collection, PathBuf>,
    backup_dir: PathBuf,
    backups_enabled: bool,
    backup_interval: chrono::Duration,
    recovery: RecoveryPolicy,
    on_corruption: Option<CorruptionHandler>,
    /// Last successful backup per source file
    last_backup: Mutex<HashMap<PathBuf, DateTime<Utc>>>,
    locks: CollectionLocks,
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("paths", &self.paths)
            .field("backup_dir", &self.backup_dir)
            .finish_non_exhaustive()
    }
}

impl FileBackend {
    pub fn new(config: &FileStoreConfig) -> Result<Self> {
        config.validate()?;

        let mut paths = HashMap::new();
        for collection in Collection::ALL {
            paths.insert(collection, config.path_for(collection)?);
        }

        let backup_interval = chrono::Duration::from_std(config.backup_interval())
            .map_err(|e| DomainError::Configuration(format!("backup interval: {}", e)))?;

        Ok(Self {
            paths,
            backup_dir: config.backup_dir(),
            backups_enabled: config.backups_enabled,
            backup_interval,
            recovery: config.recovery,
            on_corruption: None,
            last_backup: Mutex::new(HashMap::new()),
            locks: CollectionLocks::default(),
        })
    }

    pub fn with_corruption_handler(mut self, handler: CorruptionHandler) -> Self {
        self.on_corruption = Some(handler);
        self
    }

    pub fn path(&self, collection: Collection) -> Result<&Path> {
        self.paths
            .get(&collection)
            .map(PathBuf::as_path)
            .ok_or_else(|| DomainError::UnknownCollection(collection.name().to_string()))
    }

    /// `<backup_dir>/<file name>.<timestamp with ':' and '.' replaced by '-'>.bak`
    pub fn backup_path(&self, path: &Path, at: DateTime<Utc>) -> PathBuf {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stamp = at
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace([':', '.'], "-");

        self.backup_dir.join(format!("{}.{}.bak", file_name, stamp))
    }

    /// Create the document with an empty array if it does not exist yet
    async fn ensure_document(&self, collection: Collection, path: &Path) -> Result<()> {
        if fs::try_exists(path)
            .await
            .map_err(|e| io_error("stat", path, e))?
        {
            return Ok(());
        }

        debug!("Initializing empty {} document at {}", collection, path.display());
        write_atomic(path, &render_document(collection, Vec::new())?).await
    }

    /// Copy the current document aside unless one was taken within the interval.
    /// Must be called with the collection lock held.
    async fn backup_locked(&self, collection: Collection, path: &Path) {
        if !self.backups_enabled {
            return;
        }

        let now = Utc::now();
        let mut last_backup = self.last_backup.lock().await;

        if let Some(previous) = last_backup.get(path) {
            if now.signed_duration_since(*previous) < self.backup_interval {
                debug!("Skipping {} backup, last one at {}", collection, previous);
                return;
            }
        }

        match fs::try_exists(path).await {
            Ok(true) => {}
            // nothing to back up yet
            Ok(false) => return,
            Err(e) => {
                warn!("Backup of {} skipped: {}", path.display(), e);
                return;
            }
        }

        let target = self.backup_path(path, now);
        let copied = async {
            fs::create_dir_all(&self.backup_dir).await?;
            fs::copy(path, &target).await
        }
        .await;

        match copied {
            Ok(_) => {
                debug!("Backed up {} to {}", path.display(), target.display());
                last_backup.insert(path.to_path_buf(), now);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Backup of {} failed: {}", path.display(), e),
        }
    }

    fn recover(&self, collection: Collection, path: &Path, reason: String) -> Result<Vec<Value>> {
        let report = CorruptionReport {
            collection,
            path: path.to_path_buf(),
            reason,
        };

        warn!(
            "Unreadable {} document {}: {}",
            collection,
            path.display(),
            report.reason
        );

        if let Some(handler) = &self.on_corruption {
            handler(&report);
        }

        match self.recovery {
            RecoveryPolicy::Lenient => Ok(Vec::new()),
            RecoveryPolicy::Strict => Err(DomainError::Corrupted {
                path: path.display().to_string(),
                reason: report.reason,
            }),
        }
    }
}

#[async_trait]
impl CollectionStore for FileBackend {
    async fn read(&self, collection: Collection) -> Result<Vec<Value>> {
        let path = self.path(collection)?;
        let _guard = self.locks.lock(collection).await;

        self.ensure_document(collection, path).await?;

        let content = fs::read(path)
            .await
            .map_err(|e| io_error("read", path, e))?;

        match parse_document(collection, &content) {
            Ok(records) => {
                debug!("Read {} {} records", records.len(), collection);
                Ok(records)
            }
            Err(reason) => self.recover(collection, path, reason),
        }
    }

    async fn write(&self, collection: Collection, records: Vec<Value>) -> Result<()> {
        let path = self.path(collection)?;
        let _guard = self.locks.lock(collection).await;

        self.backup_locked(collection, path).await;

        let count = records.len();
        write_atomic(path, &render_document(collection, records)?).await?;

        debug!("Wrote {} {} records", count, collection);
        Ok(())
    }

    async fn backup(&self, collection: Collection) {
        let Ok(path) = self.path(collection) else {
            return;
        };
        let _guard = self.locks.lock(collection).await;
        self.backup_locked(collection, path).await;
    }
}

fn parse_document(collection: Collection, content: &[u8]) -> std::result::Result<Vec<Value>, String> {
    let document: Value = serde_json::from_slice(content).map_err(|e| e.to_string())?;

    match document {
        Value::Object(mut fields) => match fields.remove(collection.name()) {
            Some(Value::Array(records)) => Ok(records),
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(_) => Err(format!("'{}' is not an array", collection.name())),
        },
        _ => Err("document is not a JSON object".to_string()),
    }
}

fn render_document(collection: Collection, records: Vec<Value>) -> Result<Vec<u8>> {
    let mut document = Map::new();
    document.insert(collection.name().to_string(), Value::Array(records));

    serde_json::to_vec_pretty(&Value::Object(document))
        .map_err(|e| DomainError::Internal(format!("failed to render {}: {}", collection, e)))
}

/// Write to a uniquely named sibling, flush, then rename over `path`
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| io_error("create directory for", path, e))?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| DomainError::Configuration(format!("not a file path: {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let written: io::Result<()> = async {
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp).await;
        return Err(io_error("write", path, e));
    }

    Ok(())
}

fn io_error(action: &str, path: &Path, e: io::Error) -> DomainError {
    error!("Failed to {} {}: {}", action, path.display(), e);
    DomainError::Storage(format!("failed to {} {}: {}", action, path.display(), e))
}
