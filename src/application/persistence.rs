//! Persistence facade
//!
//! The single entry point the rest of the application uses for subscribers,
//! users and calls. The backend is picked once from configuration; callers
//! never learn which one they got.

use crate::config::StorageConfig;
use crate::domain::call::{Call, CallRepository, CallStatus, NewCall, TransitionPolicy};
use crate::domain::collection::{decode_records, encode_records, Collection, CollectionStore};
use crate::domain::shared::error::Result;
use crate::domain::storage::{StorageBackend, StorageDriver};
use crate::domain::subscriber::{Subscriber, SubscriberRepository, UpsertSubscriber};
use crate::domain::user::{UpsertUser, User, UserRepository};
use crate::infrastructure::persistence::{CollectionRepository, CorruptionHandler, FileBackend};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct PersistenceFacade {
    backend: Arc<dyn StorageBackend>,
}

impl PersistenceFacade {
    /// Build the configured backend
    pub async fn open(config: &StorageConfig, lifecycle: TransitionPolicy) -> Result<Self> {
        Self::open_with(config, lifecycle, None).await
    }

    /// Build the configured backend; the file backend reports unreadable
    /// documents to `on_corruption`
    pub async fn open_with(
        config: &StorageConfig,
        lifecycle: TransitionPolicy,
        on_corruption: Option<CorruptionHandler>,
    ) -> Result<Self> {
        let backend: Arc<dyn StorageBackend> = match config.driver {
            StorageDriver::File => {
                info!("Using file storage in {}", config.file.data_dir.display());
                let mut files = FileBackend::new(&config.file)?;
                if let Some(handler) = on_corruption {
                    files = files.with_corruption_handler(handler);
                }
                Arc::new(CollectionRepository::new(files, lifecycle))
            }
            StorageDriver::Postgres => open_postgres(config, lifecycle).await?,
        };

        Ok(Self::from_backend(backend))
    }

    pub fn from_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn driver(&self) -> StorageDriver {
        self.backend.driver()
    }

    pub fn backend(&self) -> Arc<dyn StorageBackend> {
        self.backend.clone()
    }

    // Subscribers

    pub async fn read_subscribers(&self) -> Result<Vec<Subscriber>> {
        decode_records(self.backend.read(Collection::Subscribers).await?)
    }

    pub async fn write_subscribers(&self, subscribers: &[Subscriber]) -> Result<()> {
        self.backend
            .write(Collection::Subscribers, encode_records(subscribers)?)
            .await
    }

    pub async fn upsert_subscriber(&self, data: UpsertSubscriber) -> Result<Subscriber> {
        self.backend.upsert_subscriber(data).await
    }

    pub async fn get_subscriber(&self, id: &str) -> Result<Option<Subscriber>> {
        self.backend.get_subscriber(id).await
    }

    pub async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        self.backend.list_subscribers().await
    }

    // Users

    pub async fn read_users(&self) -> Result<Vec<User>> {
        decode_records(self.backend.read(Collection::Users).await?)
    }

    pub async fn write_users(&self, users: &[User]) -> Result<()> {
        self.backend
            .write(Collection::Users, encode_records(users)?)
            .await
    }

    pub async fn upsert_user(&self, data: UpsertUser) -> Result<User> {
        self.backend.upsert_user(data).await
    }

    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.backend.get_user(id).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.backend.list_users().await
    }

    // Calls

    pub async fn read_calls(&self) -> Result<Vec<Call>> {
        decode_records(self.backend.read(Collection::Calls).await?)
    }

    pub async fn write_calls(&self, calls: &[Call]) -> Result<()> {
        self.backend
            .write(Collection::Calls, encode_records(calls)?)
            .await
    }

    pub async fn create_call(&self, data: NewCall) -> Result<Call> {
        self.backend.create_call(data).await
    }

    pub async fn get_call(&self, id: &str) -> Result<Option<Call>> {
        self.backend.get_call(id).await
    }

    /// `Ok(None)` when no call has this id
    pub async fn update_call_status(&self, id: &str, status: CallStatus) -> Result<Option<Call>> {
        self.backend.update_call_status(id, status).await
    }

    pub async fn list_pending_calls(&self, target_id: &str) -> Result<Vec<Call>> {
        self.backend.list_pending_calls(target_id).await
    }

    pub async fn delete_call(&self, id: &str) -> Result<bool> {
        self.backend.delete_call(id).await
    }

    /// Remove non-pending calls last updated before `cutoff`
    pub async fn cleanup_calls(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.backend.cleanup_calls(cutoff).await
    }

    pub async fn close(&self) {
        self.backend.close().await
    }
}

#[cfg(feature = "postgres")]
async fn open_postgres(
    config: &StorageConfig,
    lifecycle: TransitionPolicy,
) -> Result<Arc<dyn StorageBackend>> {
    use crate::domain::shared::error::DomainError;
    use crate::infrastructure::persistence::{create_pool, run_migrations, PgBackend};

    config.postgres.validate()?;

    let pool = create_pool(&config.postgres)
        .await
        .map_err(|e| DomainError::Storage(format!("Database error: {}", e)))?;

    if config.postgres.run_migrations {
        run_migrations(&pool)
            .await
            .map_err(|e| DomainError::Storage(format!("Migration failed: {}", e)))?;
    }

    Ok(Arc::new(PgBackend::new(pool, lifecycle)))
}

#[cfg(not(feature = "postgres"))]
async fn open_postgres(
    _config: &StorageConfig,
    _lifecycle: TransitionPolicy,
) -> Result<Arc<dyn StorageBackend>> {
    Err(crate::domain::shared::error::DomainError::Configuration(
        "postgres driver requested but the `postgres` feature is disabled".to_string(),
    ))
}
