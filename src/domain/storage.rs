//! Storage backend port
//!
//! A backend is chosen once, at construction, from [`StorageDriver`]. After
//! that the rest of the application only sees this trait.

use crate::domain::call::CallRepository;
use crate::domain::collection::CollectionStore;
use crate::domain::shared::error::{DomainError, Result};
use crate::domain::subscriber::SubscriberRepository;
use crate::domain::user::UserRepository;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageDriver {
    /// One JSON document per collection
    File,
    /// One PostgreSQL table per collection
    Postgres,
}

impl StorageDriver {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageDriver::File => "file",
            StorageDriver::Postgres => "postgres",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(StorageDriver::File),
            "postgres" => Ok(StorageDriver::Postgres),
            other => Err(DomainError::Configuration(format!(
                "unknown storage driver '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for StorageDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a storage backend offers
#[async_trait]
pub trait StorageBackend:
    CollectionStore + SubscriberRepository + UserRepository + CallRepository
{
    fn driver(&self) -> StorageDriver;

    /// Release pooled resources. Safe to call more than once.
    async fn close(&self);
}
