//! Named record collections and the whole-collection storage contract
//!
//! Every backend can read and replace a collection as an ordered sequence of
//! JSON records. Typed access goes through [`Record`], which ties an entity
//! type to the collection that holds it.

use crate::domain::call::Call;
use crate::domain::shared::error::{DomainError, Result};
use crate::domain::shared::time;
use crate::domain::subscriber::Subscriber;
use crate::domain::user::User;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// One of the three persisted record sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Subscribers,
    Users,
    Calls,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Subscribers, Collection::Users, Collection::Calls];

    /// Name used as the document property and table name
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Subscribers => "subscribers",
            Collection::Users => "users",
            Collection::Calls => "calls",
        }
    }

    /// Resolve a collection key. Unknown keys are configuration errors.
    pub fn parse(key: &str) -> Result<Self> {
        match key {
            "subscribers" => Ok(Collection::Subscribers),
            "users" => Ok(Collection::Users),
            "calls" => Ok(Collection::Calls),
            other => Err(DomainError::UnknownCollection(other.to_string())),
        }
    }
}

impl FromStr for Collection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        Collection::parse(s)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An entity stored in exactly one collection, keyed by a string id
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;

    fn created_at(&self) -> DateTime<Utc>;

    fn updated_at(&self) -> DateTime<Utc>;
}

/// Backend primitive: read or replace a whole collection
#[async_trait]
pub trait CollectionStore: Send + Sync {
    /// Read every record of a collection in stored order.
    ///
    /// Missing storage is materialized and reads as an empty sequence.
    async fn read(&self, collection: Collection) -> Result<Vec<Value>>;

    /// Replace the whole collection. Readers never observe a partial write.
    async fn write(&self, collection: Collection, records: Vec<Value>) -> Result<()>;

    /// Best-effort durability aid. Never fails.
    async fn backup(&self, collection: Collection);
}

/// Decode raw records into entities
pub fn decode_records<T: Record>(values: Vec<Value>) -> Result<Vec<T>> {
    values
        .into_iter()
        .map(|value| {
            serde_json::from_value(value).map_err(|e| {
                DomainError::ValidationError(format!(
                    "invalid record in {}: {}",
                    T::COLLECTION,
                    e
                ))
            })
        })
        .collect()
}

/// Encode entities as raw records
pub fn encode_records<T: Record>(records: &[T]) -> Result<Vec<Value>> {
    records
        .iter()
        .map(|record| {
            serde_json::to_value(record).map_err(|e| {
                DomainError::Internal(format!(
                    "failed to encode {} record {}: {}",
                    T::COLLECTION,
                    record.id(),
                    e
                ))
            })
        })
        .collect()
}

/// Check a snapshot before it replaces a collection
///
/// Ids must be unique, `updated_at` must not precede `created_at`, and
/// timestamps must be at microsecond precision so every backend stores
/// them unchanged.
pub fn validate_snapshot<T: Record>(records: &[T]) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());

    for record in records {
        if !seen.insert(record.id()) {
            return Err(DomainError::AlreadyExists(format!(
                "{} record {} appears more than once",
                T::COLLECTION,
                record.id()
            )));
        }

        let (created_at, updated_at) = (record.created_at(), record.updated_at());
        if updated_at < created_at {
            return Err(DomainError::ValidationError(format!(
                "{} record {} was updated before it was created",
                T::COLLECTION,
                record.id()
            )));
        }
        if !time::is_storage_precision(created_at) || !time::is_storage_precision(updated_at) {
            return Err(DomainError::ValidationError(format!(
                "{} record {} has timestamps finer than a microsecond",
                T::COLLECTION,
                record.id()
            )));
        }
    }

    Ok(())
}

/// [`validate_snapshot`] over raw records of `collection`
pub fn check_snapshot(collection: Collection, records: &[Value]) -> Result<()> {
    match collection {
        Collection::Subscribers => validate_snapshot(&decode_records::<Subscriber>(records.to_vec())?),
        Collection::Users => validate_snapshot(&decode_records::<User>(records.to_vec())?),
        Collection::Calls => validate_snapshot(&decode_records::<Call>(records.to_vec())?),
    }
}

/// Read a collection and decode it into entities
pub async fn load<T, S>(store: &S) -> Result<Vec<T>>
where
    T: Record,
    S: CollectionStore + ?Sized,
{
    decode_records(store.read(T::COLLECTION).await?)
}

/// Encode entities and replace their collection
pub async fn save<T, S>(store: &S, records: &[T]) -> Result<()>
where
    T: Record,
    S: CollectionStore + ?Sized,
{
    store.write(T::COLLECTION, encode_records(records)?).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_collections() {
        for collection in Collection::ALL {
            assert_eq!(Collection::parse(collection.name()).unwrap(), collection);
        }
        assert_eq!("calls".parse::<Collection>().unwrap(), Collection::Calls);
    }

    #[test]
    fn test_unknown_collection_is_configuration_error() {
        let err = Collection::parse("meetings").unwrap_err();
        assert_eq!(err, DomainError::UnknownCollection("meetings".to_string()));
        assert!(err.is_configuration());
    }

    fn subscriber(id: &str, created_at: DateTime<Utc>, updated_at: DateTime<Utc>) -> Subscriber {
        Subscriber {
            id: id.to_string(),
            name: id.to_uppercase(),
            created_at,
            updated_at,
        }
    }

    #[test]
    fn test_snapshot_with_duplicate_ids_is_rejected() {
        let now = time::now();
        let records = [subscriber("s1", now, now), subscriber("s1", now, now)];

        assert!(matches!(
            validate_snapshot(&records),
            Err(DomainError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_snapshot_timestamps_are_checked() {
        let now = time::now();

        let backwards = [subscriber("s1", now, now - chrono::Duration::seconds(1))];
        assert!(matches!(
            validate_snapshot(&backwards),
            Err(DomainError::ValidationError(_))
        ));

        let too_fine = [subscriber("s1", now, now + chrono::Duration::nanoseconds(1))];
        assert!(matches!(
            validate_snapshot(&too_fine),
            Err(DomainError::ValidationError(_))
        ));

        assert!(validate_snapshot(&[subscriber("s1", now, now), subscriber("s2", now, now)]).is_ok());
    }

    #[test]
    fn test_check_snapshot_decodes_by_collection() {
        let now = time::now();
        let records = encode_records(&[subscriber("u1", now, now), subscriber("u1", now, now)]).unwrap();

        // subscribers and users share a shape
        assert!(matches!(
            check_snapshot(Collection::Users, &records),
            Err(DomainError::AlreadyExists(_))
        ));
        assert!(matches!(
            check_snapshot(Collection::Calls, &records),
            Err(DomainError::ValidationError(_))
        ));
    }
}
