//! Repositories over a whole-collection store
//!
//! Every mutation is a read-modify-write of the full collection, done while
//! holding that collection's lock so concurrent upserts cannot drop each
//! other's changes.

use crate::domain::call::{Call, CallRepository, CallStatus, NewCall, TransitionPolicy};
use crate::domain::collection::{self, Collection, CollectionStore, Record};
use crate::domain::shared::error::{DomainError, Result};
use crate::domain::shared::time;
use crate::domain::storage::{StorageBackend, StorageDriver};
use crate::domain::subscriber::{Subscriber, SubscriberRepository, UpsertSubscriber};
use crate::domain::user::{UpsertUser, User, UserRepository};
use crate::infrastructure::persistence::locks::CollectionLocks;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

pub struct CollectionRepository<S> {
    store: S,
    policy: TransitionPolicy,
    locks: CollectionLocks,
}

impl<S: CollectionStore> CollectionRepository<S> {
    pub fn new(store: S, policy: TransitionPolicy) -> Self {
        Self {
            store,
            policy,
            locks: CollectionLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Status update with an explicit timestamp
    ///
    /// `now` is cut to microseconds and never lands before the call's
    /// `created_at`.
    pub async fn update_call_status_at(
        &self,
        id: &str,
        status: CallStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Call>> {
        let now = time::to_storage_precision(now);
        let _guard = self.locks.lock(Collection::Calls).await;
        let mut calls: Vec<Call> = collection::load(&self.store).await?;

        let Some(call) = calls.iter_mut().find(|call| call.id == id) else {
            debug!("Call {} not found for status update", id);
            return Ok(None);
        };

        self.policy.check(id, call.status, status)?;
        call.set_status(status, now);
        let updated = call.clone();

        collection::save(&self.store, &calls).await?;
        debug!("Call {} is now {}", id, status);
        Ok(Some(updated))
    }

    async fn find<T: Record>(&self, id: &str) -> Result<Option<T>> {
        let records: Vec<T> = collection::load(&self.store).await?;
        Ok(records.into_iter().find(|record| record.id() == id))
    }

    /// Insert-or-update by id under the collection lock
    async fn upsert<T, C, U>(&self, id: &str, create: C, update: U) -> Result<T>
    where
        T: Record,
        C: FnOnce(DateTime<Utc>) -> T,
        U: FnOnce(&mut T, DateTime<Utc>),
    {
        let _guard = self.locks.lock(T::COLLECTION).await;
        let mut records: Vec<T> = collection::load(&self.store).await?;
        let now = time::now();

        let stored = match records.iter_mut().find(|record| record.id() == id) {
            Some(existing) => {
                update(existing, now);
                existing.clone()
            }
            None => {
                let created = create(now);
                records.push(created.clone());
                created
            }
        };

        collection::save(&self.store, &records).await?;
        debug!("Upserted {} record {}", T::COLLECTION, id);
        Ok(stored)
    }
}

#[async_trait]
impl<S: CollectionStore> CollectionStore for CollectionRepository<S> {
    async fn read(&self, collection: Collection) -> Result<Vec<Value>> {
        self.store.read(collection).await
    }

    async fn write(&self, collection: Collection, records: Vec<Value>) -> Result<()> {
        collection::check_snapshot(collection, &records)?;

        let _guard = self.locks.lock(collection).await;
        self.store.write(collection, records).await
    }

    async fn backup(&self, collection: Collection) {
        self.store.backup(collection).await
    }
}

#[async_trait]
impl<S: CollectionStore> SubscriberRepository for CollectionRepository<S> {
    async fn upsert_subscriber(&self, data: UpsertSubscriber) -> Result<Subscriber> {
        let id = data.id.clone();
        let update = data.clone();
        self.upsert::<Subscriber, _, _>(
            &id,
            |now| Subscriber::new(data, now),
            |existing, now| existing.apply(update, now),
        )
        .await
    }

    async fn get_subscriber(&self, id: &str) -> Result<Option<Subscriber>> {
        self.find(id).await
    }

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        collection::load(&self.store).await
    }
}

#[async_trait]
impl<S: CollectionStore> UserRepository for CollectionRepository<S> {
    async fn upsert_user(&self, data: UpsertUser) -> Result<User> {
        let id = data.id.clone();
        let update = data.clone();
        self.upsert::<User, _, _>(
            &id,
            |now| User::new(data, now),
            |existing, now| existing.apply(update, now),
        )
        .await
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.find(id).await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        collection::load(&self.store).await
    }
}

#[async_trait]
impl<S: CollectionStore> CallRepository for CollectionRepository<S> {
    async fn create_call(&self, data: NewCall) -> Result<Call> {
        let _guard = self.locks.lock(Collection::Calls).await;
        let mut calls: Vec<Call> = collection::load(&self.store).await?;

        let call = Call::new(data, time::now());
        if calls.iter().any(|existing| existing.id == call.id) {
            return Err(DomainError::AlreadyExists(format!("call {}", call.id)));
        }

        calls.push(call.clone());
        collection::save(&self.store, &calls).await?;

        debug!("Created call {} from {} to {}", call.id, call.from.id, call.to.id);
        Ok(call)
    }

    async fn get_call(&self, id: &str) -> Result<Option<Call>> {
        self.find(id).await
    }

    async fn update_call_status(&self, id: &str, status: CallStatus) -> Result<Option<Call>> {
        self.update_call_status_at(id, status, time::now()).await
    }

    async fn list_pending_calls(&self, target_id: &str) -> Result<Vec<Call>> {
        let calls: Vec<Call> = collection::load(&self.store).await?;
        Ok(calls
            .into_iter()
            .filter(|call| call.is_pending_for(target_id))
            .collect())
    }

    async fn delete_call(&self, id: &str) -> Result<bool> {
        let _guard = self.locks.lock(Collection::Calls).await;
        let mut calls: Vec<Call> = collection::load(&self.store).await?;

        let before = calls.len();
        calls.retain(|call| call.id != id);
        if calls.len() == before {
            return Ok(false);
        }

        collection::save(&self.store, &calls).await?;
        debug!("Deleted call {}", id);
        Ok(true)
    }

    async fn cleanup_calls(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let _guard = self.locks.lock(Collection::Calls).await;
        let mut calls: Vec<Call> = collection::load(&self.store).await?;

        let before = calls.len();
        calls.retain(|call| !call.is_expired(cutoff));
        let removed = (before - calls.len()) as u64;

        if removed > 0 {
            collection::save(&self.store, &calls).await?;
            info!("Removed {} calls last updated before {}", removed, cutoff);
        }
        Ok(removed)
    }
}

#[async_trait]
impl<S: CollectionStore> StorageBackend for CollectionRepository<S> {
    fn driver(&self) -> StorageDriver {
        StorageDriver::File
    }

    async fn close(&self) {}
}
