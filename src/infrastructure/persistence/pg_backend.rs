//! PostgreSQL implementation of the storage backend
//!
//! One table per collection, keyed by `id`. Call participants are stored in
//! denormalized `from_*` / `to_*` columns and rebuilt on read. Rows carry a
//! `seq` position drawn from a sequence; reads return rows in that order, so
//! a whole-collection write reads back in the order it was written and new
//! rows land at the end like they do in the file store.

use crate::domain::call::{Call, CallRepository, CallStatus, NewCall, Participant, TransitionPolicy};
use crate::domain::collection::{
    decode_records, encode_records, validate_snapshot, Collection, CollectionStore,
};
use crate::domain::shared::error::{DomainError, Result};
use crate::domain::shared::time;
use crate::domain::storage::{StorageBackend, StorageDriver};
use crate::domain::subscriber::{Subscriber, SubscriberRepository, UpsertSubscriber};
use crate::domain::user::{UpsertUser, User, UserRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use tracing::{debug, error, info};

const CALL_COLUMNS: &str =
    "id, from_id, from_name, to_id, to_name, status, created_at, updated_at";

/// Row shape shared by the `subscribers` and `users` tables
#[derive(Debug, FromRow)]
struct ProfileRow {
    id: String,
    name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for Subscriber {
    fn from(r: ProfileRow) -> Self {
        Subscriber {
            id: r.id,
            name: r.name,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl From<ProfileRow> for User {
    fn from(r: ProfileRow) -> Self {
        User {
            id: r.id,
            name: r.name,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

impl From<Subscriber> for ProfileRow {
    fn from(s: Subscriber) -> Self {
        ProfileRow {
            id: s.id,
            name: s.name,
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

impl From<User> for ProfileRow {
    fn from(u: User) -> Self {
        ProfileRow {
            id: u.id,
            name: u.name,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct CallRow {
    id: String,
    from_id: String,
    from_name: String,
    to_id: String,
    to_name: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CallRow> for Call {
    type Error = DomainError;

    fn try_from(r: CallRow) -> Result<Self> {
        let status = parse_status(&r.id, &r.status)?;
        Ok(Call {
            id: r.id,
            from: Participant::new(r.from_id, r.from_name),
            to: Participant::new(r.to_id, r.to_name),
            status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

fn parse_status(call_id: &str, status: &str) -> Result<CallStatus> {
    CallStatus::from_str(status).ok_or_else(|| {
        DomainError::ValidationError(format!("call {} has unknown status '{}'", call_id, status))
    })
}

fn into_calls(rows: Vec<CallRow>) -> Result<Vec<Call>> {
    rows.into_iter().map(Call::try_from).collect()
}

/// Log a database failure and map it into the domain error
fn db_error(context: &str, e: sqlx::Error) -> DomainError {
    error!("Failed to {}: {}", context, e);

    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return DomainError::AlreadyExists(format!("{}: {}", context, db.message()));
        }
    }
    DomainError::Storage(format!("Database error: {}", e))
}

pub struct PgBackend {
    pool: PgPool,
    policy: TransitionPolicy,
}

impl PgBackend {
    pub fn new(pool: PgPool, policy: TransitionPolicy) -> Self {
        Self { pool, policy }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Status update with an explicit timestamp
    ///
    /// Locks the row, checks the transition policy against the current
    /// status and writes the new one in a single transaction. `updated_at`
    /// never lands before `created_at`.
    pub async fn update_call_status_at(
        &self,
        id: &str,
        status: CallStatus,
        now: DateTime<Utc>,
    ) -> Result<Option<Call>> {
        debug!("Updating call {} to {}", id, status);
        let now = time::to_storage_precision(now);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;

        let current = sqlx::query_scalar::<_, String>("SELECT status FROM calls WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| db_error("lock call", e))?;

        let Some(current) = current else {
            debug!("Call {} not found for status update", id);
            return Ok(None);
        };

        self.policy.check(id, parse_status(id, &current)?, status)?;

        let sql = format!(
            "UPDATE calls SET status = $2, updated_at = GREATEST(created_at, $3) WHERE id = $1 RETURNING {}",
            CALL_COLUMNS
        );
        let row = sqlx::query_as::<_, CallRow>(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(now)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| db_error("update call status", e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("commit call status", e))?;

        Ok(Some(row.try_into()?))
    }

    async fn list_profiles(&self, table: &'static str) -> Result<Vec<ProfileRow>> {
        let sql = format!(
            "SELECT id, name, created_at, updated_at FROM {} ORDER BY seq",
            table
        );
        sqlx::query_as::<_, ProfileRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error(&format!("list {}", table), e))
    }

    async fn get_profile(&self, table: &'static str, id: &str) -> Result<Option<ProfileRow>> {
        let sql = format!(
            "SELECT id, name, created_at, updated_at FROM {} WHERE id = $1",
            table
        );
        sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error(&format!("get {} row", table), e))
    }

    /// Insert, or update `name`/`updated_at` and keep the stored `created_at`
    /// and position
    async fn upsert_profile(&self, table: &'static str, id: &str, name: &str) -> Result<ProfileRow> {
        let sql = format!(
            r#"
            INSERT INTO {0} (id, name, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                updated_at = GREATEST({0}.created_at, EXCLUDED.updated_at)
            RETURNING id, name, created_at, updated_at
            "#,
            table
        );
        let row = sqlx::query_as::<_, ProfileRow>(&sql)
            .bind(id)
            .bind(name)
            .bind(time::now())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error(&format!("upsert {} row", table), e))?;

        debug!("Upserted {} row {}", table, id);
        Ok(row)
    }

    async fn replace_profiles(&self, table: &'static str, rows: Vec<ProfileRow>) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;

        sqlx::query(&format!("DELETE FROM {}", table))
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error(&format!("clear {}", table), e))?;

        // rows take increasing `seq` values in snapshot order
        let insert = format!(
            "INSERT INTO {} (id, name, created_at, updated_at) VALUES ($1, $2, $3, $4)",
            table
        );
        for row in &rows {
            sqlx::query(&insert)
                .bind(&row.id)
                .bind(&row.name)
                .bind(row.created_at)
                .bind(row.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error(&format!("insert {} row", table), e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error(&format!("commit {}", table), e))?;

        debug!("Replaced {} with {} rows", table, rows.len());
        Ok(())
    }

    async fn list_calls(&self) -> Result<Vec<Call>> {
        let sql = format!("SELECT {} FROM calls ORDER BY seq", CALL_COLUMNS);
        let rows = sqlx::query_as::<_, CallRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list calls", e))?;
        into_calls(rows)
    }

    async fn replace_calls(&self, calls: Vec<Call>) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;

        sqlx::query("DELETE FROM calls")
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("clear calls", e))?;

        let insert = format!(
            "INSERT INTO calls ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            CALL_COLUMNS
        );
        for call in &calls {
            sqlx::query(&insert)
                .bind(&call.id)
                .bind(&call.from.id)
                .bind(&call.from.name)
                .bind(&call.to.id)
                .bind(&call.to.name)
                .bind(call.status.as_str())
                .bind(call.created_at)
                .bind(call.updated_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error("insert call", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("commit calls", e))?;

        debug!("Replaced calls with {} rows", calls.len());
        Ok(())
    }
}

#[async_trait]
impl CollectionStore for PgBackend {
    async fn read(&self, collection: Collection) -> Result<Vec<Value>> {
        match collection {
            Collection::Subscribers => {
                let rows = self.list_profiles("subscribers").await?;
                let records: Vec<Subscriber> = rows.into_iter().map(Into::into).collect();
                encode_records(&records)
            }
            Collection::Users => {
                let rows = self.list_profiles("users").await?;
                let records: Vec<User> = rows.into_iter().map(Into::into).collect();
                encode_records(&records)
            }
            Collection::Calls => encode_records(&self.list_calls().await?),
        }
    }

    async fn write(&self, collection: Collection, records: Vec<Value>) -> Result<()> {
        match collection {
            Collection::Subscribers => {
                let records: Vec<Subscriber> = decode_records(records)?;
                validate_snapshot(&records)?;
                self.replace_profiles("subscribers", records.into_iter().map(Into::into).collect())
                    .await
            }
            Collection::Users => {
                let records: Vec<User> = decode_records(records)?;
                validate_snapshot(&records)?;
                self.replace_profiles("users", records.into_iter().map(Into::into).collect())
                    .await
            }
            Collection::Calls => {
                let records: Vec<Call> = decode_records(records)?;
                validate_snapshot(&records)?;
                self.replace_calls(records).await
            }
        }
    }

    async fn backup(&self, collection: Collection) {
        // durability belongs to the database
        debug!("Backup of {} requested; nothing to do for postgres", collection);
    }
}

#[async_trait]
impl SubscriberRepository for PgBackend {
    async fn upsert_subscriber(&self, data: UpsertSubscriber) -> Result<Subscriber> {
        Ok(self
            .upsert_profile("subscribers", &data.id, &data.name)
            .await?
            .into())
    }

    async fn get_subscriber(&self, id: &str) -> Result<Option<Subscriber>> {
        Ok(self.get_profile("subscribers", id).await?.map(Into::into))
    }

    async fn list_subscribers(&self) -> Result<Vec<Subscriber>> {
        let rows = self.list_profiles("subscribers").await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl UserRepository for PgBackend {
    async fn upsert_user(&self, data: UpsertUser) -> Result<User> {
        Ok(self.upsert_profile("users", &data.id, &data.name).await?.into())
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self.get_profile("users", id).await?.map(Into::into))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = self.list_profiles("users").await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl CallRepository for PgBackend {
    async fn create_call(&self, data: NewCall) -> Result<Call> {
        let call = Call::new(data, time::now());
        debug!("Creating call {} from {} to {}", call.id, call.from.id, call.to.id);

        let sql = format!(
            "INSERT INTO calls ({0}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {0}",
            CALL_COLUMNS
        );
        let row = sqlx::query_as::<_, CallRow>(&sql)
            .bind(&call.id)
            .bind(&call.from.id)
            .bind(&call.from.name)
            .bind(&call.to.id)
            .bind(&call.to.name)
            .bind(call.status.as_str())
            .bind(call.created_at)
            .bind(call.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("create call", e))?;

        row.try_into()
    }

    async fn get_call(&self, id: &str) -> Result<Option<Call>> {
        let sql = format!("SELECT {} FROM calls WHERE id = $1", CALL_COLUMNS);
        let row = sqlx::query_as::<_, CallRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("get call", e))?;

        row.map(Call::try_from).transpose()
    }

    async fn update_call_status(&self, id: &str, status: CallStatus) -> Result<Option<Call>> {
        self.update_call_status_at(id, status, time::now()).await
    }

    async fn list_pending_calls(&self, target_id: &str) -> Result<Vec<Call>> {
        let sql = format!(
            "SELECT {} FROM calls WHERE status = $1 AND to_id = $2 ORDER BY seq",
            CALL_COLUMNS
        );
        let rows = sqlx::query_as::<_, CallRow>(&sql)
            .bind(CallStatus::Pending.as_str())
            .bind(target_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_error("list pending calls", e))?;

        into_calls(rows)
    }

    async fn delete_call(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM calls WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete call", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn cleanup_calls(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM calls WHERE status <> $1 AND updated_at < $2")
            .bind(CallStatus::Pending.as_str())
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("clean up calls", e))?;

        let removed = result.rows_affected();
        if removed > 0 {
            info!("Removed {} calls last updated before {}", removed, cutoff);
        }
        Ok(removed)
    }
}

#[async_trait]
impl StorageBackend for PgBackend {
    fn driver(&self) -> StorageDriver {
        StorageDriver::Postgres
    }

    async fn close(&self) {
        if !self.pool.is_closed() {
            info!("Closing database connection pool");
            self.pool.close().await;
        }
    }
}
