//! Call repository interface

use crate::domain::call::aggregate::{Call, NewCall};
use crate::domain::call::value_object::CallStatus;
use crate::domain::shared::result::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Repository interface for call records
///
/// This is defined in the domain layer as a trait (port),
/// and implemented in the infrastructure layer (adapter).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallRepository: Send + Sync {
    /// Store a new call with fresh timestamps
    async fn create_call(&self, data: NewCall) -> Result<Call>;

    /// Find a call by its ID
    async fn get_call(&self, id: &str) -> Result<Option<Call>>;

    /// Set status and `updated_at`. `None` if no such call exists.
    async fn update_call_status(&self, id: &str, status: CallStatus) -> Result<Option<Call>>;

    /// Pending calls addressed to `target_id`
    async fn list_pending_calls(&self, target_id: &str) -> Result<Vec<Call>>;

    /// Remove one call. `false` if it did not exist.
    async fn delete_call(&self, id: &str) -> Result<bool>;

    /// Remove non-pending calls last updated before `cutoff`; returns how many
    async fn cleanup_calls(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
