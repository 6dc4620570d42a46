//! User repository interface

use super::entity::{UpsertUser, User};
use crate::domain::shared::error::Result;
use async_trait::async_trait;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create the user, or rename it if the id already exists
    async fn upsert_user(&self, data: UpsertUser) -> Result<User>;

    /// Find user by ID
    async fn get_user(&self, id: &str) -> Result<Option<User>>;

    /// List all users
    async fn list_users(&self) -> Result<Vec<User>>;
}
