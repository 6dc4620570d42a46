//! Subscriber repository interface

use super::entity::{Subscriber, UpsertSubscriber};
use crate::domain::shared::error::Result;
use async_trait::async_trait;

/// Subscriber repository trait
#[async_trait]
pub trait SubscriberRepository: Send + Sync {
    /// Create the subscriber, or rename it if the id already exists
    async fn upsert_subscriber(&self, data: UpsertSubscriber) -> Result<Subscriber>;

    /// Find subscriber by ID
    async fn get_subscriber(&self, id: &str) -> Result<Option<Subscriber>>;

    /// Full roster in stored order
    async fn list_subscribers(&self) -> Result<Vec<Subscriber>>;
}
