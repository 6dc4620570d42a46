//! Subscriber entity

use crate::domain::collection::{Collection, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A party that can be reached by calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscriber {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Subscriber upsert data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertSubscriber {
    pub id: String,
    pub name: String,
}

impl UpsertSubscriber {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl Subscriber {
    pub fn new(data: UpsertSubscriber, now: DateTime<Utc>) -> Self {
        Self {
            id: data.id,
            name: data.name,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an upsert to an existing subscriber; `created_at` is untouched.
    pub fn apply(&mut self, data: UpsertSubscriber, now: DateTime<Utc>) {
        self.name = data.name;
        self.updated_at = now.max(self.created_at);
    }
}

impl Record for Subscriber {
    const COLLECTION: Collection = Collection::Subscribers;

    fn id(&self) -> &str {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
