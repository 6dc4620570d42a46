//! User entity

use crate::domain::collection::{Collection, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User entity
///
/// Shaped like a subscriber but kept in its own collection; ids are not
/// shared between the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// User upsert data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertUser {
    pub id: String,
    pub name: String,
}

impl UpsertUser {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl User {
    pub fn new(data: UpsertUser, now: DateTime<Utc>) -> Self {
        Self {
            id: data.id,
            name: data.name,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, data: UpsertUser, now: DateTime<Utc>) {
        self.name = data.name;
        self.updated_at = now.max(self.created_at);
    }
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;

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
