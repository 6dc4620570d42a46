//! Call record

use crate::domain::call::entity::Participant;
use crate::domain::call::value_object::CallStatus;
use crate::domain::collection::{Collection, Record};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A call between two participants
///
/// Status changes are caller-driven; the store only keeps timestamps honest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub id: String,
    pub from: Participant,
    pub to: Participant,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Call creation data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCall {
    /// Generated when absent
    #[serde(default)]
    pub id: Option<String>,
    pub from: Participant,
    pub to: Participant,
    /// Defaults to pending
    #[serde(default)]
    pub status: Option<CallStatus>,
}

impl NewCall {
    pub fn new(from: Participant, to: Participant) -> Self {
        Self {
            id: None,
            from,
            to,
            status: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_status(mut self, status: CallStatus) -> Self {
        self.status = Some(status);
        self
    }
}

impl Call {
    pub fn new(data: NewCall, now: DateTime<Utc>) -> Self {
        Self {
            id: data.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            from: data.from,
            to: data.to,
            status: data.status.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// `updated_at` never moves before `created_at`, whatever `now` says
    pub fn set_status(&mut self, status: CallStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now.max(self.created_at);
    }

    /// Pending calls addressed to `target_id`
    pub fn is_pending_for(&self, target_id: &str) -> bool {
        self.status.is_pending() && self.to.id == target_id
    }

    /// Non-pending and last touched strictly before `cutoff`
    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        !self.status.is_pending() && self.updated_at < cutoff
    }
}

impl Record for Call {
    const COLLECTION: Collection = Collection::Calls;

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
