//! Call value objects

use crate::domain::shared::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Call status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Waiting for the callee to respond
    #[default]
    Pending,
    /// Callee accepted the call
    Accepted,
    /// Caller saw the acceptance
    Acknowledged,
    /// Callee declined the call
    Rejected,
    /// Call is over
    Ended,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Pending => "pending",
            CallStatus::Accepted => "accepted",
            CallStatus::Acknowledged => "acknowledged",
            CallStatus::Rejected => "rejected",
            CallStatus::Ended => "ended",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CallStatus::Pending),
            "accepted" => Some(CallStatus::Accepted),
            "acknowledged" => Some(CallStatus::Acknowledged),
            "rejected" => Some(CallStatus::Rejected),
            "ended" => Some(CallStatus::Ended),
            _ => None,
        }
    }

    /// Pending calls are exempt from age-based cleanup
    pub fn is_pending(&self) -> bool {
        matches!(self, CallStatus::Pending)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Rejected | CallStatus::Ended)
    }

    /// Check if status transition is valid under the strict lifecycle
    pub fn can_transition_to(&self, next: CallStatus) -> bool {
        use CallStatus::*;

        match (*self, next) {
            // Re-applying the current status is a no-op
            (a, b) if a == b => true,

            // From Pending
            (Pending, Accepted) => true,
            (Pending, Rejected) => true,
            (Pending, Ended) => true,

            // From Accepted
            (Accepted, Acknowledged) => true,
            (Accepted, Ended) => true,

            // From Acknowledged
            (Acknowledged, Ended) => true,

            // Nothing leaves a terminal state
            _ => false,
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How status updates are checked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionPolicy {
    /// Any status may follow any other; callers own the lifecycle
    #[default]
    Permissive,
    /// Only transitions allowed by [`CallStatus::can_transition_to`]
    Strict,
}

impl TransitionPolicy {
    pub fn check(&self, call_id: &str, from: CallStatus, to: CallStatus) -> Result<()> {
        match self {
            TransitionPolicy::Permissive => Ok(()),
            TransitionPolicy::Strict if from.can_transition_to(to) => Ok(()),
            TransitionPolicy::Strict => Err(DomainError::InvalidStateTransition(format!(
                "call {}: {} -> {}",
                call_id, from, to
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_string_mapping() {
        for status in [
            CallStatus::Pending,
            CallStatus::Accepted,
            CallStatus::Acknowledged,
            CallStatus::Rejected,
            CallStatus::Ended,
        ] {
            assert_eq!(CallStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(CallStatus::from_str("ringing"), None);
        assert_eq!(CallStatus::default(), CallStatus::Pending);
    }

    #[test]
    fn test_valid_status_transitions() {
        assert!(CallStatus::Pending.can_transition_to(CallStatus::Accepted));
        assert!(CallStatus::Pending.can_transition_to(CallStatus::Rejected));
        assert!(CallStatus::Accepted.can_transition_to(CallStatus::Acknowledged));
        assert!(CallStatus::Acknowledged.can_transition_to(CallStatus::Ended));
        assert!(CallStatus::Ended.can_transition_to(CallStatus::Ended));
    }

    #[test]
    fn test_invalid_status_transitions() {
        assert!(!CallStatus::Ended.can_transition_to(CallStatus::Pending));
        assert!(!CallStatus::Rejected.can_transition_to(CallStatus::Accepted));
        assert!(!CallStatus::Pending.can_transition_to(CallStatus::Acknowledged));
    }

    #[test]
    fn test_policy_check() {
        let permissive = TransitionPolicy::Permissive;
        assert!(permissive
            .check("c1", CallStatus::Ended, CallStatus::Pending)
            .is_ok());

        let strict = TransitionPolicy::Strict;
        assert!(strict
            .check("c1", CallStatus::Pending, CallStatus::Accepted)
            .is_ok());
        assert!(matches!(
            strict.check("c1", CallStatus::Ended, CallStatus::Pending),
            Err(DomainError::InvalidStateTransition(_))
        ));
    }
}
