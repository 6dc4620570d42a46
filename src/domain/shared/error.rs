//! Domain errors

use thiserror::Error;

/// Domain result type
pub type Result<T> = std::result::Result<T, DomainError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupted document {path}: {reason}")]
    Corrupted { path: String, reason: String },

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// True for failures raised while wiring up a backend, as opposed to
    /// failures of a request-scoped operation.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DomainError::Configuration(_) | DomainError::UnknownCollection(_)
        )
    }
}
