//! Huddle - storage and call bookkeeping for a conferencing service
//!
//! Subscribers, users and calls are kept in interchangeable backends (JSON
//! documents on disk or PostgreSQL tables) behind one facade. Calls move from
//! pending to a resolved status; resolved calls are reaped after a retention
//! window, pending ones never are.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used types
pub use application::PersistenceFacade;
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
