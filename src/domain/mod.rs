//! Domain layer - Records, lifecycle rules and storage ports
//!
//! This layer contains:
//! - Entities: subscribers, users and calls
//! - Value Objects: participants and call status
//! - Repository Interfaces: ports for persistence
//! - The whole-collection storage contract shared by all backends

pub mod call;
pub mod collection;
pub mod shared;
pub mod storage;
pub mod subscriber;
pub mod user;

// Re-export commonly used types
pub use shared::{DomainError, Result};
