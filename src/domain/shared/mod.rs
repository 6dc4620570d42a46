//! Shared kernel - Common types and utilities used across all collections

pub mod error;
pub mod result;
pub mod time;

pub use error::DomainError;
pub use result::Result;
