//! Infrastructure layer - Technical implementations
//!
//! This layer contains the storage adapters: a JSON document backend and a
//! PostgreSQL backend, both implementing the domain's storage ports.

pub mod persistence;
