//! Persistence implementations

pub mod collection_repository;
pub mod file_backend;
mod locks;
#[cfg(feature = "postgres")]
pub mod database;
#[cfg(feature = "postgres")]
pub mod pg_backend;

pub use collection_repository::CollectionRepository;
pub use file_backend::{CorruptionHandler, CorruptionReport, FileBackend};
#[cfg(feature = "postgres")]
pub use database::{create_pool, mask_password, run_migrations};
#[cfg(feature = "postgres")]
pub use pg_backend::PgBackend;
