//! User domain

pub mod entity;
pub mod repository;

pub use entity::{UpsertUser, User};
pub use repository::UserRepository;
