//! Subscriber domain

pub mod entity;
pub mod repository;

pub use entity::{Subscriber, UpsertSubscriber};
pub use repository::SubscriberRepository;
