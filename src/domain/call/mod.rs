//! Call bounded context - tracks calls from pending to a terminal status

pub mod aggregate;
pub mod entity;
pub mod repository;
pub mod value_object;

pub use aggregate::{Call, NewCall};
pub use entity::Participant;
pub use repository::CallRepository;
pub use value_object::{CallStatus, TransitionPolicy};
