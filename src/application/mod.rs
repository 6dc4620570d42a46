//! Application layer - Services built on the domain ports
//!
//! - The persistence facade every caller goes through
//! - The background sweeper that reaps resolved calls

pub mod call_sweeper;
pub mod persistence;

pub use call_sweeper::CallSweeper;
pub use persistence::PersistenceFacade;
