//! Core plumbing - action bus, workers
//!
//! Independent of the booking model.

pub mod action_bus;
pub mod workers;

// Re-exports for convenience
pub use action_bus::{ActionBus, AppAction, Subscription};
pub use workers::Workers;
