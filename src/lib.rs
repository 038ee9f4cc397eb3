//! STAYCAL - booking calendar client library
//!
//! Re-exports all modules for use by the binary target.

// Core plumbing (action bus, workers)
pub mod core;

// Booking model and sync
pub mod entities;
pub mod sync;
pub mod transport;

// App modules
pub mod calendar;
pub mod cli;
pub mod config;
pub mod controller;
pub mod runner;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use controller::{BookingController, Flow, Notice, NoticeLevel};
pub use core::action_bus::{ActionBus, AppAction};
pub use entities::{Booking, Group, Property, Selection};
pub use sync::{SyncEngine, SyncEvent};
