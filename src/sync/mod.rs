//! Synchronization between the selection, the store and the backend.

pub mod dispatch;
pub mod engine;
pub mod request;

pub use dispatch::{Completion, Dispatcher, Job, ManualDispatcher, ThreadedDispatcher};
pub use engine::{SyncEngine, SyncEvent};
pub use request::{ApiCall, ApiReply, FetchScope, FetchSlot, Mutation, Ticket};
