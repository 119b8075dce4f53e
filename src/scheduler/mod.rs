//! Deferred action scheduling
//!
//! Temporary restrictions are applied immediately on the platform and their
//! reversal is recorded here. The scheduler polls the store, performs due
//! reversals and keeps each record's lifecycle consistent with what actually
//! happened on the platform.

mod action;
mod error;
mod record;
mod service;
mod store;

pub use action::{ActionKind, ActionStatus};
pub use error::{SchedulerError, SchedulerResult};
pub use record::{ActionTransition, ScheduledAction};
pub use service::{ActionScheduler, PassReport, SchedulerHandle};
pub use store::{ACTIONS_FILE, ActionStore, MemoryActionStore};

/// Request type for the polling task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerRequest {
    /// Run a pass now instead of waiting for the next tick
    RunNow,
    /// Finish the current pass and exit
    Shutdown,
}
