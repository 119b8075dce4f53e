//! Error types for the action scheduler

use super::ActionStatus;
use crate::error::StoreError;
use thiserror::Error;

/// Errors that can occur during scheduler operations
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid state transition attempted
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: ActionStatus, to: ActionStatus },

    /// The backing store failed
    #[error("Scheduler store error: {0}")]
    Store(#[from] StoreError),

    /// `start` called while the polling task is already running
    #[error("Scheduler already running")]
    AlreadyRunning,

    /// The polling task is gone
    #[error("Scheduler not running")]
    NotRunning,
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
