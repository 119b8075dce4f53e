//! Error types shared across the moderation core
//!
//! Component-specific errors live next to their component; these are the
//! ones that cross component boundaries.

use crate::scheduler::SchedulerError;
use thiserror::Error;

/// Persistence failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the snapshot file failed
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),

    /// Record lookup by id failed
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Backend not reachable
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by the moderated platform
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("Platform rate limit hit")]
    RateLimited,

    #[error("Not found on platform: {0}")]
    NotFound(String),

    /// Community or subject could not be mapped to a platform identifier
    #[error("Invalid platform identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Platform API error: {0}")]
    Api(String),
}

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Failure to append to the moderation log
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Moderation log error: {0}")]
pub struct LogError(pub String);

/// Errors surfaced to callers of moderation commands
#[derive(Debug, Error)]
pub enum ModerationError {
    /// Command rejected before any store or platform call
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl ModerationError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Result type for moderation commands
pub type ModerationResult<T> = Result<T, ModerationError>;
