//! Scheduled action kinds and lifecycle states
//!
//! A scheduled action is always a compensating reversal: it undoes a
//! temporary restriction that was applied when a command ran.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Kind of reversal to perform when an action comes due
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Lift a ban
    #[display("unban")]
    Unban,
    /// Lift a mute
    #[display("unmute")]
    Unmute,
}

impl ActionKind {
    /// Moderation log kind written when the scheduler performs this action
    #[must_use]
    pub fn log_kind(self) -> &'static str {
        match self {
            Self::Unban => "scheduled_unban",
            Self::Unmute => "scheduled_unmute",
        }
    }

    /// Reason recorded for the automatic reversal
    #[must_use]
    pub fn log_reason(self) -> &'static str {
        match self {
            Self::Unban => "Automatic unban",
            Self::Unmute => "Automatic unmute",
        }
    }
}

/// Lifecycle state of a scheduled action
///
/// `Pending` is the only non-terminal state. Each record leaves it exactly
/// once.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Waiting for its execution time
    #[default]
    #[display("pending")]
    Pending,
    /// Reversal performed
    #[display("completed")]
    Completed,
    /// Cancelled by a manual reversal before it came due
    #[display("cancelled")]
    Cancelled,
    /// The platform rejected the reversal; not retried automatically
    #[display("failed")]
    Failed,
}

impl ActionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display_and_log_kind() {
        assert_eq!(ActionKind::Unban.to_string(), "unban");
        assert_eq!(ActionKind::Unmute.to_string(), "unmute");
        assert_eq!(ActionKind::Unban.log_kind(), "scheduled_unban");
        assert_eq!(ActionKind::Unmute.log_kind(), "scheduled_unmute");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ActionStatus::Pending.is_terminal());
        assert!(ActionStatus::Completed.is_terminal());
        assert!(ActionStatus::Cancelled.is_terminal());
        assert!(ActionStatus::Failed.is_terminal());
        assert_eq!(ActionStatus::default(), ActionStatus::Pending);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let yaml = serde_yaml::to_string(&ActionStatus::Cancelled).unwrap();
        assert_eq!(yaml.trim(), "cancelled");
        let kind: ActionKind = serde_yaml::from_str("unmute").unwrap();
        assert_eq!(kind, ActionKind::Unmute);
    }
}
