//! Scheduled action record and state machine
//!
//! Records are never deleted. Terminal records stay in the store as the
//! audit trail of what was reversed, cancelled or failed.

use super::{ActionKind, ActionStatus, SchedulerError, SchedulerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// A deferred "do `kind` to `subject` in `community` at `execute_at`"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledAction {
    /// Opaque identifier, assigned by the store on insert
    pub id: String,
    pub kind: ActionKind,
    pub community: String,
    pub subject: String,
    /// Instant at which the action becomes due
    pub execute_at: DateTime<Utc>,
    pub status: ActionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Platform error message, set only on `Failed`
    pub last_error: Option<String>,
    /// True when the restriction emulates a timeout rather than a plain
    /// temporary ban or mute
    #[serde(default)]
    pub derived_from_timeout: bool,
}

/// Terminal transition applied to a pending record, with the fields it sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionTransition {
    Complete { at: DateTime<Utc> },
    Fail { at: DateTime<Utc>, error: String },
    Cancel { at: DateTime<Utc> },
}

impl ActionTransition {
    /// Status the record ends up in
    #[must_use]
    pub fn target(&self) -> ActionStatus {
        match self {
            Self::Complete { .. } => ActionStatus::Completed,
            Self::Fail { .. } => ActionStatus::Failed,
            Self::Cancel { .. } => ActionStatus::Cancelled,
        }
    }
}

impl ScheduledAction {
    /// Create a pending action. The id stays empty until the store assigns one.
    pub fn new(
        kind: ActionKind,
        community: impl Into<String>,
        subject: impl Into<String>,
        execute_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
        derived_from_timeout: bool,
    ) -> Self {
        Self {
            id: String::new(),
            kind,
            community: community.into(),
            subject: subject.into(),
            execute_at,
            status: ActionStatus::Pending,
            created_at,
            completed_at: None,
            failed_at: None,
            cancelled_at: None,
            last_error: None,
            derived_from_timeout,
        }
    }

    /// Check if this action is due at `now`
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ActionStatus::Pending && self.execute_at <= now
    }

    /// Whether this action targets the given (kind, community, subject) key
    #[must_use]
    pub fn matches(&self, kind: ActionKind, community: &str, subject: &str) -> bool {
        self.kind == kind && self.community == community && self.subject == subject
    }

    /// Move this record out of `Pending`
    ///
    /// # Errors
    /// Returns `InvalidStateTransition` if the record is already terminal
    pub fn apply(&mut self, transition: ActionTransition) -> SchedulerResult<()> {
        if self.status != ActionStatus::Pending {
            return Err(SchedulerError::InvalidStateTransition {
                from: self.status,
                to: transition.target(),
            });
        }

        self.status = transition.target();
        match transition {
            ActionTransition::Complete { at } => self.completed_at = Some(at),
            ActionTransition::Fail { at, error } => {
                self.failed_at = Some(at);
                self.last_error = Some(error);
            }
            ActionTransition::Cancel { at } => self.cancelled_at = Some(at),
        }

        info!(
            action_id = %self.id,
            kind = %self.kind,
            community = %self.community,
            subject = %self.subject,
            status = %self.status,
            "Scheduled action transitioned"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending(now: DateTime<Utc>) -> ScheduledAction {
        ScheduledAction::new(
            ActionKind::Unban,
            "rust",
            "ferris",
            now + Duration::hours(1),
            now,
            false,
        )
    }

    #[test]
    fn test_new_record_is_pending() {
        let now = Utc::now();
        let record = pending(now);
        assert_eq!(record.status, ActionStatus::Pending);
        assert!(record.id.is_empty());
        assert!(record.completed_at.is_none());
        assert!(record.last_error.is_none());
    }

    #[test]
    fn test_due_only_when_pending_and_past() {
        let now = Utc::now();
        let mut record = pending(now);
        assert!(!record.is_due(now));
        assert!(record.is_due(now + Duration::hours(1)));
        assert!(record.is_due(now + Duration::hours(2)));

        record
            .apply(ActionTransition::Cancel { at: now })
            .unwrap();
        assert!(!record.is_due(now + Duration::hours(2)));
    }

    #[test]
    fn test_complete_sets_completed_at() {
        let now = Utc::now();
        let mut record = pending(now);
        record.apply(ActionTransition::Complete { at: now }).unwrap();
        assert_eq!(record.status, ActionStatus::Completed);
        assert_eq!(record.completed_at, Some(now));
        assert!(record.failed_at.is_none());
    }

    #[test]
    fn test_fail_sets_error() {
        let now = Utc::now();
        let mut record = pending(now);
        record
            .apply(ActionTransition::Fail {
                at: now,
                error: "rate limited".to_string(),
            })
            .unwrap();
        assert_eq!(record.status, ActionStatus::Failed);
        assert_eq!(record.last_error.as_deref(), Some("rate limited"));
        assert_eq!(record.failed_at, Some(now));
    }

    #[test]
    fn test_terminal_states_are_final() {
        let now = Utc::now();
        let mut record = pending(now);
        record.apply(ActionTransition::Cancel { at: now }).unwrap();

        let err = record
            .apply(ActionTransition::Complete { at: now })
            .unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidStateTransition {
                from: ActionStatus::Cancelled,
                to: ActionStatus::Completed,
            }
        ));
        assert!(record.completed_at.is_none());
    }

    #[test]
    fn test_matches_key() {
        let record = pending(Utc::now());
        assert!(record.matches(ActionKind::Unban, "rust", "ferris"));
        assert!(!record.matches(ActionKind::Unmute, "rust", "ferris"));
        assert!(!record.matches(ActionKind::Unban, "golang", "ferris"));
        assert!(!record.matches(ActionKind::Unban, "rust", "gopher"));
    }
}
