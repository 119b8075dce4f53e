use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A warning issued to a subject in a community
///
/// Removal is a soft delete: the record stays for audit but no longer counts
/// toward numbering or escalation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub id: String,
    pub community: String,
    pub subject: String,
    pub issuer: String,
    pub reason: String,
    /// 1 (minor) to 5 (final)
    pub severity_level: u8,
    /// Ordinal within the active window at issuance; never recomputed
    pub warning_number: u32,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub removed_by: Option<String>,
    #[serde(default)]
    pub remove_reason: Option<String>,
    #[serde(default)]
    pub removed_at: Option<DateTime<Utc>>,
}

impl WarningRecord {
    /// A new, unnumbered warning. The store assigns the id.
    pub fn new(
        community: impl Into<String>,
        subject: impl Into<String>,
        issuer: impl Into<String>,
        reason: impl Into<String>,
        severity_level: u8,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            community: community.into(),
            subject: subject.into(),
            issuer: issuer.into(),
            reason: reason.into(),
            severity_level,
            warning_number: 0,
            timestamp,
            note: None,
            removed: false,
            removed_by: None,
            remove_reason: None,
            removed_at: None,
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = note;
        self
    }

    #[must_use]
    pub fn is_for(&self, community: &str, subject: &str) -> bool {
        self.community == community && self.subject == subject
    }

    /// Counts toward numbering at `since` or later
    #[must_use]
    pub fn is_active_since(&self, since: DateTime<Utc>) -> bool {
        !self.removed && self.timestamp >= since
    }

    /// Soft delete. Returns `false` if already removed.
    pub fn remove(&mut self, remover: &str, reason: &str, at: DateTime<Utc>) -> bool {
        if self.removed {
            return false;
        }
        self.removed = true;
        self.removed_by = Some(remover.to_string());
        self.remove_reason = Some(reason.to_string());
        self.removed_at = Some(at);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_remove_once() {
        let now = Utc::now();
        let mut warning = WarningRecord::new("rust", "ferris", "mod", "rude", 2, now);

        assert!(warning.remove("admin", "appealed", now));
        assert!(warning.removed);
        assert_eq!(warning.removed_by.as_deref(), Some("admin"));
        assert_eq!(warning.removed_at, Some(now));

        assert!(!warning.remove("other", "again", now + Duration::hours(1)));
        assert_eq!(warning.removed_by.as_deref(), Some("admin"));
    }

    #[test]
    fn test_active_window() {
        let now = Utc::now();
        let warning = WarningRecord::new("rust", "ferris", "mod", "rude", 1, now);

        assert!(warning.is_active_since(now));
        assert!(warning.is_active_since(now - Duration::days(30)));
        assert!(!warning.is_active_since(now + Duration::seconds(1)));
    }
}
