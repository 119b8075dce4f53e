//! Moderation log
//!
//! Every manual command, scheduled reversal and automatic escalation appends
//! one entry. From the core's point of view the log is write-only, and a
//! failed append never fails the action that produced it.

use crate::AUDIT_TARGET;
use crate::error::LogError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::info;

/// One audit entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationLogEntry {
    /// e.g. `ban`, `timeout`, `warning`, `scheduled_unban`
    pub kind: String,
    pub community: String,
    pub subject: String,
    /// Moderator, or the system identity for automatic actions
    pub issuer: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub details: LogDetails,
}

/// Kind-specific fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
}

impl ModerationLogEntry {
    pub fn new(
        kind: impl Into<String>,
        community: impl Into<String>,
        subject: impl Into<String>,
        issuer: impl Into<String>,
        reason: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind: kind.into(),
            community: community.into(),
            subject: subject.into(),
            issuer: issuer.into(),
            reason: reason.into(),
            timestamp,
            details: LogDetails::default(),
        }
    }

    #[must_use]
    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.details.duration = Some(duration.into());
        self
    }

    #[must_use]
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.details.expires_at = Some(expires_at);
        self
    }

    #[must_use]
    pub fn with_warning(mut self, warning_id: impl Into<String>, number: Option<u32>) -> Self {
        self.details.warning_id = Some(warning_id.into());
        self.details.warning_number = number;
        self
    }

    #[must_use]
    pub fn with_level(mut self, level: u8) -> Self {
        self.details.level = Some(level);
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.details.note = note;
        self
    }

    #[must_use]
    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.details.action_id = Some(action_id.into());
        self
    }
}

/// Append-only audit sink
#[async_trait]
pub trait ModerationLog: Send + Sync {
    async fn append(&self, entry: ModerationLogEntry) -> Result<(), LogError>;
}

/// Writes entries as structured events on the audit tracing target
///
/// `logging::init` routes that target to its own JSON file.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingModerationLog;

#[async_trait]
impl ModerationLog for TracingModerationLog {
    async fn append(&self, entry: ModerationLogEntry) -> Result<(), LogError> {
        let details = &entry.details;
        info!(
            target: AUDIT_TARGET,
            kind = %entry.kind,
            community = %entry.community,
            subject = %entry.subject,
            issuer = %entry.issuer,
            reason = %entry.reason,
            timestamp = %entry.timestamp.to_rfc3339(),
            duration = ?details.duration,
            expires_at = ?details.expires_at.map(|t| t.to_rfc3339()),
            warning_number = ?details.warning_number,
            level = ?details.level,
            note = ?details.note,
            warning_id = ?details.warning_id,
            action_id = ?details.action_id,
            "Moderation action"
        );
        Ok(())
    }
}

/// Keeps entries in memory, oldest first
#[derive(Debug, Clone, Default)]
pub struct MemoryModerationLog {
    entries: Arc<Mutex<Vec<ModerationLogEntry>>>,
}

impl MemoryModerationLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<ModerationLogEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Entries of one kind
    #[must_use]
    pub fn entries_of(&self, kind: &str) -> Vec<ModerationLogEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.kind == kind)
            .collect()
    }
}

#[async_trait]
impl ModerationLog for MemoryModerationLog {
    async fn append(&self, entry: ModerationLogEntry) -> Result<(), LogError> {
        self.entries
            .lock()
            .map_err(|e| LogError(e.to_string()))?
            .push(entry);
        Ok(())
    }
}
