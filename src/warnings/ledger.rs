//! Warning ledger
//!
//! Numbers each new warning by the subject's active warnings in the trailing
//! window. A number is fixed at issuance: later removals or warnings aging
//! out never renumber existing records.

use super::{WarningRecord, WarningStore};
use crate::audit::{ModerationLog, ModerationLogEntry};
use crate::clock::Clock;
use crate::error::{StoreError, StoreResult};
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Trailing window for warning numbering, in days
pub const WARNING_WINDOW_DAYS: u32 = 30;

pub struct WarningLedger {
    store: Arc<dyn WarningStore>,
    log: Arc<dyn ModerationLog>,
    clock: Arc<dyn Clock>,
    /// Serializes count-then-insert so concurrent warnings get distinct numbers
    issue_lock: Mutex<()>,
}

impl WarningLedger {
    pub fn new(
        store: Arc<dyn WarningStore>,
        log: Arc<dyn ModerationLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            log,
            clock,
            issue_lock: Mutex::new(()),
        }
    }

    /// Issue and persist a warning
    ///
    /// # Errors
    /// Returns an error if the store cannot be read or written
    pub async fn record_warning(
        &self,
        community: &str,
        subject: &str,
        issuer: &str,
        reason: &str,
        severity_level: u8,
        note: Option<String>,
    ) -> StoreResult<WarningRecord> {
        let _guard = self.issue_lock.lock().await;

        let active = self
            .active_warnings(community, subject, WARNING_WINDOW_DAYS)
            .await?;
        let warning_number = u32::try_from(active.len()).unwrap_or(u32::MAX).saturating_add(1);

        let mut record = WarningRecord::new(
            community,
            subject,
            issuer,
            reason,
            severity_level,
            self.clock.now(),
        )
        .with_note(note);
        record.warning_number = warning_number;
        record.id = self.store.insert(record.clone()).await?;

        info!(
            warning_id = %record.id,
            community = %community,
            subject = %subject,
            warning_number,
            severity_level,
            "Warning recorded"
        );

        Ok(record)
    }

    /// Non-removed warnings inside the trailing window, newest first
    ///
    /// # Errors
    /// Returns an error if the store cannot be read
    pub async fn active_warnings(
        &self,
        community: &str,
        subject: &str,
        window_days: u32,
    ) -> StoreResult<Vec<WarningRecord>> {
        let since = self.clock.now() - Duration::days(i64::from(window_days));
        let mut warnings: Vec<WarningRecord> = self
            .store
            .for_subject(community, subject)
            .await?
            .into_iter()
            .filter(|w| w.is_active_since(since))
            .collect();
        warnings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(warnings)
    }

    /// Every non-removed warning regardless of age, newest first
    ///
    /// # Errors
    /// Returns an error if the store cannot be read
    pub async fn all_warnings(
        &self,
        community: &str,
        subject: &str,
    ) -> StoreResult<Vec<WarningRecord>> {
        let mut warnings: Vec<WarningRecord> = self
            .store
            .for_subject(community, subject)
            .await?
            .into_iter()
            .filter(|w| !w.removed)
            .collect();
        warnings.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(warnings)
    }

    /// Soft-delete a warning and log the removal
    ///
    /// Removing an already removed warning changes nothing and writes no log
    /// entry.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` for an unknown id
    pub async fn remove_warning(
        &self,
        id: &str,
        remover: &str,
        reason: &str,
    ) -> StoreResult<WarningRecord> {
        let now = self.clock.now();
        let reason = if reason.trim().is_empty() {
            "Warning removed"
        } else {
            reason
        };

        let Some(record) = self.store.mark_removed(id, remover, reason, now).await? else {
            return self
                .store
                .get(id)
                .await?
                .ok_or_else(|| StoreError::NotFound(id.to_string()));
        };

        info!(
            warning_id = %id,
            community = %record.community,
            subject = %record.subject,
            remover = %remover,
            "Warning removed"
        );

        let entry = ModerationLogEntry::new(
            "warning_removed",
            &record.community,
            &record.subject,
            remover,
            reason,
            now,
        )
        .with_warning(id, None);
        if let Err(e) = self.log.append(entry).await {
            warn!(warning_id = %id, error = %e, "Failed to log warning removal");
        }

        Ok(record)
    }
}
