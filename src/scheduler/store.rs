//! Scheduled action store
//!
//! The scheduler only needs a handful of operations from persistence. Each
//! mutating operation is atomic per record; the scheduler never wraps a whole
//! pass in a transaction.

use super::{ActionKind, ActionStatus, ActionTransition, ScheduledAction};
use crate::error::{StoreError, StoreResult};
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// File name of the action snapshot inside the data directory
pub const ACTIONS_FILE: &str = "scheduled_actions.yaml";

/// Persistence contract for scheduled actions
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Insert a record, assigning and returning its id
    async fn insert(&self, record: ScheduledAction) -> StoreResult<String>;

    /// Fetch a record by id
    async fn get(&self, id: &str) -> StoreResult<Option<ScheduledAction>>;

    /// All pending records with `execute_at <= now`, in no particular order
    async fn find_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<ScheduledAction>>;

    /// Compare-and-set a single record out of `from`
    ///
    /// Returns `false` if the record no longer has status `from`, meaning
    /// another writer got there first.
    async fn transition(
        &self,
        id: &str,
        from: ActionStatus,
        transition: ActionTransition,
    ) -> StoreResult<bool>;

    /// Cancel every pending record for the key, returning how many changed
    async fn cancel_all_pending(
        &self,
        kind: ActionKind,
        community: &str,
        subject: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<usize>;

    /// Pending records for a community, soonest first
    async fn pending_for_community(&self, community: &str) -> StoreResult<Vec<ScheduledAction>>;
}

/// `DashMap`-backed action store with an optional YAML snapshot
#[derive(Clone)]
pub struct MemoryActionStore {
    records: Arc<DashMap<String, ScheduledAction>>,
    snapshot: Arc<Snapshot>,
}

impl Default for MemoryActionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryActionStore {
    /// Create a store that lives only in memory
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            snapshot: Arc::new(Snapshot::disabled()),
        }
    }

    /// Open the store persisted in `data_dir`, loading any existing records
    ///
    /// # Errors
    /// Returns an error if an existing snapshot cannot be read
    pub async fn open(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let snapshot = Snapshot::at(data_dir.as_ref().join(ACTIONS_FILE));
        let records = DashMap::new();
        for record in snapshot.load::<ScheduledAction>().await? {
            records.insert(record.id.clone(), record);
        }

        Ok(Self {
            records: Arc::new(records),
            snapshot: Arc::new(snapshot),
        })
    }

    /// Number of records of any status
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get all records by status
    #[must_use]
    pub fn get_by_status(&self, status: ActionStatus) -> Vec<ScheduledAction> {
        self.records
            .iter()
            .filter(|entry| entry.value().status == status)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Put back records whose change could not be saved
    fn restore(&self, records: Vec<ScheduledAction>) {
        for record in records {
            warn!(action_id = %record.id, "Rolling back unsaved scheduled action change");
            self.records.insert(record.id.clone(), record);
        }
    }

    async fn persist(&self) -> StoreResult<()> {
        let records = Arc::clone(&self.records);
        self.snapshot
            .save(move || {
                records
                    .iter()
                    .map(|e| e.value().clone())
                    .collect::<Vec<ScheduledAction>>()
            })
            .await
    }
}

#[async_trait]
impl ActionStore for MemoryActionStore {
    async fn insert(&self, mut record: ScheduledAction) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        record.id.clone_from(&id);
        self.records.insert(id.clone(), record);
        if let Err(e) = self.persist().await {
            self.records.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<ScheduledAction>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn find_due(&self, now: DateTime<Utc>) -> StoreResult<Vec<ScheduledAction>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.value().is_due(now))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn transition(
        &self,
        id: &str,
        from: ActionStatus,
        transition: ActionTransition,
    ) -> StoreResult<bool> {
        let previous = {
            let mut record = self
                .records
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

            if record.status != from {
                None
            } else {
                let previous = record.clone();
                match record.apply(transition) {
                    Ok(()) => Some(previous),
                    Err(e) => {
                        warn!(action_id = %id, error = %e, "Rejected scheduled action transition");
                        None
                    }
                }
            }
        };

        let Some(previous) = previous else {
            return Ok(false);
        };
        if let Err(e) = self.persist().await {
            self.restore(vec![previous]);
            return Err(e);
        }
        Ok(true)
    }

    async fn cancel_all_pending(
        &self,
        kind: ActionKind,
        community: &str,
        subject: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let mut previous = Vec::new();

        for mut entry in self.records.iter_mut() {
            let record = entry.value_mut();
            if record.status == ActionStatus::Pending && record.matches(kind, community, subject) {
                let before = record.clone();
                if record.apply(ActionTransition::Cancel { at }).is_ok() {
                    previous.push(before);
                }
            }
        }

        let cancelled = previous.len();
        if cancelled > 0 {
            if let Err(e) = self.persist().await {
                self.restore(previous);
                return Err(e);
            }
        }
        Ok(cancelled)
    }

    async fn pending_for_community(&self, community: &str) -> StoreResult<Vec<ScheduledAction>> {
        let mut pending: Vec<ScheduledAction> = self
            .records
            .iter()
            .filter(|entry| {
                let record = entry.value();
                record.status == ActionStatus::Pending && record.community == community
            })
            .map(|entry| entry.value().clone())
            .collect();
        pending.sort_by_key(|record| record.execute_at);
        Ok(pending)
    }
}
