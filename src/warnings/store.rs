//! Warning store

use super::WarningRecord;
use crate::error::{StoreError, StoreResult};
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// File name of the warning snapshot inside the data directory
pub const WARNINGS_FILE: &str = "warnings.yaml";

/// Persistence contract for warnings
#[async_trait]
pub trait WarningStore: Send + Sync {
    /// Insert a record, assigning and returning its id
    async fn insert(&self, record: WarningRecord) -> StoreResult<String>;

    async fn get(&self, id: &str) -> StoreResult<Option<WarningRecord>>;

    /// Every warning for the pair, removed ones included, in no particular
    /// order
    async fn for_subject(&self, community: &str, subject: &str)
    -> StoreResult<Vec<WarningRecord>>;

    /// Soft-delete a warning
    ///
    /// Returns the updated record, or `None` if it was already removed.
    async fn mark_removed(
        &self,
        id: &str,
        remover: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<WarningRecord>>;
}

/// `DashMap`-backed warning store with an optional YAML snapshot
#[derive(Clone)]
pub struct MemoryWarningStore {
    records: Arc<DashMap<String, WarningRecord>>,
    snapshot: Arc<Snapshot>,
}

impl Default for MemoryWarningStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWarningStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            snapshot: Arc::new(Snapshot::disabled()),
        }
    }

    /// Open the store persisted in `data_dir`
    ///
    /// # Errors
    /// Returns an error if an existing snapshot cannot be read
    pub async fn open(data_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let snapshot = Snapshot::at(data_dir.as_ref().join(WARNINGS_FILE));
        let records = DashMap::new();
        for record in snapshot.load::<WarningRecord>().await? {
            records.insert(record.id.clone(), record);
        }

        Ok(Self {
            records: Arc::new(records),
            snapshot: Arc::new(snapshot),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    async fn persist(&self) -> StoreResult<()> {
        let records = Arc::clone(&self.records);
        self.snapshot
            .save(move || {
                records
                    .iter()
                    .map(|e| e.value().clone())
                    .collect::<Vec<WarningRecord>>()
            })
            .await
    }
}

#[async_trait]
impl WarningStore for MemoryWarningStore {
    async fn insert(&self, mut record: WarningRecord) -> StoreResult<String> {
        let id = Uuid::new_v4().to_string();
        record.id.clone_from(&id);
        self.records.insert(id.clone(), record);
        if let Err(e) = self.persist().await {
            self.records.remove(&id);
            return Err(e);
        }
        Ok(id)
    }

    async fn get(&self, id: &str) -> StoreResult<Option<WarningRecord>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn for_subject(
        &self,
        community: &str,
        subject: &str,
    ) -> StoreResult<Vec<WarningRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.value().is_for(community, subject))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn mark_removed(
        &self,
        id: &str,
        remover: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<WarningRecord>> {
        let (previous, updated) = {
            let mut record = self
                .records
                .get_mut(id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            let previous = record.clone();
            if !record.remove(remover, reason, at) {
                return Ok(None);
            }
            (previous, record.clone())
        };

        if let Err(e) = self.persist().await {
            warn!(warning_id = %id, "Rolling back unsaved warning removal");
            self.records.insert(previous.id.clone(), previous);
            return Err(e);
        }
        Ok(Some(updated))
    }
}
