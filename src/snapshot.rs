//! YAML snapshot files backing the in-process stores
//!
//! A store keeps its records in memory and rewrites the whole collection to
//! disk after each mutation. On startup the snapshot is read back.

use crate::error::StoreResult;
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Snapshot file for one collection, or nothing for purely in-memory stores
#[derive(Debug, Default)]
pub struct Snapshot {
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl Snapshot {
    /// A snapshot that never touches the filesystem
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// A snapshot stored at `path`
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read all records. A missing file is an empty collection.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed
    pub async fn load<T: DeserializeOwned>(&self) -> StoreResult<Vec<T>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };

        match tokio::fs::read_to_string(path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => {
                let records: Vec<T> = serde_yaml::from_str(&content)?;
                info!(path = %path.display(), count = records.len(), "Loaded snapshot");
                Ok(records)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Rewrite the snapshot with the records produced by `collect`
    ///
    /// `collect` runs under the write lock so concurrent saves cannot
    /// reorder an older collection over a newer one.
    ///
    /// # Errors
    /// Returns an error if serialization or the file write fails
    pub async fn save<T, F>(&self, collect: F) -> StoreResult<()>
    where
        T: Serialize,
        F: FnOnce() -> Vec<T>,
    {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        let records = collect();
        let yaml = serde_yaml::to_string(&records)?;

        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                tokio::fs::create_dir_all(dir).await?;
            }
        }

        let tmp = path.with_extension("yaml.tmp");
        tokio::fs::write(&tmp, yaml).await?;
        tokio::fs::rename(&tmp, path).await?;

        debug!(path = %path.display(), count = records.len(), "Saved snapshot");
        Ok(())
    }
}
