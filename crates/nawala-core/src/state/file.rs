// # File Store
//
// File-based implementation of Store with crash recovery.
//
// ## Purpose
//
// Persists targets, check results, shortlinks and rotation history across
// runs of the cron-driven binary. Every mutating call is written through
// before it returns.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Automatic backup: `.backup` keeps the previous good state
// - Corruption detection: JSON validated on load
// - Recovery: falls back to the backup if the main file is corrupted
//
// ## Atomicity
//
// A write applies the change to a copy of the dataset, persists the copy and
// only then swaps it in. A failed disk write leaves both the file and the
// in-memory rows unchanged.
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "data": {
//     "targets": { "1": { "id": 1, "domain_or_url": "example.com", ... } },
//     "check_results": [ ... ],
//     "shortlinks": { ... },
//     ...
//   }
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::dataset::Dataset;
use crate::Error;
use crate::config::StoreConfig;
use crate::model::{
    CheckResult, ProbeStatus, Resolver, RotationGroup, RotationGroupId, RotationHistory,
    Shortlink, ShortlinkId, ShortlinkTarget, ShortlinkTargetId, Target, TargetGroup,
    TargetGroupId, TargetId,
};
use crate::traits::{CheckCommit, CommittedCheck, RotationCommit, Store, StoreFactory};

/// Data file format version
const DATA_FILE_VERSION: &str = "1.0";

/// File-based store with crash recovery
///
/// # Example
///
/// ```rust,no_run
/// use nawala_core::state::FileStore;
/// use nawala_core::model::Target;
/// use nawala_core::traits::Store;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStore::new("/var/lib/nawala/data.json").await?;
///
///     // Atomically written to disk
///     store.put_target(Target::new(1, "example.com")).await?;
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    data: RwLock<Dataset>,
}

#[derive(Serialize)]
struct DataFileRef<'a> {
    version: &'static str,
    data: &'a Dataset,
}

#[derive(Deserialize)]
struct DataFile {
    #[serde(default)]
    version: String,
    #[serde(default)]
    data: Dataset,
}

/// Result of reading one data file
enum Loaded {
    Missing,
    Parsed(Dataset),
    Corrupted(serde_json::Error),
}

impl FileStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Try to load the existing data file
    /// 3. If it is corrupted, recover from the backup
    /// 4. If both fail, start with empty tables
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::config(format!(
                        "Failed to create data directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let data = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Path of the data file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_with_recovery(path: &Path) -> Result<Dataset, Error> {
        let error = match Self::load(path).await? {
            Loaded::Missing => {
                tracing::debug!("Data file does not exist: {}", path.display());
                return Ok(Dataset::default());
            }
            Loaded::Parsed(data) => {
                tracing::debug!(
                    "Loaded data file: {} targets, {} shortlinks",
                    data.targets.len(),
                    data.shortlinks.len()
                );
                return Ok(data);
            }
            Loaded::Corrupted(e) => e,
        };

        tracing::warn!(
            "Data file {} appears corrupted: {}. Attempting recovery from backup.",
            path.display(),
            error
        );

        let backup_path = Self::backup_path(path);
        match Self::load(&backup_path).await {
            Ok(Loaded::Parsed(data)) => {
                tracing::info!("Recovered data from backup {}", backup_path.display());
                if let Err(e) = fs::copy(&backup_path, path).await {
                    tracing::error!("Failed to restore data file from backup: {}", e);
                }
                Ok(data)
            }
            Ok(Loaded::Missing) => {
                tracing::warn!("No backup file found. Starting with empty data.");
                Ok(Dataset::default())
            }
            Ok(Loaded::Corrupted(e)) => {
                tracing::error!("Backup also corrupted: {}. Starting with empty data.", e);
                Ok(Dataset::default())
            }
            Err(e) => {
                tracing::error!("Failed to read backup: {}. Starting with empty data.", e);
                Ok(Dataset::default())
            }
        }
    }

    async fn load(path: &Path) -> Result<Loaded, Error> {
        if !path.exists() {
            return Ok(Loaded::Missing);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store(format!("Failed to read data file {}: {}", path.display(), e))
        })?;

        let file: DataFile = match serde_json::from_str(&content) {
            Ok(file) => file,
            Err(e) => return Ok(Loaded::Corrupted(e)),
        };

        if file.version != DATA_FILE_VERSION {
            tracing::warn!(
                "Data file version mismatch: expected {}, got {}. Attempting to load anyway.",
                DATA_FILE_VERSION,
                file.version
            );
        }

        Ok(Loaded::Parsed(file.data))
    }

    /// Write `data` to the file atomically
    async fn persist(&self, data: &Dataset) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(&DataFileRef {
            version: DATA_FILE_VERSION,
            data,
        })
        .map_err(|e| Error::store(format!("Failed to serialize data: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.sync_all().await.map_err(|e| {
                Error::store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Data written to file: {}", self.path.display());
        Ok(())
    }

    /// Apply `change` to a copy, persist it, then publish it
    async fn write_through<T>(
        &self,
        change: impl FnOnce(&mut Dataset) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let mut guard = self.data.write().await;
        let mut next = guard.clone();
        let value = change(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        Ok(value)
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl Store for FileStore {
    async fn active_resolvers(&self) -> Result<Vec<Resolver>, Error> {
        Ok(self.data.read().await.active_resolvers())
    }

    async fn get_target(&self, id: TargetId) -> Result<Option<Target>, Error> {
        Ok(self.data.read().await.targets.get(&id).cloned())
    }

    async fn list_targets(&self) -> Result<Vec<Target>, Error> {
        Ok(self.data.read().await.targets.values().cloned().collect())
    }

    async fn get_target_group(&self, id: TargetGroupId) -> Result<Option<TargetGroup>, Error> {
        Ok(self.data.read().await.target_groups.get(&id).cloned())
    }

    async fn commit_check(&self, commit: CheckCommit) -> Result<CommittedCheck, Error> {
        self.write_through(|data| data.commit_check(commit)).await
    }

    async fn check_results_since(
        &self,
        target_id: TargetId,
        since: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>, Error> {
        Ok(self.data.read().await.check_results_since(target_id, since))
    }

    async fn get_shortlink(&self, id: ShortlinkId) -> Result<Option<Shortlink>, Error> {
        Ok(self.data.read().await.shortlinks.get(&id).cloned())
    }

    async fn list_shortlinks(&self) -> Result<Vec<Shortlink>, Error> {
        Ok(self.data.read().await.shortlinks.values().cloned().collect())
    }

    async fn shortlink_targets(
        &self,
        shortlink_id: ShortlinkId,
    ) -> Result<Vec<ShortlinkTarget>, Error> {
        Ok(self.data.read().await.shortlink_targets(shortlink_id))
    }

    async fn get_rotation_group(
        &self,
        id: RotationGroupId,
    ) -> Result<Option<RotationGroup>, Error> {
        Ok(self.data.read().await.rotation_groups.get(&id).cloned())
    }

    async fn apply_rotation(&self, commit: RotationCommit) -> Result<RotationHistory, Error> {
        self.write_through(|data| data.apply_rotation(commit)).await
    }

    async fn rotation_history(
        &self,
        shortlink_id: ShortlinkId,
    ) -> Result<Vec<RotationHistory>, Error> {
        Ok(self.data.read().await.rotation_history(shortlink_id))
    }

    async fn set_shortlink_target_status(
        &self,
        id: ShortlinkTargetId,
        status: ProbeStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.write_through(|data| data.set_shortlink_target_status(id, status, checked_at))
            .await
    }

    async fn put_target(&self, target: Target) -> Result<(), Error> {
        self.write_through(|data| {
            data.targets.insert(target.id, target);
            Ok(())
        })
        .await
    }

    async fn put_target_group(&self, group: TargetGroup) -> Result<(), Error> {
        self.write_through(|data| {
            data.target_groups.insert(group.id, group);
            Ok(())
        })
        .await
    }

    async fn put_resolver(&self, resolver: Resolver) -> Result<(), Error> {
        self.write_through(|data| {
            data.resolvers.insert(resolver.id, resolver);
            Ok(())
        })
        .await
    }

    async fn put_shortlink(&self, shortlink: Shortlink) -> Result<(), Error> {
        self.write_through(|data| {
            data.shortlinks.insert(shortlink.id, shortlink);
            Ok(())
        })
        .await
    }

    async fn put_shortlink_target(&self, target: ShortlinkTarget) -> Result<(), Error> {
        self.write_through(|data| {
            data.shortlink_targets.insert(target.id, target);
            Ok(())
        })
        .await
    }

    async fn put_rotation_group(&self, group: RotationGroup) -> Result<(), Error> {
        self.write_through(|data| {
            data.rotation_groups.insert(group.id, group);
            Ok(())
        })
        .await
    }

    async fn flush(&self) -> Result<(), Error> {
        let guard = self.data.read().await;
        self.persist(&guard).await
    }
}

/// Factory for [`FileStore`], registered as `file`
#[derive(Debug, Default)]
pub struct FileStoreFactory;

#[async_trait]
impl StoreFactory for FileStoreFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Box<dyn Store>, Error> {
        match config {
            StoreConfig::File { path } => Ok(Box::new(FileStore::new(path).await?)),
            other => Err(Error::config(format!(
                "File store factory cannot create a '{}' store",
                other.type_name()
            ))),
        }
    }
}
