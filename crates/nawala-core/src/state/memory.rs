// # Memory Store
//
// In-memory implementation of Store.
//
// ## Purpose
//
// Provides a simple, fast store that doesn't persist across restarts.
// Useful for testing, one-shot checks, or embedding the engine next to a
// storage layer that seeds it on every run.
//
// ## Crash Behavior
//
// - All rows are lost on restart/crash
// - Targets start again from `UNKNOWN`, so the first check after a restart
//   always records a status change

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
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

/// In-memory store implementation
///
/// All tables live in one [`Dataset`] behind a RwLock; compound writes take
/// the write lock once, so readers never observe half of one.
///
/// # Example
///
/// ```rust,no_run
/// use nawala_core::state::MemoryStore;
/// use nawala_core::model::Target;
/// use nawala_core::traits::Store;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryStore::new();
///     store.put_target(Target::new(1, "example.com")).await?;
///
///     let target = store.get_target(1).await?;
///     assert!(target.is_some());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Dataset>>,
}

impl MemoryStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `dataset`
    pub fn with_dataset(dataset: Dataset) -> Self {
        Self {
            inner: Arc::new(RwLock::new(dataset)),
        }
    }

    /// Copy of every row
    pub async fn snapshot(&self) -> Dataset {
        self.inner.read().await.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn active_resolvers(&self) -> Result<Vec<Resolver>, Error> {
        Ok(self.inner.read().await.active_resolvers())
    }

    async fn get_target(&self, id: TargetId) -> Result<Option<Target>, Error> {
        Ok(self.inner.read().await.targets.get(&id).cloned())
    }

    async fn list_targets(&self) -> Result<Vec<Target>, Error> {
        Ok(self.inner.read().await.targets.values().cloned().collect())
    }

    async fn get_target_group(&self, id: TargetGroupId) -> Result<Option<TargetGroup>, Error> {
        Ok(self.inner.read().await.target_groups.get(&id).cloned())
    }

    async fn commit_check(&self, commit: CheckCommit) -> Result<CommittedCheck, Error> {
        self.inner.write().await.commit_check(commit)
    }

    async fn check_results_since(
        &self,
        target_id: TargetId,
        since: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>, Error> {
        Ok(self.inner.read().await.check_results_since(target_id, since))
    }

    async fn get_shortlink(&self, id: ShortlinkId) -> Result<Option<Shortlink>, Error> {
        Ok(self.inner.read().await.shortlinks.get(&id).cloned())
    }

    async fn list_shortlinks(&self) -> Result<Vec<Shortlink>, Error> {
        Ok(self.inner.read().await.shortlinks.values().cloned().collect())
    }

    async fn shortlink_targets(
        &self,
        shortlink_id: ShortlinkId,
    ) -> Result<Vec<ShortlinkTarget>, Error> {
        Ok(self.inner.read().await.shortlink_targets(shortlink_id))
    }

    async fn get_rotation_group(
        &self,
        id: RotationGroupId,
    ) -> Result<Option<RotationGroup>, Error> {
        Ok(self.inner.read().await.rotation_groups.get(&id).cloned())
    }

    async fn apply_rotation(&self, commit: RotationCommit) -> Result<RotationHistory, Error> {
        self.inner.write().await.apply_rotation(commit)
    }

    async fn rotation_history(
        &self,
        shortlink_id: ShortlinkId,
    ) -> Result<Vec<RotationHistory>, Error> {
        Ok(self.inner.read().await.rotation_history(shortlink_id))
    }

    async fn set_shortlink_target_status(
        &self,
        id: ShortlinkTargetId,
        status: ProbeStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.inner
            .write()
            .await
            .set_shortlink_target_status(id, status, checked_at)
    }

    async fn put_target(&self, target: Target) -> Result<(), Error> {
        self.inner.write().await.targets.insert(target.id, target);
        Ok(())
    }

    async fn put_target_group(&self, group: TargetGroup) -> Result<(), Error> {
        self.inner.write().await.target_groups.insert(group.id, group);
        Ok(())
    }

    async fn put_resolver(&self, resolver: Resolver) -> Result<(), Error> {
        self.inner.write().await.resolvers.insert(resolver.id, resolver);
        Ok(())
    }

    async fn put_shortlink(&self, shortlink: Shortlink) -> Result<(), Error> {
        self.inner.write().await.shortlinks.insert(shortlink.id, shortlink);
        Ok(())
    }

    async fn put_shortlink_target(&self, target: ShortlinkTarget) -> Result<(), Error> {
        self.inner
            .write()
            .await
            .shortlink_targets
            .insert(target.id, target);
        Ok(())
    }

    async fn put_rotation_group(&self, group: RotationGroup) -> Result<(), Error> {
        self.inner.write().await.rotation_groups.insert(group.id, group);
        Ok(())
    }

    async fn flush(&self) -> Result<(), Error> {
        // No-op for memory store (everything is already "persisted")
        Ok(())
    }
}

/// Factory for [`MemoryStore`], registered as `memory`
#[derive(Debug, Default)]
pub struct MemoryStoreFactory;

#[async_trait]
impl StoreFactory for MemoryStoreFactory {
    async fn create(&self, config: &StoreConfig) -> Result<Box<dyn Store>, Error> {
        match config {
            StoreConfig::Memory => Ok(Box::new(MemoryStore::new())),
            other => Err(Error::config(format!(
                "Memory store factory cannot create a '{}' store",
                other.type_name()
            ))),
        }
    }
}
