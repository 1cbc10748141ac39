//! Shortlink rotation state machine
//!
//! Per shortlink the state is `(current_target_id, original_target_id,
//! last_rotated_at)`. Transitions:
//!
//! - `rotate`: current -> best healthy candidate, rate-limited by the group
//!   cooldown, `rotation_count + 1`
//! - `rollback`: current -> original, exempt from cooldown, count unchanged
//!
//! Every transition is one [`Store::apply_rotation`] call, so the pointer
//! move and its history row land together. Concurrent transitions of one
//! shortlink are serialized by a per-shortlink lock in this process and by
//! the store's compare-and-set across processes; the loser reports `false`.
//!
//! Expected negative outcomes (cooldown, no candidate, no original, lost
//! race) are `Ok(false)`. Storage failures are `Err`.

pub mod policy;

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::events::{EngineEvent, EventSink};
use crate::locks::KeyedLocks;
use crate::model::{
    RotationGroup, RotationReason, Shortlink, ShortlinkId, ShortlinkTarget, ShortlinkTargetId,
};
use crate::traits::{RotationCommit, Store};
use crate::{Error, Result};

/// Rotation state machine and sweeps
#[derive(Clone)]
pub struct RotationService {
    store: Arc<dyn Store>,
    events: EventSink,
    shortlink_locks: Arc<KeyedLocks<ShortlinkId>>,
    sweep_guard: Arc<Mutex<()>>,
}

/// A shortlink with its policy and candidates, loaded together
struct Loaded {
    shortlink: Shortlink,
    group: Option<RotationGroup>,
    candidates: Vec<ShortlinkTarget>,
}

impl RotationService {
    /// Create a rotation service over `store`
    pub fn new(store: Arc<dyn Store>, events: EventSink) -> Self {
        Self {
            store,
            events,
            shortlink_locks: Arc::new(KeyedLocks::new()),
            sweep_guard: Arc::new(Mutex::new(())),
        }
    }

    /// Rotate a shortlink to its best healthy candidate
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: rotated and recorded
    /// - `Ok(false)`: in cooldown, no eligible candidate, or a concurrent
    ///   writer moved the shortlink first
    /// - `Err(Error::NotFound)`: unknown shortlink
    /// - `Err(Error)`: storage failure
    pub async fn rotate(
        &self,
        shortlink_id: ShortlinkId,
        actor: Option<&str>,
        reason: RotationReason,
    ) -> Result<bool> {
        let _guard = self.shortlink_locks.lock(shortlink_id).await;
        let loaded = self.load(shortlink_id).await?;
        let now = Utc::now();

        if policy::in_cooldown(&loaded.shortlink, loaded.group.as_ref(), now) {
            info!("Shortlink {} rotation skipped due to cooldown", shortlink_id);
            return Ok(false);
        }

        let Some(next) =
            policy::select_candidate(&loaded.candidates, loaded.shortlink.current_target_id)
        else {
            warn!("No available target for rotation of shortlink {}", shortlink_id);
            return Ok(false);
        };

        self.commit(&loaded.shortlink, next.id, reason, actor, true)
            .await
    }

    /// Return a shortlink to its original target, ignoring cooldown
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: rolled back and recorded
    /// - `Ok(false)`: no original target, or a concurrent writer moved the
    ///   shortlink first
    pub async fn rollback(&self, shortlink_id: ShortlinkId, actor: Option<&str>) -> Result<bool> {
        let _guard = self.shortlink_locks.lock(shortlink_id).await;
        let shortlink = self
            .store
            .get_shortlink(shortlink_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Shortlink {}", shortlink_id)))?;

        let Some(original) = shortlink.original_target_id else {
            debug!("Shortlink {} has no original target", shortlink_id);
            return Ok(false);
        };

        self.commit(&shortlink, original, RotationReason::Rollback, actor, false)
            .await
    }

    /// Whether the sweep would rotate this shortlink now (no side effects)
    pub async fn should_rotate(&self, shortlink_id: ShortlinkId) -> Result<bool> {
        let loaded = self.load(shortlink_id).await?;
        Ok(policy::should_rotate(
            &loaded.shortlink,
            loaded.group.as_ref(),
            &loaded.candidates,
            Utc::now(),
        ))
    }

    /// Rotate every active shortlink whose current target is failing
    ///
    /// One shortlink's failure is logged and the sweep moves on. Returns the
    /// number of shortlinks rotated.
    ///
    /// # Errors
    ///
    /// - `Error::SweepInProgress` if another sweep is running in this process
    /// - listing the shortlinks failed
    pub async fn auto_rotate_all(&self) -> Result<usize> {
        let _sweep = self
            .sweep_guard
            .try_lock()
            .map_err(|_| Error::SweepInProgress)?;

        let shortlinks = self.store.list_shortlinks().await?;
        let mut examined = 0;
        let mut rotated = 0;

        for shortlink in shortlinks.into_iter().filter(|s| s.active) {
            examined += 1;
            match self.sweep_rotate_one(shortlink.id).await {
                Ok(true) => rotated += 1,
                Ok(false) => {}
                Err(e) => warn!("Auto-rotation of shortlink {} failed: {}", shortlink.id, e),
            }
        }

        info!(
            "Auto-rotation sweep finished: {} of {} shortlinks rotated",
            rotated, examined
        );
        self.events.emit(EngineEvent::SweepCompleted {
            reason: RotationReason::AutoRotation,
            examined,
            rotated,
        });
        Ok(rotated)
    }

    /// Roll back every active shortlink whose original target recovered
    ///
    /// Applies only to shortlinks whose group has `auto_rollback` set and
    /// whose cooldown has elapsed. Returns the number rolled back.
    pub async fn auto_rollback_all(&self) -> Result<usize> {
        let _sweep = self
            .sweep_guard
            .try_lock()
            .map_err(|_| Error::SweepInProgress)?;

        let shortlinks = self.store.list_shortlinks().await?;
        let mut examined = 0;
        let mut rolled_back = 0;

        for shortlink in shortlinks.into_iter().filter(|s| s.active) {
            examined += 1;
            match self.sweep_rollback_one(shortlink.id).await {
                Ok(true) => rolled_back += 1,
                Ok(false) => {}
                Err(e) => warn!("Auto-rollback of shortlink {} failed: {}", shortlink.id, e),
            }
        }

        info!(
            "Auto-rollback sweep finished: {} of {} shortlinks rolled back",
            rolled_back, examined
        );
        self.events.emit(EngineEvent::SweepCompleted {
            reason: RotationReason::Rollback,
            examined,
            rotated: rolled_back,
        });
        Ok(rolled_back)
    }

    async fn sweep_rotate_one(&self, shortlink_id: ShortlinkId) -> Result<bool> {
        if !self.should_rotate(shortlink_id).await? {
            return Ok(false);
        }
        self.rotate(shortlink_id, None, RotationReason::AutoRotation)
            .await
    }

    async fn sweep_rollback_one(&self, shortlink_id: ShortlinkId) -> Result<bool> {
        let _guard = self.shortlink_locks.lock(shortlink_id).await;
        let loaded = self.load(shortlink_id).await?;

        if !policy::should_roll_back(
            &loaded.shortlink,
            loaded.group.as_ref(),
            &loaded.candidates,
            Utc::now(),
        ) {
            return Ok(false);
        }

        let Some(original) = loaded.shortlink.original_target_id else {
            return Ok(false);
        };
        self.commit(&loaded.shortlink, original, RotationReason::Rollback, None, false)
            .await
    }

    async fn load(&self, shortlink_id: ShortlinkId) -> Result<Loaded> {
        let shortlink = self
            .store
            .get_shortlink(shortlink_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Shortlink {}", shortlink_id)))?;

        let group = match shortlink.group_id {
            Some(group_id) => {
                let group = self.store.get_rotation_group(group_id).await?;
                if group.is_none() {
                    warn!(
                        "Shortlink {} references missing rotation group {}",
                        shortlink_id, group_id
                    );
                }
                group
            }
            None => None,
        };

        let candidates = self.store.shortlink_targets(shortlink_id).await?;

        Ok(Loaded {
            shortlink,
            group,
            candidates,
        })
    }

    /// Apply one transition; a lost compare-and-set race is `Ok(false)`
    async fn commit(
        &self,
        shortlink: &Shortlink,
        to_target_id: ShortlinkTargetId,
        reason: RotationReason,
        actor: Option<&str>,
        increment_count: bool,
    ) -> Result<bool> {
        let commit = RotationCommit {
            shortlink_id: shortlink.id,
            expected_current: shortlink.current_target_id,
            expected_last_rotated_at: shortlink.last_rotated_at,
            to_target_id,
            reason,
            actor: actor.map(str::to_string),
            at: Utc::now(),
            increment_count,
        };

        match self.store.apply_rotation(commit).await {
            Ok(history) => {
                info!(
                    shortlink_id = shortlink.id,
                    from = ?history.from_target_id,
                    to = history.to_target_id,
                    reason = %reason,
                    "Shortlink rotated"
                );
                self.events.emit(EngineEvent::Rotated {
                    shortlink_id: shortlink.id,
                    from_target_id: history.from_target_id,
                    to_target_id: history.to_target_id,
                    reason,
                });
                Ok(true)
            }
            Err(e) if e.is_conflict() => {
                info!("Shortlink {} changed concurrently: {}", shortlink.id, e);
                Ok(false)
            }
            Err(e) => {
                error!("Failed to record rotation of shortlink {}: {}", shortlink.id, e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProbeStatus;
    use crate::state::MemoryStore;

    async fn fixture() -> (RotationService, MemoryStore) {
        let store = MemoryStore::new();
        store.put_rotation_group(RotationGroup::new(1, 300)).await.unwrap();
        store
            .put_shortlink(Shortlink::new(1, "promo").with_group(1).with_target(10))
            .await
            .unwrap();
        for (id, priority, status) in [
            (10, 1, ProbeStatus::DnsFiltered),
            (11, 10, ProbeStatus::Ok),
            (12, 5, ProbeStatus::Ok),
        ] {
            store
                .put_shortlink_target(
                    ShortlinkTarget::new(id, 1, format!("https://{}.example", id))
                        .with_rank(priority, 100)
                        .with_status(status),
                )
                .await
                .unwrap();
        }
        let service = RotationService::new(Arc::new(store.clone()), EventSink::disabled());
        (service, store)
    }

    #[tokio::test]
    async fn test_rotate_then_cooldown() {
        let (service, store) = fixture().await;

        assert!(service.rotate(1, Some("ops"), RotationReason::Manual).await.unwrap());
        let shortlink = store.get_shortlink(1).await.unwrap().unwrap();
        assert_eq!(shortlink.current_target_id, Some(12));
        assert_eq!(shortlink.rotation_count, 1);

        // Second rotation inside the cooldown window
        assert!(!service.rotate(1, None, RotationReason::Manual).await.unwrap());
        assert_eq!(store.rotation_history(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_ignores_cooldown() {
        let (service, store) = fixture().await;
        assert!(service.rotate(1, None, RotationReason::Manual).await.unwrap());

        assert!(service.rollback(1, Some("ops")).await.unwrap());
        let shortlink = store.get_shortlink(1).await.unwrap().unwrap();
        assert_eq!(shortlink.current_target_id, Some(10));
        assert_eq!(shortlink.rotation_count, 1);

        let history = store.rotation_history(1).await.unwrap();
        assert_eq!(history.last().map(|h| h.reason), Some(RotationReason::Rollback));
        assert_eq!(history.last().and_then(|h| h.actor.clone()), Some("ops".to_string()));
    }

    #[tokio::test]
    async fn test_rollback_without_original_fails() {
        let (service, store) = fixture().await;
        store.put_shortlink(Shortlink::new(2, "bare")).await.unwrap();
        assert!(!service.rollback(2, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_shortlink_is_not_found() {
        let (service, _store) = fixture().await;
        let err = service.rotate(99, None, RotationReason::Manual).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_sweep_guard_rejects_overlap() {
        let (service, _store) = fixture().await;
        let _held = service.sweep_guard.try_lock().unwrap();
        assert!(matches!(
            service.auto_rotate_all().await,
            Err(Error::SweepInProgress)
        ));
    }
}
