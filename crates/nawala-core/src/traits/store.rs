// # Store Trait
//
// Defines the storage contract for every row the engine reads or writes.
//
// ## Purpose
//
// The store is the single source of persisted truth:
// - Targets, target groups and resolvers (configuration, owned outside)
// - The append-only check result log
// - Shortlinks, their candidates, rotation groups and the rotation history
//
// Two writes are compound and must be atomic:
// - [`Store::commit_check`]: check results + target status/timestamps
// - [`Store::apply_rotation`]: shortlink pointer + history row
//
// A failed compound write must leave no partial state behind.
//
// ## Implementations
//
// - In-memory: [`MemoryStore`](crate::state::MemoryStore)
// - JSON file: [`FileStore`](crate::state::FileStore)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::StoreConfig;
use crate::model::{
    CheckResult, ProbeStatus, Resolver, RotationGroup, RotationGroupId, RotationHistory,
    RotationReason, Shortlink, ShortlinkId, ShortlinkTarget, ShortlinkTargetId, Target,
    TargetGroup, TargetGroupId, TargetId,
};

/// Status fields written when the fused status of a target changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    /// Status before the check
    pub from: ProbeStatus,
    /// Fused status of the check
    pub to: ProbeStatus,
    /// New consecutive failure counter
    pub consecutive_failures: u32,
}

/// Everything one completed check writes
#[derive(Debug, Clone)]
pub struct CheckCommit {
    /// Checked target
    pub target_id: TargetId,
    /// One row per completed resolver probe; `id` is assigned by the store
    pub results: Vec<CheckResult>,
    /// Present only when the fused status differs from the stored one
    pub transition: Option<StatusTransition>,
    /// Stamped into `last_checked_at` (and `last_status_change_at` on transition)
    pub checked_at: DateTime<Utc>,
}

/// Outcome of a committed check
#[derive(Debug, Clone)]
pub struct CommittedCheck {
    /// Target as stored after the commit
    pub target: Target,
    /// Stored results with their assigned ids
    pub results: Vec<CheckResult>,
}

/// A compare-and-set move of a shortlink's current target
///
/// The store applies it only if the shortlink still has
/// `expected_current` / `expected_last_rotated_at`; otherwise it fails with
/// [`Error::Conflict`](crate::Error::Conflict) and writes nothing.
#[derive(Debug, Clone)]
pub struct RotationCommit {
    /// Rotated shortlink
    pub shortlink_id: ShortlinkId,
    /// Current target observed by the caller
    pub expected_current: Option<ShortlinkTargetId>,
    /// `last_rotated_at` observed by the caller
    pub expected_last_rotated_at: Option<DateTime<Utc>>,
    /// New current target; must belong to the shortlink
    pub to_target_id: ShortlinkTargetId,
    /// Recorded reason
    pub reason: RotationReason,
    /// Recorded actor
    pub actor: Option<String>,
    /// Stamped into `last_rotated_at` and the history row
    pub at: DateTime<Utc>,
    /// Whether `rotation_count` is incremented (false for rollbacks)
    pub increment_count: bool,
}

/// Trait for store implementations
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - Perform I/O for persistent storage
/// - Serialize conflicting writes to the same row
/// - Cache rows in memory (with explicit flush)
///
/// ## Forbidden Capabilities
/// - Decide statuses or rotations (owned by `CheckEngine` / `RotationService`)
/// - Spawn background tasks
#[async_trait]
pub trait Store: Send + Sync {
    // ---- probe side -------------------------------------------------------

    /// Active resolvers ordered by priority ascending, then weight descending
    async fn active_resolvers(&self) -> Result<Vec<Resolver>, crate::Error>;

    /// Get a target by id (soft-deleted targets included)
    async fn get_target(&self, id: TargetId) -> Result<Option<Target>, crate::Error>;

    /// All targets, soft-deleted ones included, ordered by id
    async fn list_targets(&self) -> Result<Vec<Target>, crate::Error>;

    /// Get a target group by id
    async fn get_target_group(
        &self,
        id: TargetGroupId,
    ) -> Result<Option<TargetGroup>, crate::Error>;

    /// Atomically append check results and update the target's status fields
    ///
    /// # Returns
    ///
    /// - `Ok(CommittedCheck)`: everything written
    /// - `Err(Error::NotFound)`: unknown target, nothing written
    /// - `Err(Error)`: storage failure, nothing written
    async fn commit_check(&self, commit: CheckCommit) -> Result<CommittedCheck, crate::Error>;

    /// Check results of a target with `checked_at >= since`, oldest first
    async fn check_results_since(
        &self,
        target_id: TargetId,
        since: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>, crate::Error>;

    // ---- rotation side ----------------------------------------------------

    /// Get a shortlink by id
    async fn get_shortlink(&self, id: ShortlinkId) -> Result<Option<Shortlink>, crate::Error>;

    /// All shortlinks ordered by id
    async fn list_shortlinks(&self) -> Result<Vec<Shortlink>, crate::Error>;

    /// Candidates of a shortlink ordered by id
    async fn shortlink_targets(
        &self,
        shortlink_id: ShortlinkId,
    ) -> Result<Vec<ShortlinkTarget>, crate::Error>;

    /// Get a rotation group by id
    async fn get_rotation_group(
        &self,
        id: RotationGroupId,
    ) -> Result<Option<RotationGroup>, crate::Error>;

    /// Atomically move a shortlink and append the matching history row
    ///
    /// # Returns
    ///
    /// - `Ok(RotationHistory)`: the appended row
    /// - `Err(Error::Conflict)`: the shortlink changed since it was read
    /// - `Err(Error::NotFound)` / `Err(Error::InvalidInput)`: unknown shortlink
    ///   or a target that does not belong to it
    async fn apply_rotation(&self, commit: RotationCommit)
    -> Result<RotationHistory, crate::Error>;

    /// Rotation history of a shortlink, oldest first
    async fn rotation_history(
        &self,
        shortlink_id: ShortlinkId,
    ) -> Result<Vec<RotationHistory>, crate::Error>;

    /// Record the last probed status of a candidate
    async fn set_shortlink_target_status(
        &self,
        id: ShortlinkTargetId,
        status: ProbeStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), crate::Error>;

    // ---- configuration writes ---------------------------------------------

    /// Insert or replace a target
    async fn put_target(&self, target: Target) -> Result<(), crate::Error>;

    /// Insert or replace a target group
    async fn put_target_group(&self, group: TargetGroup) -> Result<(), crate::Error>;

    /// Insert or replace a resolver
    async fn put_resolver(&self, resolver: Resolver) -> Result<(), crate::Error>;

    /// Insert or replace a shortlink
    async fn put_shortlink(&self, shortlink: Shortlink) -> Result<(), crate::Error>;

    /// Insert or replace a shortlink candidate
    async fn put_shortlink_target(&self, target: ShortlinkTarget) -> Result<(), crate::Error>;

    /// Insert or replace a rotation group
    async fn put_rotation_group(&self, group: RotationGroup) -> Result<(), crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing stores from configuration
///
/// Creation is async: persistent stores load their data up front.
#[async_trait]
pub trait StoreFactory: Send + Sync {
    /// Create a Store instance from configuration
    async fn create(&self, config: &StoreConfig) -> Result<Box<dyn Store>, crate::Error>;
}
