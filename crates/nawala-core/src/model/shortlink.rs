// # Shortlinks
//
// A shortlink is a stable slug routed to one of its own candidate targets.
// `current_target_id` / `original_target_id` / `last_rotated_at` /
// `rotation_count` are written only through `Store::apply_rotation`, which
// appends the matching `RotationHistory` row in the same unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ProbeStatus;

/// Shortlink identifier
pub type ShortlinkId = u64;

/// Shortlink candidate identifier
pub type ShortlinkTargetId = u64;

/// Rotation group identifier
pub type RotationGroupId = u64;

/// Rotation history identifier
pub type RotationHistoryId = u64;

/// A stable public identifier routing to one of several candidate URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shortlink {
    /// Identity
    pub id: ShortlinkId,
    /// Public slug
    pub slug: String,
    /// Rotation policy, if any
    #[serde(default)]
    pub group_id: Option<RotationGroupId>,
    /// Candidate currently served
    #[serde(default)]
    pub current_target_id: Option<ShortlinkTargetId>,
    /// Failover anchor used by rollback
    #[serde(default)]
    pub original_target_id: Option<ShortlinkTargetId>,
    /// Whether the sweep considers this shortlink
    #[serde(default = "default_true")]
    pub active: bool,
    /// When the shortlink last rotated or rolled back
    #[serde(default)]
    pub last_rotated_at: Option<DateTime<Utc>>,
    /// Number of rotations (rollbacks excluded)
    #[serde(default)]
    pub rotation_count: u32,
}

impl Shortlink {
    /// Create an active shortlink with no targets attached
    pub fn new(id: ShortlinkId, slug: impl Into<String>) -> Self {
        Self {
            id,
            slug: slug.into(),
            group_id: None,
            current_target_id: None,
            original_target_id: None,
            active: true,
            last_rotated_at: None,
            rotation_count: 0,
        }
    }

    /// Set the rotation group
    pub fn with_group(mut self, group_id: RotationGroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Point both current and original at the same candidate
    pub fn with_target(mut self, target_id: ShortlinkTargetId) -> Self {
        self.current_target_id = Some(target_id);
        self.original_target_id = Some(target_id);
        self
    }
}

/// One candidate destination URL of a shortlink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortlinkTarget {
    /// Identity
    pub id: ShortlinkTargetId,
    /// Owning shortlink
    pub shortlink_id: ShortlinkId,
    /// Destination URL
    pub url: String,
    /// Lower is preferred
    #[serde(default = "default_rank")]
    pub priority: u32,
    /// Higher is preferred among equal priorities
    #[serde(default = "default_rank")]
    pub weight: u32,
    /// Whether the candidate may be selected
    #[serde(default = "default_true")]
    pub active: bool,
    /// Last fused status of the URL
    #[serde(default)]
    pub last_known_status: ProbeStatus,
    /// When the URL was last probed
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
}

impl ShortlinkTarget {
    /// Create an active candidate with unknown status
    pub fn new(id: ShortlinkTargetId, shortlink_id: ShortlinkId, url: impl Into<String>) -> Self {
        Self {
            id,
            shortlink_id,
            url: url.into(),
            priority: default_rank(),
            weight: default_rank(),
            active: true,
            last_known_status: ProbeStatus::Unknown,
            last_checked_at: None,
        }
    }

    /// Set priority and weight
    pub fn with_rank(mut self, priority: u32, weight: u32) -> Self {
        self.priority = priority;
        self.weight = weight;
        self
    }

    /// Set the last known status
    pub fn with_status(mut self, status: ProbeStatus) -> Self {
        self.last_known_status = status;
        self
    }

    /// Activate or deactivate the candidate
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Rotation policy shared by reference across shortlinks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationGroup {
    /// Identity
    pub id: RotationGroupId,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Minimum seconds between two rotations of one shortlink
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
    /// Informational; rotation triggers on "current target not OK"
    #[serde(default = "default_rotation_threshold")]
    pub rotation_threshold: u32,
    /// Return to the original target once it recovers
    #[serde(default = "default_true")]
    pub auto_rollback: bool,
}

impl RotationGroup {
    /// Create a group with the given cooldown and default threshold
    pub fn new(id: RotationGroupId, cooldown_seconds: u64) -> Self {
        Self {
            id,
            name: String::new(),
            cooldown_seconds,
            rotation_threshold: default_rotation_threshold(),
            auto_rollback: true,
        }
    }

    /// Enable or disable auto-rollback
    pub fn with_auto_rollback(mut self, auto_rollback: bool) -> Self {
        self.auto_rollback = auto_rollback;
        self
    }
}

/// Why a rotation happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationReason {
    /// Operator-requested
    Manual,
    /// Triggered by the auto-rotation sweep
    AutoRotation,
    /// Return to the original target
    Rollback,
}

impl RotationReason {
    /// Wire name of the reason
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationReason::Manual => "manual",
            RotationReason::AutoRotation => "auto_rotation",
            RotationReason::Rollback => "rollback",
        }
    }
}

impl fmt::Display for RotationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record of one transition; append-only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationHistory {
    /// Identity (assigned by the store)
    pub id: RotationHistoryId,
    /// Rotated shortlink
    pub shortlink_id: ShortlinkId,
    /// Candidate served before
    pub from_target_id: Option<ShortlinkTargetId>,
    /// Candidate served after
    pub to_target_id: ShortlinkTargetId,
    /// Why
    pub reason: RotationReason,
    /// Who triggered it (none for the sweep)
    pub actor: Option<String>,
    /// When
    pub rotated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

fn default_rank() -> u32 {
    100
}

fn default_cooldown_seconds() -> u64 {
    300
}

fn default_rotation_threshold() -> u32 {
    3
}
