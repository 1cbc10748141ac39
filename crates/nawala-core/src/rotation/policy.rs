// # Rotation Policy
//
// Pure decisions over already-loaded rows. `RotationService` loads, decides
// here, then commits through the store.

use chrono::{DateTime, Duration, Utc};
use std::cmp::Reverse;

use crate::model::{ProbeStatus, RotationGroup, Shortlink, ShortlinkTarget, ShortlinkTargetId};

/// Cooldowns are capped at roughly a century
const MAX_COOLDOWN_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Whether the shortlink rotated too recently to rotate again
///
/// A shortlink without a group, or one that never rotated, is never in
/// cooldown.
pub fn in_cooldown(
    shortlink: &Shortlink,
    group: Option<&RotationGroup>,
    now: DateTime<Utc>,
) -> bool {
    let (Some(group), Some(last_rotated_at)) = (group, shortlink.last_rotated_at) else {
        return false;
    };
    let cooldown = Duration::seconds(group.cooldown_seconds.min(MAX_COOLDOWN_SECS) as i64);
    match last_rotated_at.checked_add_signed(cooldown) {
        Some(until) => now < until,
        None => true,
    }
}

/// Best eligible candidate other than `current`
///
/// Eligible: active and last known `OK`. Order: priority ascending, weight
/// descending, then id for a stable pick.
pub fn select_candidate(
    candidates: &[ShortlinkTarget],
    current: Option<ShortlinkTargetId>,
) -> Option<&ShortlinkTarget> {
    candidates
        .iter()
        .filter(|t| Some(t.id) != current)
        .filter(|t| t.active && t.last_known_status == ProbeStatus::Ok)
        .min_by_key(|t| (t.priority, Reverse(t.weight), t.id))
}

/// Whether the sweep should rotate this shortlink now
pub fn should_rotate(
    shortlink: &Shortlink,
    group: Option<&RotationGroup>,
    candidates: &[ShortlinkTarget],
    now: DateTime<Utc>,
) -> bool {
    if group.is_none() {
        return false;
    }
    let Some(current_id) = shortlink.current_target_id else {
        return false;
    };

    // A current id with no candidate row is not a failing target
    let Some(current) = candidates.iter().find(|t| t.id == current_id) else {
        return false;
    };
    if current.last_known_status == ProbeStatus::Ok {
        return false;
    }

    !in_cooldown(shortlink, group, now) && select_candidate(candidates, Some(current_id)).is_some()
}

/// Whether the auto-rollback sweep should return this shortlink to its original
pub fn should_roll_back(
    shortlink: &Shortlink,
    group: Option<&RotationGroup>,
    candidates: &[ShortlinkTarget],
    now: DateTime<Utc>,
) -> bool {
    let Some(group) = group else {
        return false;
    };
    if !group.auto_rollback {
        return false;
    }
    let Some(original_id) = shortlink.original_target_id else {
        return false;
    };
    if shortlink.current_target_id == Some(original_id) {
        return false;
    }

    let original_ok = candidates
        .iter()
        .find(|t| t.id == original_id)
        .is_some_and(|t| t.active && t.last_known_status == ProbeStatus::Ok);

    original_ok && !in_cooldown(shortlink, Some(group), now)
}
