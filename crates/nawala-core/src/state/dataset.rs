// # Dataset
//
// The table set shared by the memory and file stores. Every compound write
// validates before it mutates, so an `Err` leaves the dataset untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::model::{
    CheckResult, CheckResultId, ProbeStatus, Resolver, ResolverId, RotationGroup,
    RotationGroupId, RotationHistory, RotationHistoryId, Shortlink, ShortlinkId, ShortlinkTarget,
    ShortlinkTargetId, Target, TargetGroup, TargetGroupId, TargetId,
};
use crate::traits::{CheckCommit, CommittedCheck, RotationCommit};
use crate::{Error, Result};

/// All persisted rows
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub targets: BTreeMap<TargetId, Target>,
    pub target_groups: BTreeMap<TargetGroupId, TargetGroup>,
    pub resolvers: BTreeMap<ResolverId, Resolver>,
    pub check_results: Vec<CheckResult>,
    pub shortlinks: BTreeMap<ShortlinkId, Shortlink>,
    pub shortlink_targets: BTreeMap<ShortlinkTargetId, ShortlinkTarget>,
    pub rotation_groups: BTreeMap<RotationGroupId, RotationGroup>,
    pub rotation_history: Vec<RotationHistory>,
    last_check_result_id: CheckResultId,
    last_rotation_history_id: RotationHistoryId,
}

impl Dataset {
    pub fn active_resolvers(&self) -> Vec<Resolver> {
        let mut resolvers: Vec<Resolver> = self
            .resolvers
            .values()
            .filter(|r| r.active)
            .cloned()
            .collect();
        resolvers.sort_by_key(|r| (r.priority, Reverse(r.weight), r.id));
        resolvers
    }

    pub fn commit_check(&mut self, commit: CheckCommit) -> Result<CommittedCheck> {
        let target = self
            .targets
            .get_mut(&commit.target_id)
            .ok_or_else(|| Error::not_found(format!("Target {}", commit.target_id)))?;

        if let Some(transition) = &commit.transition {
            if target.current_status != transition.from {
                return Err(Error::conflict(format!(
                    "Target {} status is {}, expected {}",
                    target.id, target.current_status, transition.from
                )));
            }
            target.current_status = transition.to;
            target.consecutive_failures = transition.consecutive_failures;
            target.last_status_change_at = Some(commit.checked_at);
        }
        target.last_checked_at = Some(commit.checked_at);
        let target = target.clone();

        let mut results = Vec::with_capacity(commit.results.len());
        for mut result in commit.results {
            self.last_check_result_id += 1;
            result.id = self.last_check_result_id;
            result.target_id = commit.target_id;
            self.check_results.push(result.clone());
            results.push(result);
        }

        Ok(CommittedCheck { target, results })
    }

    pub fn check_results_since(
        &self,
        target_id: TargetId,
        since: DateTime<Utc>,
    ) -> Vec<CheckResult> {
        self.check_results
            .iter()
            .filter(|r| r.target_id == target_id && r.checked_at >= since)
            .cloned()
            .collect()
    }

    pub fn shortlink_targets(&self, shortlink_id: ShortlinkId) -> Vec<ShortlinkTarget> {
        self.shortlink_targets
            .values()
            .filter(|t| t.shortlink_id == shortlink_id)
            .cloned()
            .collect()
    }

    pub fn apply_rotation(&mut self, commit: RotationCommit) -> Result<RotationHistory> {
        let belongs = self
            .shortlink_targets
            .get(&commit.to_target_id)
            .is_some_and(|t| t.shortlink_id == commit.shortlink_id);

        let shortlink = self
            .shortlinks
            .get_mut(&commit.shortlink_id)
            .ok_or_else(|| Error::not_found(format!("Shortlink {}", commit.shortlink_id)))?;

        if !belongs {
            return Err(Error::invalid_input(format!(
                "Target {} does not belong to shortlink {}",
                commit.to_target_id, commit.shortlink_id
            )));
        }
        if shortlink.current_target_id != commit.expected_current
            || shortlink.last_rotated_at != commit.expected_last_rotated_at
        {
            return Err(Error::conflict(format!(
                "Shortlink {} changed concurrently",
                commit.shortlink_id
            )));
        }

        let from_target_id = shortlink.current_target_id;
        shortlink.current_target_id = Some(commit.to_target_id);
        shortlink.last_rotated_at = Some(commit.at);
        if commit.increment_count {
            shortlink.rotation_count = shortlink.rotation_count.saturating_add(1);
        }

        self.last_rotation_history_id += 1;
        let history = RotationHistory {
            id: self.last_rotation_history_id,
            shortlink_id: commit.shortlink_id,
            from_target_id,
            to_target_id: commit.to_target_id,
            reason: commit.reason,
            actor: commit.actor,
            rotated_at: commit.at,
        };
        self.rotation_history.push(history.clone());

        Ok(history)
    }

    pub fn rotation_history(&self, shortlink_id: ShortlinkId) -> Vec<RotationHistory> {
        self.rotation_history
            .iter()
            .filter(|h| h.shortlink_id == shortlink_id)
            .cloned()
            .collect()
    }

    pub fn set_shortlink_target_status(
        &mut self,
        id: ShortlinkTargetId,
        status: ProbeStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        let target = self
            .shortlink_targets
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(format!("Shortlink target {}", id)))?;
        target.last_known_status = status;
        target.last_checked_at = Some(checked_at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ResolverKind, RotationReason};
    use crate::traits::StatusTransition;

    fn rotation(
        expected_current: Option<ShortlinkTargetId>,
        to: ShortlinkTargetId,
    ) -> RotationCommit {
        RotationCommit {
            shortlink_id: 1,
            expected_current,
            expected_last_rotated_at: None,
            to_target_id: to,
            reason: RotationReason::Manual,
            actor: Some("ops".to_string()),
            at: Utc::now(),
            increment_count: true,
        }
    }

    fn shortlink_dataset() -> Dataset {
        let mut data = Dataset::default();
        data.shortlinks.insert(1, Shortlink::new(1, "promo").with_target(10));
        data.shortlink_targets.insert(10, ShortlinkTarget::new(10, 1, "https://a.example"));
        data.shortlink_targets.insert(11, ShortlinkTarget::new(11, 1, "https://b.example"));
        data.shortlink_targets.insert(20, ShortlinkTarget::new(20, 2, "https://other.example"));
        data
    }

    #[test]
    fn test_active_resolver_order() {
        let mut data = Dataset::default();
        for resolver in [
            Resolver::new(1, ResolverKind::Dns, "8.8.8.8").with_rank(10, 1),
            Resolver::new(2, ResolverKind::Dns, "1.1.1.1").with_rank(5, 1),
            Resolver::new(3, ResolverKind::Doh, "https://dns.google/resolve").with_rank(10, 50),
            Resolver::new(4, ResolverKind::Dns, "9.9.9.9").with_active(false),
        ] {
            data.resolvers.insert(resolver.id, resolver);
        }

        let ids: Vec<_> = data.active_resolvers().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_commit_check_assigns_ids_and_stamps() {
        let mut data = Dataset::default();
        data.targets.insert(7, Target::new(7, "example.com"));
        let at = Utc::now();

        let result = CheckResult {
            id: 0,
            target_id: 7,
            resolver_id: 1,
            status: ProbeStatus::Ok,
            response_time_ms: 1.5,
            resolved_ip: None,
            http_status: Some(200),
            error: None,
            confidence: 100,
            checked_at: at,
        };
        let committed = data
            .commit_check(CheckCommit {
                target_id: 7,
                results: vec![result.clone(), result],
                transition: Some(StatusTransition {
                    from: ProbeStatus::Unknown,
                    to: ProbeStatus::Ok,
                    consecutive_failures: 0,
                }),
                checked_at: at,
            })
            .unwrap();

        assert_eq!(committed.results.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(committed.target.current_status, ProbeStatus::Ok);
        assert_eq!(committed.target.last_checked_at, Some(at));
        assert_eq!(committed.target.last_status_change_at, Some(at));
        assert_eq!(data.check_results.len(), 2);
    }

    #[test]
    fn test_commit_check_unknown_target_writes_nothing() {
        let mut data = Dataset::default();
        let err = data
            .commit_check(CheckCommit {
                target_id: 99,
                results: Vec::new(),
                transition: None,
                checked_at: Utc::now(),
            })
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(data.check_results.is_empty());
    }

    #[test]
    fn test_apply_rotation_appends_history() {
        let mut data = shortlink_dataset();
        let history = data.apply_rotation(rotation(Some(10), 11)).unwrap();

        assert_eq!(history.from_target_id, Some(10));
        assert_eq!(history.to_target_id, 11);
        let shortlink = &data.shortlinks[&1];
        assert_eq!(shortlink.current_target_id, Some(11));
        assert_eq!(shortlink.rotation_count, 1);
        assert_eq!(data.rotation_history(1).len(), 1);
    }

    #[test]
    fn test_apply_rotation_rejects_stale_and_foreign() {
        let mut data = shortlink_dataset();

        let err = data.apply_rotation(rotation(Some(11), 11)).unwrap_err();
        assert!(err.is_conflict());

        let err = data.apply_rotation(rotation(Some(10), 20)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        assert_eq!(data.shortlinks[&1].current_target_id, Some(10));
        assert!(data.rotation_history.is_empty());
    }
}
