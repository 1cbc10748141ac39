//! Contract Test: Due Targets, Candidate Refresh and Statistics
//!
//! This test verifies the batch entry points the cron caller uses.
//!
//! Constraints verified:
//! - Only enabled, non-deleted targets whose interval elapsed are checked
//! - Interval precedence is target, then group, then engine default
//! - One failing target does not stop the batch
//! - Candidate refresh feeds the statuses the rotation sweep consumes
//! - Statistics aggregate the stored results of a window
//!
//! If this test fails, the periodic trigger checks or rotates the wrong rows.

mod common;

use chrono::{Duration, Utc};
use common::*;
use nawala_core::model::{ProbeStatus, RotationGroup, Target, TargetGroup};
use nawala_core::state::MemoryStore;
use nawala_core::traits::Store;
use nawala_core::{EventSink, RotationService};
use std::sync::Arc;

async fn put_checked(store: &dyn Store, target: Target, checked_secs_ago: Option<i64>) {
    let mut target = target;
    target.last_checked_at = checked_secs_ago.map(|ago| Utc::now() - Duration::seconds(ago));
    store.put_target(target).await.unwrap();
}

#[tokio::test]
async fn only_due_targets_are_checked() {
    let store = seeded_store(2, &[]).await;
    store
        .put_target_group(TargetGroup {
            id: 1,
            name: "slow".to_string(),
            check_interval_secs: Some(3600),
        })
        .await
        .unwrap();

    // Never checked
    put_checked(&store, Target::new(1, "a.example"), None).await;
    // Default interval (300 s) elapsed
    put_checked(&store, Target::new(2, "b.example"), Some(400)).await;
    // Default interval not elapsed
    put_checked(&store, Target::new(3, "c.example"), Some(100)).await;
    // Group interval (3600 s) not elapsed
    put_checked(&store, Target::new(4, "d.example").with_group(1), Some(400)).await;
    // Target override (60 s) beats the group interval
    put_checked(
        &store,
        Target::new(5, "e.example").with_group(1).with_check_interval(60),
        Some(400),
    )
    .await;
    // Disabled
    put_checked(&store, Target::new(6, "f.example").with_enabled(false), None).await;
    // Soft-deleted
    let mut deleted = Target::new(7, "g.example");
    deleted.deleted_at = Some(Utc::now());
    put_checked(&store, deleted, None).await;

    let engine = engine(Arc::new(store.clone()), ScriptedProber::new(ProbeStatus::Ok));
    let summary = engine.check_due_targets(Utc::now()).await.unwrap();

    let checked: Vec<u64> = summary.outcomes.iter().map(|o| o.target_id).collect();
    assert_eq!(checked, vec![1, 2, 5]);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn failing_target_does_not_stop_the_batch() {
    let store = FailingStore::new(seeded_store(1, &["a.example", "b.example"]).await);
    let engine = engine(Arc::new(store.clone()), ScriptedProber::new(ProbeStatus::Ok));

    store.fail_commits(true);
    let summary = engine.check_many(vec![1, 2, 99]).await.unwrap();
    assert_eq!(summary.failed, 3);

    store.fail_commits(false);
    let summary = engine.check_many(vec![1, 2, 99]).await.unwrap();
    assert_eq!(summary.outcomes.len(), 2);
    assert_eq!(summary.failed, 1);
}

#[tokio::test]
async fn refreshed_candidates_drive_rotation() {
    let store = seeded_store(3, &[]).await;
    store
        .put_rotation_group(RotationGroup::new(1, 300))
        .await
        .unwrap();
    seed_shortlink(
        &store,
        1,
        1,
        10,
        &[(10, 1, ProbeStatus::Ok), (11, 2, ProbeStatus::Unknown)],
    )
    .await;

    let prober = ScriptedProber::new(ProbeStatus::Ok);
    prober.set_verdicts(
        "https://mirror-10.example",
        &[ProbeStatus::DnsFiltered, ProbeStatus::DnsFiltered, ProbeStatus::Ok],
    );
    let engine = engine(Arc::new(store.clone()), prober);

    assert_eq!(engine.refresh_shortlink_targets().await.unwrap(), 2);

    let candidates = store.shortlink_targets(1).await.unwrap();
    assert_eq!(candidates[0].last_known_status, ProbeStatus::DnsFiltered);
    assert_eq!(candidates[1].last_known_status, ProbeStatus::Ok);
    assert!(candidates.iter().all(|c| c.last_checked_at.is_some()));

    let rotation = RotationService::new(Arc::new(store.clone()), EventSink::disabled());
    assert_eq!(rotation.auto_rotate_all().await.unwrap(), 1);
    assert_eq!(
        store.get_shortlink(1).await.unwrap().unwrap().current_target_id,
        Some(11)
    );
}

#[tokio::test]
async fn statistics_cover_the_window() {
    let store = seeded_store(4, &["stats.example"]).await;
    let prober = ScriptedProber::new(ProbeStatus::Ok);
    prober.set_verdicts(
        "stats.example",
        &[
            ProbeStatus::Ok,
            ProbeStatus::DnsFiltered,
            ProbeStatus::Rst,
            ProbeStatus::Timeout,
        ],
    );
    let engine = engine(Arc::new(store.clone()), prober);
    engine.check_target(1).await.unwrap();

    let stats = engine.target_statistics(1, Duration::hours(24)).await.unwrap();
    assert_eq!(stats.total_checks, 4);
    assert_eq!(stats.accessible_count, 1);
    assert_eq!(stats.blocked_count, 2);
    assert_eq!(stats.status_counts[&ProbeStatus::Timeout], 1);
    assert_eq!(stats.uptime_percentage, 25.0);
    assert_eq!(stats.avg_response_time_ms, 12.5);

    assert!(matches!(
        engine.target_statistics(99, Duration::hours(24)).await,
        Err(nawala_core::Error::NotFound(_))
    ));
}

#[tokio::test]
async fn empty_store_has_nothing_due() {
    let store = MemoryStore::new();
    let engine = engine(Arc::new(store), ScriptedProber::new(ProbeStatus::Ok));
    let summary = engine.check_due_targets(Utc::now()).await.unwrap();
    assert!(summary.outcomes.is_empty());
    assert_eq!(summary.failed, 0);
}
