//! Contract Test: Check Idempotency
//!
//! This test verifies that repeating a check with unchanged verdicts does
//! not move the target's status fields.
//!
//! Constraints verified:
//! - `consecutive_failures` and `last_status_change_at` stay put
//! - No status-change event is emitted for an unchanged status
//! - `last_checked_at` is always stamped and results are always appended
//!
//! If this test fails, repeated cron runs produce notification storms.

mod common;

use common::*;
use nawala_core::events::EngineEvent;
use nawala_core::model::ProbeStatus;
use nawala_core::traits::Store;
use std::sync::Arc;

const TARGET: &str = "https://blocked.example/path";

#[tokio::test]
async fn repeated_identical_check_leaves_status_fields_unchanged() {
    let store = seeded_store(3, &[TARGET]).await;
    let prober = ScriptedProber::new(ProbeStatus::HttpBlockpage);
    let (engine, mut rx) = engine_with_events(Arc::new(store.clone()), prober);

    let first = engine.check_target(1).await.unwrap();
    assert!(first.status_change.is_some());
    let after_first = store.get_target(1).await.unwrap().unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let second = engine.check_target(1).await.unwrap();
    assert!(second.status_change.is_none());
    assert_eq!(second.status, ProbeStatus::HttpBlockpage);
    let after_second = store.get_target(1).await.unwrap().unwrap();

    assert_eq!(after_second.current_status, after_first.current_status);
    assert_eq!(
        after_second.consecutive_failures,
        after_first.consecutive_failures
    );
    assert_eq!(
        after_second.last_status_change_at,
        after_first.last_status_change_at
    );
    assert!(after_second.last_checked_at > after_first.last_checked_at);

    let events = drain(&mut rx);
    assert_eq!(status_changes(&events).len(), 1);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, EngineEvent::CheckCompleted { .. }))
            .count(),
        2
    );

    assert_eq!(store.snapshot().await.check_results.len(), 6);
}

#[tokio::test]
async fn unchanged_ok_status_emits_nothing() {
    let store = seeded_store(2, &[TARGET]).await;
    let prober = ScriptedProber::new(ProbeStatus::Ok);
    let (engine, mut rx) = engine_with_events(Arc::new(store.clone()), prober);

    engine.check_target(1).await.unwrap();
    drain(&mut rx);

    for _ in 0..3 {
        let outcome = engine.check_target(1).await.unwrap();
        assert_eq!(outcome.status, ProbeStatus::Ok);
        assert!(outcome.status_change.is_none());
    }

    assert!(status_changes(&drain(&mut rx)).is_empty());
    let target = store.get_target(1).await.unwrap().unwrap();
    assert_eq!(target.consecutive_failures, 0);
}

#[tokio::test]
async fn result_ids_are_unique_across_checks() {
    let store = seeded_store(2, &[TARGET]).await;
    let prober = ScriptedProber::new(ProbeStatus::Ok);
    let engine = engine(Arc::new(store.clone()), prober);

    let a = engine.check_target(1).await.unwrap();
    let b = engine.check_target(1).await.unwrap();

    let mut ids: Vec<u64> = a.results.iter().chain(&b.results).map(|r| r.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}
