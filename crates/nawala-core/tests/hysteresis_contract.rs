//! Contract Test: Status Hysteresis
//!
//! This test verifies that a target's stored status only moves through the
//! fuse-and-compare step of a check.
//!
//! Constraints verified:
//! - A transition into a non-OK status increments `consecutive_failures` by 1
//! - Returning to OK resets `consecutive_failures` to 0
//! - Every transition emits exactly one status-change event
//! - Concurrent checks of one target apply transitions one at a time
//!
//! If this test fails, notifications and failure counters are unreliable.

mod common;

use common::*;
use nawala_core::model::ProbeStatus::{DnsFiltered, HttpBlockpage, Ok as Accessible, Rst};
use nawala_core::model::ProbeStatus;
use nawala_core::traits::Store;
use std::sync::Arc;

const TARGET: &str = "news.example";

#[tokio::test]
async fn transition_into_blocked_increments_failures_by_one() {
    let store = seeded_store(3, &[TARGET]).await;
    let prober = ScriptedProber::new(Accessible);
    let (engine, mut rx) = engine_with_events(Arc::new(store.clone()), prober.clone());

    let first = engine.check_target(1).await.unwrap();
    assert_eq!(first.status, Accessible);
    assert_eq!(first.confidence, 100);

    let target = store.get_target(1).await.unwrap().unwrap();
    assert_eq!(target.current_status, Accessible);
    assert_eq!(target.consecutive_failures, 0);

    prober.set_verdicts(TARGET, &[DnsFiltered, DnsFiltered, Accessible]);
    let blocked = engine.check_target(1).await.unwrap();
    assert_eq!(blocked.status, DnsFiltered);
    assert_eq!(blocked.confidence, 67);

    let target = store.get_target(1).await.unwrap().unwrap();
    assert_eq!(target.current_status, DnsFiltered);
    assert_eq!(target.consecutive_failures, 1);

    let changes = status_changes(&drain(&mut rx));
    assert_eq!(
        changes,
        vec![(ProbeStatus::Unknown, Accessible), (Accessible, DnsFiltered)]
    );
}

#[tokio::test]
async fn consecutive_failures_accumulate_across_blocked_statuses_and_reset_on_ok() {
    let store = seeded_store(3, &[TARGET]).await;
    let prober = ScriptedProber::new(Accessible);
    let engine = engine(Arc::new(store.clone()), prober.clone());

    engine.check_target(1).await.unwrap();

    for (status, expected) in [(DnsFiltered, 1), (HttpBlockpage, 2), (Rst, 3)] {
        prober.set_verdicts(TARGET, &[status, status, status]);
        engine.check_target(1).await.unwrap();
        let target = store.get_target(1).await.unwrap().unwrap();
        assert_eq!(target.current_status, status);
        assert_eq!(target.consecutive_failures, expected);
    }

    prober.set_verdicts(TARGET, &[Accessible, Accessible, Accessible]);
    let recovered = engine.check_target(1).await.unwrap();
    assert!(recovered.status_change.as_ref().is_some_and(|c| c.is_recovery()));

    let target = store.get_target(1).await.unwrap().unwrap();
    assert_eq!(target.current_status, Accessible);
    assert_eq!(target.consecutive_failures, 0);
    assert!(target.last_status_change_at.is_some());
}

#[tokio::test]
async fn per_result_confidence_is_constant() {
    let store = seeded_store(3, &[TARGET]).await;
    let prober = ScriptedProber::new(Accessible);
    prober.set_verdicts(TARGET, &[DnsFiltered, DnsFiltered, Accessible]);
    let engine = engine(Arc::new(store.clone()), prober);

    let outcome = engine.check_target(1).await.unwrap();

    assert_eq!(outcome.confidence, 67);
    assert_eq!(outcome.results.len(), 3);
    assert!(outcome.results.iter().all(|r| r.confidence == 100));
    assert_eq!(
        outcome.results.iter().map(|r| r.resolver_id).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn concurrent_checks_of_one_target_transition_once() {
    let store = seeded_store(3, &[TARGET]).await;
    let prober = ScriptedProber::new(DnsFiltered);
    let (engine, mut rx) = engine_with_events(Arc::new(store.clone()), prober);

    let a = tokio::spawn({
        let engine = engine.clone();
        async move { engine.check_target(1).await }
    });
    let b = tokio::spawn({
        let engine = engine.clone();
        async move { engine.check_target(1).await }
    });
    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());

    // One of the two saw UNKNOWN, the other saw the stored DNS_FILTERED
    assert_eq!(
        [a.status_change.is_some(), b.status_change.is_some()]
            .iter()
            .filter(|changed| **changed)
            .count(),
        1
    );

    let target = store.get_target(1).await.unwrap().unwrap();
    assert_eq!(target.consecutive_failures, 1);
    assert_eq!(status_changes(&drain(&mut rx)).len(), 1);
    assert_eq!(store.snapshot().await.check_results.len(), 6);
}
