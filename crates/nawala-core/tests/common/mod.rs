//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles that drive the engines
//! without touching the network.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nawala_core::config::EngineConfig;
use nawala_core::events::{EngineEvent, EventSink};
use nawala_core::model::{
    CheckResult, ProbeStatus, Resolver, ResolverId, ResolverKind, RotationGroup, RotationGroupId,
    RotationHistory, Shortlink, ShortlinkId, ShortlinkTarget, ShortlinkTargetId, Target,
    TargetGroup, TargetGroupId, TargetId,
};
use nawala_core::state::MemoryStore;
use nawala_core::traits::{
    CheckCommit, CommittedCheck, ProbeOutcome, Prober, RotationCommit, Store,
};
use nawala_core::{CheckEngine, Error, Result, RotationService};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// What a scripted probe does
#[derive(Debug, Clone, Copy)]
pub enum Script {
    /// Return this status
    Status(ProbeStatus),
    /// Fail outside the status machine
    Fail,
    /// Never finish (until the envelope abandons it)
    Hang,
}

/// A prober whose verdicts are set per (target, resolver) by the test
pub struct ScriptedProber {
    scripts: Mutex<HashMap<(String, ResolverId), Script>>,
    default: Mutex<Script>,
    call_count: AtomicUsize,
}

impl ScriptedProber {
    /// Every unscripted probe returns `default`
    pub fn new(default: ProbeStatus) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            default: Mutex::new(Script::Status(default)),
            call_count: AtomicUsize::new(0),
        })
    }

    /// Script one (target, resolver) pair
    pub fn set(&self, domain_or_url: &str, resolver_id: ResolverId, script: Script) {
        self.scripts
            .lock()
            .unwrap()
            .insert((domain_or_url.to_string(), resolver_id), script);
    }

    /// Script resolvers `1..=statuses.len()` for one target
    pub fn set_verdicts(&self, domain_or_url: &str, statuses: &[ProbeStatus]) {
        for (i, status) in statuses.iter().enumerate() {
            self.set(domain_or_url, i as ResolverId + 1, Script::Status(*status));
        }
    }

    /// Change what unscripted probes do
    pub fn set_default(&self, script: Script) {
        *self.default.lock().unwrap() = script;
    }

    /// Number of probe calls so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, domain_or_url: &str, resolver: &Resolver) -> Result<ProbeOutcome> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        let script = {
            let scripts = self.scripts.lock().unwrap();
            scripts
                .get(&(domain_or_url.to_string(), resolver.id))
                .copied()
                .unwrap_or(*self.default.lock().unwrap())
        };

        match script {
            Script::Status(status) => Ok(ProbeOutcome {
                status,
                response_time_ms: 12.5,
                resolved_ip: None,
                http_status: (status == ProbeStatus::Ok).then_some(200),
                error: None,
            }),
            Script::Fail => Err(Error::probe(format!(
                "scripted failure for resolver {}",
                resolver.id
            ))),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ProbeOutcome::with_status(ProbeStatus::Unknown))
            }
        }
    }
}

/// A memory store whose compound writes can be made to fail
#[derive(Clone, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    fail_commits: Arc<AtomicBool>,
    fail_rotations: Arc<Mutex<HashSet<ShortlinkId>>>,
}

impl FailingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Make every `commit_check` fail
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Make `apply_rotation` fail for one shortlink
    pub fn fail_rotation_of(&self, shortlink_id: ShortlinkId) {
        self.fail_rotations.lock().unwrap().insert(shortlink_id);
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait]
impl Store for FailingStore {
    async fn active_resolvers(&self) -> Result<Vec<Resolver>> {
        self.inner.active_resolvers().await
    }

    async fn get_target(&self, id: TargetId) -> Result<Option<Target>> {
        self.inner.get_target(id).await
    }

    async fn list_targets(&self) -> Result<Vec<Target>> {
        self.inner.list_targets().await
    }

    async fn get_target_group(&self, id: TargetGroupId) -> Result<Option<TargetGroup>> {
        self.inner.get_target_group(id).await
    }

    async fn commit_check(&self, commit: CheckCommit) -> Result<CommittedCheck> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(Error::store("injected commit failure"));
        }
        self.inner.commit_check(commit).await
    }

    async fn check_results_since(
        &self,
        target_id: TargetId,
        since: DateTime<Utc>,
    ) -> Result<Vec<CheckResult>> {
        self.inner.check_results_since(target_id, since).await
    }

    async fn get_shortlink(&self, id: ShortlinkId) -> Result<Option<Shortlink>> {
        self.inner.get_shortlink(id).await
    }

    async fn list_shortlinks(&self) -> Result<Vec<Shortlink>> {
        self.inner.list_shortlinks().await
    }

    async fn shortlink_targets(&self, shortlink_id: ShortlinkId) -> Result<Vec<ShortlinkTarget>> {
        self.inner.shortlink_targets(shortlink_id).await
    }

    async fn get_rotation_group(&self, id: RotationGroupId) -> Result<Option<RotationGroup>> {
        self.inner.get_rotation_group(id).await
    }

    async fn apply_rotation(&self, commit: RotationCommit) -> Result<RotationHistory> {
        if self
            .fail_rotations
            .lock()
            .unwrap()
            .contains(&commit.shortlink_id)
        {
            return Err(Error::store("injected rotation failure"));
        }
        self.inner.apply_rotation(commit).await
    }

    async fn rotation_history(&self, shortlink_id: ShortlinkId) -> Result<Vec<RotationHistory>> {
        self.inner.rotation_history(shortlink_id).await
    }

    async fn set_shortlink_target_status(
        &self,
        id: ShortlinkTargetId,
        status: ProbeStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<()> {
        self.inner
            .set_shortlink_target_status(id, status, checked_at)
            .await
    }

    async fn put_target(&self, target: Target) -> Result<()> {
        self.inner.put_target(target).await
    }

    async fn put_target_group(&self, group: TargetGroup) -> Result<()> {
        self.inner.put_target_group(group).await
    }

    async fn put_resolver(&self, resolver: Resolver) -> Result<()> {
        self.inner.put_resolver(resolver).await
    }

    async fn put_shortlink(&self, shortlink: Shortlink) -> Result<()> {
        self.inner.put_shortlink(shortlink).await
    }

    async fn put_shortlink_target(&self, target: ShortlinkTarget) -> Result<()> {
        self.inner.put_shortlink_target(target).await
    }

    async fn put_rotation_group(&self, group: RotationGroup) -> Result<()> {
        self.inner.put_rotation_group(group).await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}

/// A store with `resolver_count` DNS resolvers (ids `1..=n`) and the given targets (ids `1..`)
pub async fn seeded_store(resolver_count: usize, targets: &[&str]) -> MemoryStore {
    let store = MemoryStore::new();
    for i in 1..=resolver_count as u64 {
        store
            .put_resolver(Resolver::new(i, ResolverKind::Dns, format!("10.0.0.{}", i)))
            .await
            .unwrap();
    }
    for (i, target) in targets.iter().enumerate() {
        store
            .put_target(Target::new(i as TargetId + 1, *target))
            .await
            .unwrap();
    }
    store
}

/// Engine configuration with a short probe envelope
pub fn test_config() -> EngineConfig {
    EngineConfig {
        probe_envelope_secs: 1,
        ..EngineConfig::default()
    }
}

/// A check engine with events discarded
pub fn engine(store: Arc<dyn Store>, prober: Arc<dyn Prober>) -> CheckEngine {
    CheckEngine::new(store, prober, test_config(), EventSink::disabled())
        .expect("engine construction succeeds")
}

/// A check engine and the receiving end of its events
pub fn engine_with_events(
    store: Arc<dyn Store>,
    prober: Arc<dyn Prober>,
) -> (CheckEngine, mpsc::Receiver<EngineEvent>) {
    let (events, rx) = EventSink::channel(100);
    let engine =
        CheckEngine::new(store, prober, test_config(), events).expect("engine construction succeeds");
    (engine, rx)
}

/// A rotation service and the receiving end of its events
pub fn rotation_with_events(store: Arc<dyn Store>) -> (RotationService, mpsc::Receiver<EngineEvent>) {
    let (events, rx) = EventSink::channel(100);
    (RotationService::new(store, events), rx)
}

/// Every event currently queued
pub fn drain(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Status changes among `events`
pub fn status_changes(events: &[EngineEvent]) -> Vec<(ProbeStatus, ProbeStatus)> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::StatusChanged(change) => Some((change.old_status, change.new_status)),
            _ => None,
        })
        .collect()
}

/// Candidate of shortlink `shortlink_id`: `(id, priority, status)`
pub type CandidateSpec = (ShortlinkTargetId, u32, ProbeStatus);

/// Insert a shortlink in group `group_id` currently pointing at `current`
///
/// The first candidate is the original target.
pub async fn seed_shortlink(
    store: &dyn Store,
    shortlink_id: ShortlinkId,
    group_id: RotationGroupId,
    current: ShortlinkTargetId,
    candidates: &[CandidateSpec],
) {
    let original = candidates.first().map(|c| c.0).unwrap_or(current);
    let mut shortlink = Shortlink::new(shortlink_id, format!("link-{}", shortlink_id))
        .with_group(group_id)
        .with_target(original);
    shortlink.current_target_id = Some(current);
    store.put_shortlink(shortlink).await.unwrap();

    for (id, priority, status) in candidates {
        store
            .put_shortlink_target(
                ShortlinkTarget::new(
                    *id,
                    shortlink_id,
                    format!("https://mirror-{}.example", id),
                )
                .with_rank(*priority, 100)
                .with_status(*status),
            )
            .await
            .unwrap();
    }
}
