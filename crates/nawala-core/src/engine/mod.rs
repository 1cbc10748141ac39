//! Target probe orchestrator
//!
//! The CheckEngine is responsible for:
//! - Probing a target through every active resolver concurrently
//! - Fusing the per-resolver statuses into one verdict
//! - Applying hysteresis to the target's stored status
//! - Committing results and status fields in one store write
//! - Emitting status-change events for notifiers
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────┐
//!                    │ CheckEngine  │
//!                    └──────────────┘
//!                           │ one task per resolver
//!         ┌─────────────────┼─────────────────┐
//!         ▼                 ▼                 ▼
//!   ┌──────────┐      ┌──────────┐      ┌──────────┐
//!   │  Prober  │      │  Prober  │      │  Prober  │
//!   └──────────┘      └──────────┘      └──────────┘
//!         └─────────────────┼─────────────────┘
//!                           ▼ join (barrier)
//!                    ┌──────────────┐
//!                    │     fuse     │
//!                    └──────────────┘
//!                           │
//!            ┌──────────────┴──────────────┐
//!            ▼                             ▼
//!   ┌──────────────────┐          ┌──────────────┐
//!   │ Store::commit_   │          │    Events    │
//!   │ check (atomic)   │          │  (notify)    │
//!   └──────────────────┘          └──────────────┘
//! ```
//!
//! ## Check Flow
//!
//! 1. Take the per-target lock
//! 2. Load the target and the active resolvers
//! 3. Probe every resolver, each bounded by the probe envelope
//! 4. Fuse the completed statuses; failed or abandoned probes do not count
//! 5. Commit results, `last_checked_at` and (on change) the status fields
//! 6. Emit `StatusChanged` (on change) and `CheckCompleted`

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::events::{EngineEvent, EventSink, StatusChange};
use crate::fusion::{Verdict, fuse};
use crate::locks::KeyedLocks;
use crate::model::{
    CheckResult, ProbeStatus, Resolver, ResolverId, Target, TargetGroup, TargetGroupId, TargetId,
};
use crate::stats::TargetStatistics;
use crate::traits::{CheckCommit, ProbeOutcome, Prober, StatusTransition, Store};
use crate::{Error, Result};

/// Result of one `check_target` call
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    /// Checked target
    pub target_id: TargetId,
    /// Fused status
    pub status: ProbeStatus,
    /// Fused confidence (0..=100)
    pub confidence: u8,
    /// Stored per-resolver results
    pub results: Vec<CheckResult>,
    /// Present when the fused status differs from the previous one
    pub status_change: Option<StatusChange>,
}

/// Result of a due-target sweep
#[derive(Debug, Clone, Default)]
pub struct CheckSummary {
    /// Completed checks, ordered by target id
    pub outcomes: Vec<CheckOutcome>,
    /// Targets whose check returned an error
    pub failed: usize,
}

/// A probe that completed inside its envelope
struct Completed {
    resolver_id: ResolverId,
    outcome: ProbeOutcome,
}

/// Core probe-and-fuse engine
///
/// Cheap to clone: all state is shared.
///
/// ## Concurrency
///
/// - Resolver probes of one check run concurrently; fusion waits for all
/// - Checks of different targets run concurrently
/// - Checks of the same target are serialized, so hysteresis sees every
///   transition in order
#[derive(Clone)]
pub struct CheckEngine {
    store: Arc<dyn Store>,
    prober: Arc<dyn Prober>,
    events: EventSink,
    config: EngineConfig,
    target_locks: Arc<KeyedLocks<TargetId>>,
}

impl CheckEngine {
    /// Create a new check engine
    ///
    /// # Parameters
    ///
    /// - `store`: Store implementation
    /// - `prober`: Prober implementation
    /// - `config`: Engine configuration
    /// - `events`: Event sink (use [`EventSink::disabled`] to discard events)
    pub fn new(
        store: Arc<dyn Store>,
        prober: Arc<dyn Prober>,
        config: EngineConfig,
        events: EventSink,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            store,
            prober,
            events,
            config,
            target_locks: Arc::new(KeyedLocks::new()),
        })
    }

    /// Check one target through every active resolver
    ///
    /// # Returns
    ///
    /// - `Ok(CheckOutcome)`: results stored and status updated
    /// - `Err(Error::NotFound)`: unknown or soft-deleted target
    /// - `Err(Error)`: storage failure; nothing was written
    pub async fn check_target(&self, target_id: TargetId) -> Result<CheckOutcome> {
        let _guard = self.target_locks.lock(target_id).await;

        let target = self
            .store
            .get_target(target_id)
            .await?
            .filter(|t| !t.is_deleted())
            .ok_or_else(|| Error::not_found(format!("Target {}", target_id)))?;

        let resolvers = self.store.active_resolvers().await?;
        if resolvers.is_empty() {
            warn!("No active resolvers, target {} will be UNKNOWN", target_id);
        }

        let (completed, failures) = self.probe_all(&target.domain_or_url, &resolvers).await;
        for (resolver_id, reason) in failures {
            warn!(
                target_id,
                resolver_id, "Resolver probe excluded from fusion: {}", reason
            );
            self.events.emit(EngineEvent::ResolverFailed {
                target_id,
                resolver_id,
                error: reason,
            });
        }

        let statuses: Vec<ProbeStatus> = completed.iter().map(|c| c.outcome.status).collect();
        let verdict = fuse(&statuses);
        let checked_at = Utc::now();

        let results = completed
            .into_iter()
            .map(|c| CheckResult {
                id: 0,
                target_id,
                resolver_id: c.resolver_id,
                status: c.outcome.status,
                response_time_ms: c.outcome.response_time_ms,
                resolved_ip: c.outcome.resolved_ip,
                http_status: c.outcome.http_status,
                error: c.outcome.error,
                confidence: self.config.result_confidence,
                checked_at,
            })
            .collect();

        let transition = transition(&target, verdict.status);
        let committed = self
            .store
            .commit_check(CheckCommit {
                target_id,
                results,
                transition,
                checked_at,
            })
            .await
            .inspect_err(|e| error!("Failed to commit check of target {}: {}", target_id, e))?;

        let status_change = transition.map(|t| StatusChange {
            target_id,
            target: target.domain_or_url.clone(),
            group_id: target.group_id,
            notes: target.notes.clone(),
            old_status: t.from,
            new_status: t.to,
            changed_at: checked_at,
        });

        if let Some(change) = &status_change {
            info!(
                target_id,
                consecutive_failures = committed.target.consecutive_failures,
                "Target {} status changed: {} -> {}",
                target.domain_or_url,
                change.old_status,
                change.new_status
            );
            self.events.emit(EngineEvent::StatusChanged(change.clone()));
        } else {
            debug!(
                target_id,
                "Target {} unchanged at {}", target.domain_or_url, verdict.status
            );
        }

        self.events.emit(EngineEvent::CheckCompleted {
            target_id,
            status: verdict.status,
            confidence: verdict.confidence,
            resolver_count: committed.results.len(),
        });

        Ok(CheckOutcome {
            target_id,
            status: verdict.status,
            confidence: verdict.confidence,
            results: committed.results,
            status_change,
        })
    }

    /// Check every enabled target whose interval has elapsed at `now`
    ///
    /// Targets are checked concurrently up to `max_concurrent_checks`. A
    /// failing target is logged and counted; the rest of the batch proceeds.
    pub async fn check_due_targets(&self, now: DateTime<Utc>) -> Result<CheckSummary> {
        let targets = self.store.list_targets().await?;
        let mut groups: HashMap<TargetGroupId, Option<TargetGroup>> = HashMap::new();
        let mut due = Vec::new();

        for target in targets {
            if !target.enabled || target.is_deleted() {
                continue;
            }
            let group = match target.group_id {
                Some(group_id) => match groups.get(&group_id) {
                    Some(group) => group.clone(),
                    None => {
                        let group = self.store.get_target_group(group_id).await?;
                        groups.insert(group_id, group.clone());
                        group
                    }
                },
                None => None,
            };
            let interval = effective_interval(&target, group.as_ref(), &self.config);
            if is_due(&target, interval, now) {
                due.push(target.id);
            }
        }

        debug!("{} targets due for checking", due.len());
        self.check_many(due).await
    }

    /// Check the given targets with bounded concurrency
    pub async fn check_many(&self, target_ids: Vec<TargetId>) -> Result<CheckSummary> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_checks));
        let mut tasks = JoinSet::new();

        for target_id in target_ids {
            let engine = self.clone();
            let semaphore = semaphore.clone();
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::other(e.to_string()))?;
                engine.check_target(target_id).await
            });
        }

        let mut summary = CheckSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(outcome)) => summary.outcomes.push(outcome),
                Ok(Err(e)) => {
                    warn!("Target check failed: {}", e);
                    summary.failed += 1;
                }
                Err(e) => {
                    error!("Target check task aborted: {}", e);
                    summary.failed += 1;
                }
            }
        }
        summary.outcomes.sort_by_key(|o| o.target_id);

        info!(
            "Checked {} targets ({} failed)",
            summary.outcomes.len(),
            summary.failed
        );
        Ok(summary)
    }

    /// Probe every active candidate of every active shortlink and store its status
    ///
    /// Returns the number of candidates updated. A candidate whose update
    /// fails is logged and skipped.
    pub async fn refresh_shortlink_targets(&self) -> Result<usize> {
        let resolvers = self.store.active_resolvers().await?;
        let shortlinks = self.store.list_shortlinks().await?;
        let mut updated = 0;

        for shortlink in shortlinks.iter().filter(|s| s.active) {
            let candidates = self.store.shortlink_targets(shortlink.id).await?;

            for candidate in candidates.into_iter().filter(|c| c.active) {
                let (completed, failures) = self.probe_all(&candidate.url, &resolvers).await;
                for (resolver_id, reason) in failures {
                    debug!(
                        shortlink_id = shortlink.id,
                        resolver_id, "Candidate {} probe excluded: {}", candidate.url, reason
                    );
                }

                let statuses: Vec<ProbeStatus> =
                    completed.iter().map(|c| c.outcome.status).collect();
                let Verdict { status, confidence } = fuse(&statuses);

                match self
                    .store
                    .set_shortlink_target_status(candidate.id, status, Utc::now())
                    .await
                {
                    Ok(()) => {
                        debug!(
                            shortlink_id = shortlink.id,
                            "Candidate {} is {} ({}%)", candidate.url, status, confidence
                        );
                        if status != candidate.last_known_status {
                            info!(
                                shortlink_id = shortlink.id,
                                "Candidate {} changed: {} -> {}",
                                candidate.url,
                                candidate.last_known_status,
                                status
                            );
                        }
                        updated += 1;
                    }
                    Err(e) => warn!("Failed to store status of candidate {}: {}", candidate.id, e),
                }
            }
        }

        Ok(updated)
    }

    /// Statistics of a target's check results over the last `window`
    pub async fn target_statistics(
        &self,
        target_id: TargetId,
        window: chrono::Duration,
    ) -> Result<TargetStatistics> {
        if self.store.get_target(target_id).await?.is_none() {
            return Err(Error::not_found(format!("Target {}", target_id)));
        }

        let since = Utc::now() - window;
        let results = self.store.check_results_since(target_id, since).await?;
        Ok(TargetStatistics::from_results(target_id, since, &results))
    }

    /// Probe `domain_or_url` through every resolver and wait for all of them
    ///
    /// Returns the probes that completed, in resolver order, and the
    /// resolvers that failed outside the status machine with the reason.
    /// Dropping the returned future aborts the probes still in flight.
    async fn probe_all(
        &self,
        domain_or_url: &str,
        resolvers: &[Resolver],
    ) -> (Vec<Completed>, Vec<(ResolverId, String)>) {
        let envelope = Duration::from_secs(self.config.probe_envelope_secs);
        let mut tasks = JoinSet::new();

        for (index, resolver) in resolvers.iter().enumerate() {
            let prober = self.prober.clone();
            let resolver = resolver.clone();
            let domain_or_url = domain_or_url.to_string();
            tasks.spawn(async move {
                let result =
                    tokio::time::timeout(envelope, prober.probe(&domain_or_url, &resolver)).await;
                (index, result)
            });
        }

        let mut completed = Vec::with_capacity(resolvers.len());
        let mut failures = Vec::new();
        let mut pending: BTreeSet<usize> = (0..resolvers.len()).collect();

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok(joined) => joined,
                Err(e) => {
                    error!("Resolver probe task aborted: {}", e);
                    continue;
                }
            };
            pending.remove(&index);
            let resolver_id = resolvers[index].id;

            match result {
                Ok(Ok(outcome)) => {
                    debug!(
                        resolver_id,
                        "{} via {}: {}", domain_or_url, resolvers[index].address, outcome.status
                    );
                    completed.push((index, Completed { resolver_id, outcome }));
                }
                Ok(Err(e)) => failures.push((resolver_id, e.to_string())),
                Err(_) => failures.push((
                    resolver_id,
                    format!("Probe exceeded {}s envelope", envelope.as_secs()),
                )),
            }
        }

        // Tasks that panicked never reported their index
        for index in pending {
            failures.push((resolvers[index].id, "Probe task panicked".to_string()));
        }

        completed.sort_by_key(|(index, _)| *index);
        failures.sort_by_key(|(resolver_id, _)| *resolver_id);
        (completed.into_iter().map(|(_, c)| c).collect(), failures)
    }
}

/// Status fields to write when `new_status` differs from the stored status
fn transition(target: &Target, new_status: ProbeStatus) -> Option<StatusTransition> {
    if target.current_status == new_status {
        return None;
    }

    let consecutive_failures = if new_status == ProbeStatus::Ok {
        0
    } else {
        target.consecutive_failures.saturating_add(1)
    };

    Some(StatusTransition {
        from: target.current_status,
        to: new_status,
        consecutive_failures,
    })
}

/// Check interval of a target: target override, then group default, then engine default
fn effective_interval(
    target: &Target,
    group: Option<&TargetGroup>,
    config: &EngineConfig,
) -> chrono::Duration {
    let secs = target
        .check_interval_secs
        .or_else(|| group.and_then(|g| g.check_interval_secs))
        .unwrap_or(config.default_check_interval_secs);
    chrono::Duration::seconds(secs.min(i64::MAX as u64 / 1000) as i64)
}

fn is_due(target: &Target, interval: chrono::Duration, now: DateTime<Utc>) -> bool {
    match target.last_checked_at {
        None => true,
        Some(last) => now.signed_duration_since(last) >= interval,
    }
}
