//! Verdict fusion
//!
//! Combines per-resolver statuses into one status and an integer confidence.
//! Blocked statuses win when they outnumber `OK`, and at least one concrete
//! `OK` is required to declare a target accessible. Mixed non-blocked failures fuse
//! to `INCONCLUSIVE`; a unanimous one (every resolver timed out) keeps its own
//! status.
//!
//! When several statuses share the highest count, the winner is the one with
//! the lowest [`ProbeStatus::severity_rank`], so the result never depends on
//! input order.

use std::collections::HashMap;

use crate::model::ProbeStatus;

/// Fused verdict of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    /// Final status
    pub status: ProbeStatus,
    /// Share of inputs agreeing with `status`, 0..=100
    pub confidence: u8,
}

impl Verdict {
    /// Verdict used when no resolver produced a result
    pub const UNKNOWN: Verdict = Verdict {
        status: ProbeStatus::Unknown,
        confidence: 0,
    };
}

/// Fuse per-resolver statuses into one verdict
pub fn fuse(statuses: &[ProbeStatus]) -> Verdict {
    if statuses.is_empty() {
        return Verdict::UNKNOWN;
    }

    let mut counts: HashMap<ProbeStatus, usize> = HashMap::new();
    for status in statuses {
        *counts.entry(*status).or_default() += 1;
    }

    let blocked_count: usize = counts
        .iter()
        .filter(|(status, _)| status.is_blocked())
        .map(|(_, count)| count)
        .sum();
    let ok_count = counts.get(&ProbeStatus::Ok).copied().unwrap_or(0);

    let status = if blocked_count > ok_count {
        most_frequent(&counts)
    } else if ok_count > 0 {
        ProbeStatus::Ok
    } else if counts.len() == 1 {
        statuses[0]
    } else {
        ProbeStatus::Inconclusive
    };

    let agreeing = counts.get(&status).copied().unwrap_or(0);
    Verdict {
        status,
        confidence: confidence(agreeing, statuses.len()),
    }
}

/// Highest count, ties broken by severity rank
fn most_frequent(counts: &HashMap<ProbeStatus, usize>) -> ProbeStatus {
    counts
        .iter()
        .max_by(|(a, a_count), (b, b_count)| {
            a_count
                .cmp(b_count)
                .then_with(|| b.severity_rank().cmp(&a.severity_rank()))
        })
        .map(|(status, _)| *status)
        .unwrap_or(ProbeStatus::Unknown)
}

/// `round(100 * part / total)`, half away from zero
fn confidence(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (100.0 * part as f64 / total as f64).round();
    pct.clamp(0.0, 100.0) as u8
}
