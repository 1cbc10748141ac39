//! Per-target check statistics over a time window

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::{CheckResult, ProbeStatus, TargetId};

/// Aggregates of the check results of one target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetStatistics {
    pub target_id: TargetId,
    /// Start of the window (inclusive)
    pub since: DateTime<Utc>,
    pub total_checks: usize,
    pub status_counts: BTreeMap<ProbeStatus, usize>,
    /// Results with status `OK`
    pub accessible_count: usize,
    /// Results with a blocked status (RST included)
    pub blocked_count: usize,
    /// Mean response time in milliseconds (two decimals); 0 without results
    pub avg_response_time_ms: f64,
    /// `accessible_count / total_checks` as a percentage (two decimals)
    pub uptime_percentage: f64,
}

impl TargetStatistics {
    /// Aggregate `results`
    pub fn from_results(
        target_id: TargetId,
        since: DateTime<Utc>,
        results: &[CheckResult],
    ) -> Self {
        let mut status_counts = BTreeMap::new();
        for result in results {
            *status_counts.entry(result.status).or_insert(0) += 1;
        }

        let total_checks = results.len();
        let accessible_count = status_counts.get(&ProbeStatus::Ok).copied().unwrap_or(0);
        let blocked_count = results.iter().filter(|r| r.status.is_blocked()).count();

        let avg_response_time_ms = if total_checks == 0 {
            0.0
        } else {
            results.iter().map(|r| r.response_time_ms).sum::<f64>() / total_checks as f64
        };
        let uptime_percentage = accessible_count as f64 / total_checks.max(1) as f64 * 100.0;

        Self {
            target_id,
            since,
            total_checks,
            status_counts,
            accessible_count,
            blocked_count,
            avg_response_time_ms: round2(avg_response_time_ms),
            uptime_percentage: round2(uptime_percentage),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: ProbeStatus, response_time_ms: f64) -> CheckResult {
        CheckResult {
            id: 0,
            target_id: 1,
            resolver_id: 1,
            status,
            response_time_ms,
            resolved_ip: None,
            http_status: None,
            error: None,
            confidence: 100,
            checked_at: Utc::now(),
        }
    }

    #[test]
    fn test_statistics() {
        let results = vec![
            result(ProbeStatus::Ok, 100.0),
            result(ProbeStatus::Ok, 200.0),
            result(ProbeStatus::DnsFiltered, 10.0),
            result(ProbeStatus::Rst, 15.0),
            result(ProbeStatus::Timeout, 10_000.0),
            result(ProbeStatus::Ok, 300.0),
        ];
        let stats = TargetStatistics::from_results(1, Utc::now(), &results);

        assert_eq!(stats.total_checks, 6);
        assert_eq!(stats.accessible_count, 3);
        assert_eq!(stats.blocked_count, 2);
        assert_eq!(stats.status_counts[&ProbeStatus::Ok], 3);
        assert_eq!(stats.avg_response_time_ms, 1770.83);
        assert_eq!(stats.uptime_percentage, 50.0);
    }

    #[test]
    fn test_empty_window() {
        let stats = TargetStatistics::from_results(1, Utc::now(), &[]);
        assert_eq!(stats.total_checks, 0);
        assert_eq!(stats.avg_response_time_ms, 0.0);
        assert_eq!(stats.uptime_percentage, 0.0);
    }
}
