// # Targets, Resolvers and Check Results
//
// Rows owned by the probe side of the system. `Target` status fields
// (`current_status`, `consecutive_failures`, `last_status_change_at`) are
// written only by `CheckEngine`; everything else is configuration owned by
// whoever manages the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use url::Url;

use super::ProbeStatus;
use crate::{Error, Result};

/// Target identifier
pub type TargetId = u64;

/// Target group identifier
pub type TargetGroupId = u64;

/// Resolver identifier
pub type ResolverId = u64;

/// Check result identifier
pub type CheckResultId = u64;

/// What a target string denotes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Bare domain name (`example.com`)
    #[default]
    Domain,
    /// Full URL (`https://example.com/path`)
    Url,
}

/// A monitored domain or URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Identity
    pub id: TargetId,
    /// Domain name or URL as entered
    pub domain_or_url: String,
    /// Domain or URL
    #[serde(default)]
    pub kind: TargetKind,
    /// Owning target group, if any
    #[serde(default)]
    pub group_id: Option<TargetGroupId>,
    /// Whether periodic checks include this target
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Last fused status
    #[serde(default)]
    pub current_status: ProbeStatus,
    /// Number of status changes into a non-OK status since the last OK
    #[serde(default)]
    pub consecutive_failures: u32,
    /// When the target was last checked
    #[serde(default)]
    pub last_checked_at: Option<DateTime<Utc>>,
    /// When `current_status` last changed
    #[serde(default)]
    pub last_status_change_at: Option<DateTime<Utc>>,
    /// Per-target check interval override (seconds)
    #[serde(default)]
    pub check_interval_secs: Option<u64>,
    /// Free-form operator notes (included in notifications)
    #[serde(default)]
    pub notes: Option<String>,
    /// Soft-deletion marker
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Target {
    /// Create an enabled target with unknown status
    pub fn new(id: TargetId, domain_or_url: impl Into<String>) -> Self {
        let domain_or_url = domain_or_url.into();
        let kind = if domain_or_url.contains("://") {
            TargetKind::Url
        } else {
            TargetKind::Domain
        };

        Self {
            id,
            domain_or_url,
            kind,
            group_id: None,
            enabled: true,
            current_status: ProbeStatus::Unknown,
            consecutive_failures: 0,
            last_checked_at: None,
            last_status_change_at: None,
            check_interval_secs: None,
            notes: None,
            deleted_at: None,
        }
    }

    /// Set the owning target group
    pub fn with_group(mut self, group_id: TargetGroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    /// Set the check interval override
    pub fn with_check_interval(mut self, secs: u64) -> Self {
        self.check_interval_secs = Some(secs);
        self
    }

    /// Enable or disable the target
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// URL to fetch; targets without a scheme default to `https://`
    pub fn fetch_url(&self) -> String {
        with_default_scheme(&self.domain_or_url)
    }

    /// Host component of the target
    pub fn hostname(&self) -> Result<String> {
        extract_hostname(&self.domain_or_url)
    }

    /// Whether the target is soft-deleted
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Prefix `https://` when the input carries no scheme
pub fn with_default_scheme(domain_or_url: &str) -> String {
    let trimmed = domain_or_url.trim();
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// Reduce a domain or URL to its host component
pub fn extract_hostname(domain_or_url: &str) -> Result<String> {
    let url = Url::parse(&with_default_scheme(domain_or_url))
        .map_err(|e| Error::invalid_input(format!("Invalid target '{}': {}", domain_or_url, e)))?;

    url.host_str()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
        .filter(|host| !host.is_empty())
        .ok_or_else(|| Error::invalid_input(format!("Target '{}' has no host", domain_or_url)))
}

/// Target group: shared defaults for its targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    /// Identity
    pub id: TargetGroupId,
    /// Display name
    pub name: String,
    /// Default check interval for member targets (seconds)
    #[serde(default)]
    pub check_interval_secs: Option<u64>,
}

/// Probe endpoint kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    /// Classic DNS (UDP/TCP port 53)
    Dns,
    /// DNS-over-HTTPS
    Doh,
    /// DNS-over-TLS endpoint, queried through its HTTPS JSON interface
    Dot,
}

impl ResolverKind {
    /// Registry name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolverKind::Dns => "dns",
            ResolverKind::Doh => "doh",
            ResolverKind::Dot => "dot",
        }
    }
}

impl fmt::Display for ResolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A probe endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolver {
    /// Identity
    pub id: ResolverId,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Endpoint kind
    pub kind: ResolverKind,
    /// Nameserver IP (dns) or endpoint URL (doh/dot)
    pub address: String,
    /// Port override for `dns` resolvers
    #[serde(default)]
    pub port: Option<u16>,
    /// Whether checks use this resolver
    #[serde(default = "default_true")]
    pub active: bool,
    /// Lower is tried first
    #[serde(default = "default_rank")]
    pub priority: u32,
    /// Higher is preferred among equal priorities
    #[serde(default = "default_rank")]
    pub weight: u32,
}

impl Resolver {
    /// Create an active resolver with default priority and weight
    pub fn new(id: ResolverId, kind: ResolverKind, address: impl Into<String>) -> Self {
        let address = address.into();
        Self {
            id,
            name: address.clone(),
            kind,
            address,
            port: None,
            active: true,
            priority: default_rank(),
            weight: default_rank(),
        }
    }

    /// Set priority and weight
    pub fn with_rank(mut self, priority: u32, weight: u32) -> Self {
        self.priority = priority;
        self.weight = weight;
        self
    }

    /// Activate or deactivate the resolver
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// One (target, resolver) probe outcome; immutable once stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Identity (assigned by the store)
    pub id: CheckResultId,
    /// Checked target
    pub target_id: TargetId,
    /// Resolver used
    pub resolver_id: ResolverId,
    /// Classification
    pub status: ProbeStatus,
    /// Wall-clock duration of the probe in milliseconds (two decimals)
    pub response_time_ms: f64,
    /// Address the resolver returned, if any
    pub resolved_ip: Option<IpAddr>,
    /// HTTP status of the fetch, if it completed
    pub http_status: Option<u16>,
    /// Error or reason text
    pub error: Option<String>,
    /// Per-result confidence (0..=100)
    pub confidence: u8,
    /// When the probe finished
    pub checked_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

fn default_rank() -> u32 {
    100
}
