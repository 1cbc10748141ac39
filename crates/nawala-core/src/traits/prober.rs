// # Prober Trait
//
// One probe of one domain or URL through one resolver. The built-in
// implementation is [`SignalProber`](crate::prober::SignalProber); tests
// substitute scripted probers.

use async_trait::async_trait;
use std::net::IpAddr;

use crate::model::{ProbeStatus, Resolver};

/// Classification record of a single probe
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    /// Classification
    pub status: ProbeStatus,
    /// Wall-clock duration of the whole probe (milliseconds, two decimals)
    pub response_time_ms: f64,
    /// Address returned by the resolver, if any
    pub resolved_ip: Option<IpAddr>,
    /// HTTP status of the fetch, if it completed
    pub http_status: Option<u16>,
    /// Error or reason text
    pub error: Option<String>,
}

impl ProbeOutcome {
    /// Outcome with the given status and no other detail
    pub fn with_status(status: ProbeStatus) -> Self {
        Self {
            status,
            response_time_ms: 0.0,
            resolved_ip: None,
            http_status: None,
            error: None,
        }
    }
}

/// Trait for prober implementations
///
/// # Contract
///
/// Every network failure must be folded into a [`ProbeStatus`]. `Err` is
/// reserved for failures outside the status machine (e.g. no lookup
/// registered for the resolver kind); the orchestrator excludes such
/// resolvers from fusion.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Probe `domain_or_url` through `resolver`
    async fn probe(
        &self,
        domain_or_url: &str,
        resolver: &Resolver,
    ) -> Result<ProbeOutcome, crate::Error>;
}
