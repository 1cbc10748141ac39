// # Name Lookup Trait
//
// Resolves a hostname through one specific resolver.
//
// ## Implementations
//
// - Classic DNS against a chosen nameserver: `nawala-probe-http`
// - DNS-over-HTTPS JSON endpoint: `nawala-probe-http`
//
// ## Usage
//
// ```rust,ignore
// use nawala_core::traits::NameLookup;
// use nawala_core::model::{Resolver, ResolverKind};
//
// let resolver = Resolver::new(1, ResolverKind::Doh, "https://dns.google/resolve");
// let ip = lookup.lookup("example.com", &resolver).await?;
// ```

use async_trait::async_trait;
use std::net::IpAddr;

use crate::config::ProbeConfig;
use crate::model::Resolver;

/// Trait for name lookup implementations
///
/// One implementation serves one or more [`ResolverKind`](crate::model::ResolverKind)s;
/// the [`ProbeRegistry`](crate::registry::ProbeRegistry) maps kinds to lookups.
///
/// # Thread Safety
///
/// Implementations must be thread-safe: a check fans out one task per
/// resolver and they all share the same lookup.
///
/// # Contract
///
/// - Use the resolver's own endpoint, never the system resolver
/// - Enforce the configured lookup timeout
/// - Do not classify: a sinkhole answer is returned like any other address
#[async_trait]
pub trait NameLookup: Send + Sync {
    /// Resolve `host` to one address through `resolver`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(ip))`: first usable answer
    /// - `Ok(None)`: the resolver answered without an address
    /// - `Err(Error)`: the lookup itself failed (timeout, transport, parse)
    ///
    /// The prober treats `Ok(None)` and `Err` alike (no resolved address); the
    /// distinction only matters for logging.
    async fn lookup(&self, host: &str, resolver: &Resolver) -> Result<Option<IpAddr>, crate::Error>;

    /// Short name used in logs
    fn lookup_name(&self) -> &'static str;
}

/// Helper trait for constructing lookups from configuration
pub trait NameLookupFactory: Send + Sync {
    /// Create a NameLookup instance from configuration
    fn create(&self, config: &ProbeConfig) -> Result<Box<dyn NameLookup>, crate::Error>;
}
