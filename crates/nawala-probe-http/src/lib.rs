// # nawala-probe-http
//
// Network implementations of the probe seams:
//
// - [`DnsLookup`]: classic DNS against the resolver's own nameserver (`dns`)
// - [`DohLookup`]: DNS-over-HTTPS JSON endpoint (`doh`, `dot`)
// - [`HttpFetcher`]: relaxed-TLS page fetch with typed failure classification
//
// ## Registration
//
// ```rust,ignore
// let mut registry = ProbeRegistry::with_builtin_stores();
// nawala_probe_http::register(&mut registry);
// let prober = registry.build_prober(&config)?;
// ```

pub mod dns;
pub mod doh;
pub mod fetch;

pub use dns::{DnsLookup, DnsLookupFactory};
pub use doh::{DohLookup, DohLookupFactory};
pub use fetch::{HttpFetcher, HttpFetcherFactory};

use nawala_core::ProbeRegistry;
use nawala_core::model::ResolverKind;
use nawala_core::registry::DEFAULT_FETCHER;

/// Register the lookups for every resolver kind and the default fetcher
pub fn register(registry: &mut ProbeRegistry) {
    registry.register_lookup(ResolverKind::Dns, Box::new(DnsLookupFactory));
    registry.register_lookup(ResolverKind::Doh, Box::new(DohLookupFactory));
    registry.register_lookup(ResolverKind::Dot, Box::new(DohLookupFactory));
    registry.register_fetcher(DEFAULT_FETCHER, Box::new(HttpFetcherFactory));
}
