//! Single-resolver prober
//!
//! Resolves the target's host through one resolver, stops at a sinkhole
//! answer, otherwise fetches the page and classifies the response:
//!
//! | Observation                              | Status           |
//! |------------------------------------------|------------------|
//! | resolved address has a sinkhole prefix   | `DNS_FILTERED`   |
//! | body contains a block-page phrase        | `HTTP_BLOCKPAGE` |
//! | HTTP status in `[200, 400)`              | `OK`             |
//! | any other HTTP status                    | `INCONCLUSIVE`   |
//! | connection reset                         | `RST`            |
//! | any other fetch failure                  | `TIMEOUT`        |
//!
//! A failed lookup is not a verdict: the fetch still runs and decides.
//! `HTTPS_SNI_BLOCK` is part of the vocabulary but no observation here maps to
//! it; custom probers may produce it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::detector::BlockSignalDetector;
use crate::model::{ProbeStatus, Resolver, ResolverKind, extract_hostname, with_default_scheme};
use crate::traits::{FetchFailure, NameLookup, PageFetcher, ProbeOutcome, Prober};
use crate::{Error, Result};

/// The built-in prober: one lookup plus one fetch per call
pub struct SignalProber {
    detector: BlockSignalDetector,
    lookups: HashMap<ResolverKind, Arc<dyn NameLookup>>,
    fetcher: Arc<dyn PageFetcher>,
}

impl SignalProber {
    /// Create a prober with no lookups registered
    pub fn new(detector: BlockSignalDetector, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            detector,
            lookups: HashMap::new(),
            fetcher,
        }
    }

    /// Use `lookup` for resolvers of `kind`
    pub fn with_lookup(mut self, kind: ResolverKind, lookup: Arc<dyn NameLookup>) -> Self {
        self.lookups.insert(kind, lookup);
        self
    }

    async fn resolve(
        &self,
        lookup: &dyn NameLookup,
        host: Option<&str>,
        resolver: &Resolver,
    ) -> Option<IpAddr> {
        let host = host?;
        match lookup.lookup(host, resolver).await {
            Ok(ip) => ip,
            Err(e) => {
                debug!(
                    "Lookup of {} via {} ({}) failed: {}",
                    host,
                    resolver.address,
                    lookup.lookup_name(),
                    e
                );
                None
            }
        }
    }

    async fn fetch_and_classify(&self, url: &str) -> (ProbeStatus, Option<u16>, Option<String>) {
        match self.fetcher.fetch(url).await {
            Ok(page) => {
                if self.detector.is_block_page_body(&page.body) {
                    (
                        ProbeStatus::HttpBlockpage,
                        Some(page.status),
                        Some("Block page detected".to_string()),
                    )
                } else if (200..400).contains(&page.status) {
                    (ProbeStatus::Ok, Some(page.status), None)
                } else {
                    (
                        ProbeStatus::Inconclusive,
                        Some(page.status),
                        Some(format!("HTTP {}", page.status)),
                    )
                }
            }
            Err(FetchFailure::Reset(message)) => {
                debug!("Fetch of {} reset: {}", url, message);
                (ProbeStatus::Rst, None, Some("Connection reset".to_string()))
            }
            Err(failure) => (ProbeStatus::Timeout, None, Some(failure.message().to_string())),
        }
    }
}

#[async_trait]
impl Prober for SignalProber {
    async fn probe(&self, domain_or_url: &str, resolver: &Resolver) -> Result<ProbeOutcome> {
        let lookup = self.lookups.get(&resolver.kind).cloned().ok_or_else(|| {
            Error::probe(format!("No lookup registered for resolver kind '{}'", resolver.kind))
        })?;

        let started = Instant::now();

        let host = match extract_hostname(domain_or_url) {
            Ok(host) => Some(host),
            Err(e) => {
                debug!("Skipping lookup: {}", e);
                None
            }
        };
        let resolved_ip = self.resolve(lookup.as_ref(), host.as_deref(), resolver).await;

        let (status, http_status, error) = match resolved_ip {
            Some(ip) if self.detector.is_blocked_address(&ip.to_string()) => (
                ProbeStatus::DnsFiltered,
                None,
                Some(format!("Resolved to blocked address {}", ip)),
            ),
            _ => self.fetch_and_classify(&with_default_scheme(domain_or_url)).await,
        };

        Ok(ProbeOutcome {
            status,
            response_time_ms: round_ms(started.elapsed().as_secs_f64() * 1000.0),
            resolved_ip,
            http_status,
            error,
        })
    }
}

fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::FetchedPage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedLookup(Option<IpAddr>);

    #[async_trait]
    impl NameLookup for FixedLookup {
        async fn lookup(&self, _host: &str, _resolver: &Resolver) -> Result<Option<IpAddr>> {
            Ok(self.0)
        }

        fn lookup_name(&self) -> &'static str {
            "fixed"
        }
    }

    struct FailingLookup;

    #[async_trait]
    impl NameLookup for FailingLookup {
        async fn lookup(&self, _host: &str, _resolver: &Resolver) -> Result<Option<IpAddr>> {
            Err(Error::lookup("SERVFAIL"))
        }

        fn lookup_name(&self) -> &'static str {
            "failing"
        }
    }

    struct FixedFetcher {
        result: std::result::Result<FetchedPage, FetchFailure>,
        calls: AtomicUsize,
        last_url: std::sync::Mutex<Option<String>>,
    }

    impl FixedFetcher {
        fn new(result: std::result::Result<FetchedPage, FetchFailure>) -> Arc<Self> {
            Arc::new(Self {
                result,
                calls: AtomicUsize::new(0),
                last_url: std::sync::Mutex::new(None),
            })
        }

        fn page(status: u16, body: &str) -> Arc<Self> {
            Self::new(Ok(FetchedPage {
                status,
                body: body.to_string(),
            }))
        }
    }

    #[async_trait]
    impl PageFetcher for FixedFetcher {
        async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_url.lock().unwrap() = Some(url.to_string());
            self.result.clone()
        }

        fn fetcher_name(&self) -> &'static str {
            "fixed"
        }
    }

    fn prober(lookup: Arc<dyn NameLookup>, fetcher: Arc<FixedFetcher>) -> SignalProber {
        SignalProber::new(BlockSignalDetector::default(), fetcher)
            .with_lookup(ResolverKind::Dns, lookup.clone())
            .with_lookup(ResolverKind::Doh, lookup)
    }

    fn resolver() -> Resolver {
        Resolver::new(1, ResolverKind::Dns, "8.8.8.8")
    }

    fn ip(s: &str) -> Option<IpAddr> {
        Some(s.parse().unwrap())
    }

    #[tokio::test]
    async fn test_sinkhole_answer_skips_fetch() {
        let fetcher = FixedFetcher::page(200, "fine");
        let prober = prober(Arc::new(FixedLookup(ip("103.10.66.7"))), fetcher.clone());

        let outcome = prober.probe("blocked.example", &resolver()).await.unwrap();
        assert_eq!(outcome.status, ProbeStatus::DnsFiltered);
        assert_eq!(outcome.resolved_ip, ip("103.10.66.7"));
        assert_eq!(outcome.http_status, None);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_clean_page_is_ok() {
        let fetcher = FixedFetcher::page(301, "<html>moved</html>");
        let prober = prober(Arc::new(FixedLookup(ip("93.184.216.34"))), fetcher.clone());

        let outcome = prober.probe("example.com", &resolver()).await.unwrap();
        assert_eq!(outcome.status, ProbeStatus::Ok);
        assert_eq!(outcome.http_status, Some(301));
        assert_eq!(outcome.error, None);
        assert_eq!(
            fetcher.last_url.lock().unwrap().as_deref(),
            Some("https://example.com")
        );
    }

    #[tokio::test]
    async fn test_block_page_body() {
        let fetcher = FixedFetcher::page(200, "<h1>Internet Positif</h1>");
        let prober = prober(Arc::new(FixedLookup(ip("93.184.216.34"))), fetcher);

        let outcome = prober.probe("example.com", &resolver()).await.unwrap();
        assert_eq!(outcome.status, ProbeStatus::HttpBlockpage);
        assert_eq!(outcome.http_status, Some(200));
    }

    #[tokio::test]
    async fn test_error_status_is_inconclusive() {
        let fetcher = FixedFetcher::page(503, "unavailable");
        let prober = prober(Arc::new(FixedLookup(None)), fetcher);

        let outcome = prober.probe("http://example.com/x", &resolver()).await.unwrap();
        assert_eq!(outcome.status, ProbeStatus::Inconclusive);
        assert_eq!(outcome.http_status, Some(503));
        assert_eq!(outcome.error.as_deref(), Some("HTTP 503"));
    }

    #[tokio::test]
    async fn test_fetch_failures() {
        let reset = FixedFetcher::new(Err(FetchFailure::Reset("os error 104".into())));
        let outcome = prober(Arc::new(FixedLookup(None)), reset)
            .probe("example.com", &resolver())
            .await
            .unwrap();
        assert_eq!(outcome.status, ProbeStatus::Rst);

        let refused = FixedFetcher::new(Err(FetchFailure::Other("connection refused".into())));
        let outcome = prober(Arc::new(FixedLookup(None)), refused)
            .probe("example.com", &resolver())
            .await
            .unwrap();
        assert_eq!(outcome.status, ProbeStatus::Timeout);
        assert_eq!(outcome.error.as_deref(), Some("connection refused"));
    }

    #[tokio::test]
    async fn test_lookup_failure_still_fetches() {
        let fetcher = FixedFetcher::page(200, "ok");
        let prober = prober(Arc::new(FailingLookup), fetcher.clone());

        let outcome = prober.probe("example.com", &resolver()).await.unwrap();
        assert_eq!(outcome.status, ProbeStatus::Ok);
        assert_eq!(outcome.resolved_ip, None);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_an_error() {
        let prober = prober(Arc::new(FixedLookup(None)), FixedFetcher::page(200, ""));
        let dot = Resolver::new(2, ResolverKind::Dot, "https://dot.example/resolve");
        assert!(prober.probe("example.com", &dot).await.is_err());
    }

    #[test]
    fn test_round_ms() {
        assert_eq!(round_ms(12.3456), 12.35);
        assert_eq!(round_ms(0.004), 0.0);
    }
}
