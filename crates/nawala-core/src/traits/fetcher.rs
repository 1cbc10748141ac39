// # Page Fetcher Trait
//
// Performs the HTTP(S) request half of a probe.
//
// Failures are returned as a tagged [`FetchFailure`] so the prober can tell a
// connection reset from a timeout without parsing error text. Implementations
// classify at the network boundary and fall back to
// [`FetchFailure::classify_message`] only for opaque third-party errors.

use async_trait::async_trait;
use std::fmt;

use crate::config::ProbeConfig;

/// A completed HTTP exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// HTTP status code
    pub status: u16,
    /// Response body, possibly truncated to the configured limit
    pub body: String,
}

/// Why a fetch did not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// Connection reset or aborted by the peer
    Reset(String),
    /// The request timed out
    Timeout(String),
    /// Any other transport failure (refused, TLS, unreachable, ...)
    Other(String),
}

impl FetchFailure {
    /// Classify free-form error text
    ///
    /// Used only when the underlying error carries no structured kind.
    pub fn classify_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("reset") || message.contains("RST") {
            FetchFailure::Reset(message)
        } else if lower.contains("timed out") || lower.contains("timeout") {
            FetchFailure::Timeout(message)
        } else {
            FetchFailure::Other(message)
        }
    }

    /// Underlying error text
    pub fn message(&self) -> &str {
        match self {
            FetchFailure::Reset(m) | FetchFailure::Timeout(m) | FetchFailure::Other(m) => m,
        }
    }

    /// Whether the peer reset the connection
    pub fn is_reset(&self) -> bool {
        matches!(self, FetchFailure::Reset(_))
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Reset(m) => write!(f, "connection reset: {}", m),
            FetchFailure::Timeout(m) => write!(f, "timed out: {}", m),
            FetchFailure::Other(m) => f.write_str(m),
        }
    }
}

impl std::error::Error for FetchFailure {}

/// Trait for page fetcher implementations
///
/// # Contract
///
/// - Follow redirects; report the final status code
/// - Enforce the configured fetch timeout
/// - Read at most `max_body_bytes` of the body (block pages are small)
/// - Honour `accept_invalid_certs`: interception proxies present their own
///   certificates and must not turn a block page into a failure
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchFailure>;

    /// Short name used in logs
    fn fetcher_name(&self) -> &'static str;
}

/// Helper trait for constructing fetchers from configuration
pub trait PageFetcherFactory: Send + Sync {
    /// Create a PageFetcher instance from configuration
    fn create(&self, config: &ProbeConfig) -> Result<Box<dyn PageFetcher>, crate::Error>;
}
