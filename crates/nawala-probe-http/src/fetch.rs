// # Page Fetcher
//
// HTTP(S) GET with relaxed certificate checks and a capped body read.
// Transport failures are classified from the error's source chain: an
// `io::Error` of kind `ConnectionReset`/`ConnectionAborted` anywhere in the
// chain is a reset, a reqwest timeout is a timeout. Only errors without a
// structured kind fall back to message matching.

use async_trait::async_trait;
use nawala_core::config::ProbeConfig;
use nawala_core::traits::{FetchFailure, FetchedPage, PageFetcher, PageFetcherFactory};
use nawala_core::{Error, Result};
use std::error::Error as StdError;
use std::io;
use std::time::Duration;
use tracing::debug;

/// Maximum redirects followed before the last response is reported
const MAX_REDIRECTS: usize = 10;

/// reqwest-backed page fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    /// Create a fetcher from probe configuration
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.fetch_timeout_ms))
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            max_body_bytes: config.max_body_bytes,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchFailure> {
        let mut response = self.client.get(url).send().await.map_err(classify)?;
        let status = response.status().as_u16();

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(classify)? {
            let remaining = self.max_body_bytes - body.len();
            if chunk.len() >= remaining {
                body.extend_from_slice(&chunk[..remaining]);
                debug!("Body of {} truncated at {} bytes", url, self.max_body_bytes);
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchedPage {
            status,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    fn fetcher_name(&self) -> &'static str {
        "http"
    }
}

/// Map a transport error onto a [`FetchFailure`]
fn classify(error: reqwest::Error) -> FetchFailure {
    let message = chain_message(&error);

    if error.is_timeout() {
        return FetchFailure::Timeout(message);
    }

    let mut source: Option<&(dyn StdError + 'static)> = Some(&error);
    while let Some(err) = source {
        if let Some(io_error) = err.downcast_ref::<io::Error>() {
            match io_error.kind() {
                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                    return FetchFailure::Reset(message);
                }
                io::ErrorKind::TimedOut => return FetchFailure::Timeout(message),
                _ => {}
            }
        }
        source = err.source();
    }

    FetchFailure::classify_message(message)
}

/// The error and all of its sources, joined
fn chain_message(error: &(dyn StdError + 'static)) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}

/// Factory for [`HttpFetcher`]
pub struct HttpFetcherFactory;

impl PageFetcherFactory for HttpFetcherFactory {
    fn create(&self, config: &ProbeConfig) -> Result<Box<dyn PageFetcher>> {
        config.validate()?;
        Ok(Box::new(HttpFetcher::new(config)?))
    }
}
