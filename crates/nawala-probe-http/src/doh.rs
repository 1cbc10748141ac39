// # DNS-over-HTTPS Lookup
//
// Uses the JSON flavour of DoH (`?name=<host>&type=A` with
// `accept: application/dns-json`), served by Google, Cloudflare and most
// public resolvers. `dot` resolvers are queried through the same interface
// of their operator.

use async_trait::async_trait;
use nawala_core::config::ProbeConfig;
use nawala_core::model::Resolver;
use nawala_core::traits::{NameLookup, NameLookupFactory};
use nawala_core::{Error, Result};
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// JSON answer of a DoH endpoint
#[derive(Debug, Deserialize)]
struct DohResponse {
    /// DNS RCODE (0 = NOERROR)
    #[serde(rename = "Status", default)]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    data: String,
}

/// Name lookup through a DNS-over-HTTPS JSON endpoint
pub struct DohLookup {
    client: reqwest::Client,
}

impl DohLookup {
    /// Create a lookup from probe configuration
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.lookup_timeout_ms))
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| Error::config(format!("Failed to build DoH client: {}", e)))?;

        Ok(Self { client })
    }

    fn query_url(resolver: &Resolver, host: &str) -> Result<Url> {
        Url::parse_with_params(resolver.address.trim(), &[("name", host), ("type", "A")]).map_err(
            |e| {
                Error::invalid_input(format!(
                    "DoH resolver {} endpoint '{}' is not a URL: {}",
                    resolver.id, resolver.address, e
                ))
            },
        )
    }
}

#[async_trait]
impl NameLookup for DohLookup {
    async fn lookup(&self, host: &str, resolver: &Resolver) -> Result<Option<IpAddr>> {
        let url = Self::query_url(resolver, host)?;
        debug!(resolver_id = resolver.id, "Resolving {} via {}", host, url);

        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await
            .map_err(|e| Error::lookup(format!("DoH request for {} failed: {}", host, e)))?;

        if !response.status().is_success() {
            return Err(Error::lookup(format!(
                "DoH endpoint {} returned HTTP {}",
                resolver.address,
                response.status()
            )));
        }

        let answer: DohResponse = response
            .json()
            .await
            .map_err(|e| Error::lookup(format!("Invalid DoH answer for {}: {}", host, e)))?;

        if answer.status != 0 {
            debug!(
                resolver_id = resolver.id,
                "DoH answered {} with RCODE {}", host, answer.status
            );
            return Ok(None);
        }

        // CNAME entries precede the address records; skip them
        Ok(answer
            .answer
            .iter()
            .find_map(|a| a.data.trim().parse::<IpAddr>().ok()))
    }

    fn lookup_name(&self) -> &'static str {
        "doh"
    }
}

/// Factory for [`DohLookup`]
pub struct DohLookupFactory;

impl NameLookupFactory for DohLookupFactory {
    fn create(&self, config: &ProbeConfig) -> Result<Box<dyn NameLookup>> {
        config.validate()?;
        Ok(Box::new(DohLookup::new(config)?))
    }
}
