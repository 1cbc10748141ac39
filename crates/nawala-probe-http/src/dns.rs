// # Classic DNS Lookup
//
// Queries the resolver's own nameserver for an `A` record, bypassing the
// system resolver configuration. A censoring ISP resolver answers with its
// sinkhole address here, which is exactly what the probe wants to see.

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{Resolver as HickoryResolver, TokioResolver};
use nawala_core::config::ProbeConfig;
use nawala_core::model::Resolver;
use nawala_core::traits::{NameLookup, NameLookupFactory};
use nawala_core::{Error, Result};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::debug;

/// Name lookup against one specific nameserver
#[derive(Debug, Clone)]
pub struct DnsLookup {
    timeout: Duration,
    default_port: u16,
}

impl DnsLookup {
    /// Create a lookup from probe configuration
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.lookup_timeout_ms),
            default_port: config.default_dns_port,
        }
    }

    /// Nameserver address of `resolver`
    ///
    /// Accepts `ip` or `ip:port`; an explicit `resolver.port` wins over both.
    pub fn nameserver(&self, resolver: &Resolver) -> Result<SocketAddr> {
        let address = resolver.address.trim();

        let socket = if let Ok(socket) = address.parse::<SocketAddr>() {
            socket
        } else {
            let ip = address
                .trim_start_matches('[')
                .trim_end_matches(']')
                .parse::<IpAddr>()
                .map_err(|_| {
                    Error::invalid_input(format!(
                        "DNS resolver {} address '{}' is not an IP address",
                        resolver.id, resolver.address
                    ))
                })?;
            SocketAddr::new(ip, self.default_port)
        };

        Ok(match resolver.port {
            Some(port) => SocketAddr::new(socket.ip(), port),
            None => socket,
        })
    }

    fn build_resolver(&self, nameserver: SocketAddr) -> TokioResolver {
        let servers =
            NameServerConfigGroup::from_ips_clear(&[nameserver.ip()], nameserver.port(), true);
        let config = ResolverConfig::from_parts(None, vec![], servers);

        let mut builder =
            HickoryResolver::builder_with_config(config, TokioConnectionProvider::default());
        let options: &mut ResolverOpts = builder.options_mut();
        options.timeout = self.timeout;
        options.attempts = 1;
        builder.build()
    }
}

#[async_trait]
impl NameLookup for DnsLookup {
    async fn lookup(&self, host: &str, resolver: &Resolver) -> Result<Option<IpAddr>> {
        let nameserver = self.nameserver(resolver)?;
        let dns = self.build_resolver(nameserver);

        debug!(resolver_id = resolver.id, "Resolving {} via {}", host, nameserver);

        let answers = dns
            .ipv4_lookup(host)
            .await
            .map_err(|e| Error::lookup(format!("{} via {}: {}", host, nameserver, e)))?;

        Ok(answers.iter().next().map(|a| IpAddr::V4(a.0)))
    }

    fn lookup_name(&self) -> &'static str {
        "dns"
    }
}

/// Factory for [`DnsLookup`]
pub struct DnsLookupFactory;

impl NameLookupFactory for DnsLookupFactory {
    fn create(&self, config: &ProbeConfig) -> Result<Box<dyn NameLookup>> {
        config.validate()?;
        Ok(Box::new(DnsLookup::new(config)))
    }
}
