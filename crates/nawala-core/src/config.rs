//! Configuration types for the probe engine
//!
//! This module defines all configuration structures used throughout the crate.
//! Every section has serde defaults so a partial document (or none at all)
//! yields a runnable configuration.

use serde::{Deserialize, Serialize};

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NawalaConfig {
    /// Block-signal lists
    #[serde(default)]
    pub detector: DetectorConfig,

    /// Per-probe network settings
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Orchestration settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

impl NawalaConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.probe.validate()?;
        self.engine.validate()?;
        self.store.validate()?;
        Ok(())
    }
}

/// Lists used to recognise censorship artefacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Sinkhole address prefixes (string prefix match)
    #[serde(default = "default_blocked_ip_prefixes")]
    pub blocked_ip_prefixes: Vec<String>,

    /// Block-page phrases (case-insensitive substring match)
    #[serde(default = "default_blockpage_phrases")]
    pub blockpage_phrases: Vec<String>,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            blocked_ip_prefixes: default_blocked_ip_prefixes(),
            blockpage_phrases: default_blockpage_phrases(),
        }
    }
}

fn default_blocked_ip_prefixes() -> Vec<String> {
    ["103.10.66.", "36.86.63.", "202.67.40."]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_blockpage_phrases() -> Vec<String> {
    [
        "Internet Positif",
        "Situs ini diblokir",
        "This site is blocked",
        "Nawala",
        "Trust Positif",
        "Kominfo",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Network settings for a single probe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Name lookup timeout (milliseconds)
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    /// Page fetch timeout (milliseconds)
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Upper bound on the bytes read from a response body
    ///
    /// Block pages are small; anything beyond this is not inspected.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// User-Agent sent with fetches
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Skip certificate verification on fetches
    ///
    /// Interception proxies serve their own certificates; the probe must
    /// still see the block page behind them.
    #[serde(default = "default_true")]
    pub accept_invalid_certs: bool,

    /// Port used for `dns` resolvers without an explicit port
    #[serde(default = "default_dns_port")]
    pub default_dns_port: u16,
}

impl ProbeConfig {
    /// Validate the probe configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.lookup_timeout_ms == 0 {
            return Err(crate::Error::config("Lookup timeout must be > 0"));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(crate::Error::config("Fetch timeout must be > 0"));
        }
        if self.max_body_bytes == 0 {
            return Err(crate::Error::config("Max body bytes must be > 0"));
        }
        Ok(())
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            lookup_timeout_ms: default_lookup_timeout_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_body_bytes: default_max_body_bytes(),
            user_agent: default_user_agent(),
            accept_invalid_certs: true,
            default_dns_port: default_dns_port(),
        }
    }
}

fn default_lookup_timeout_ms() -> u64 {
    5_000
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

fn default_user_agent() -> String {
    concat!("nawala/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_dns_port() -> u16 {
    53
}

fn default_true() -> bool {
    true
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on one resolver probe, covering lookup and fetch (seconds)
    ///
    /// A probe still running when it elapses is abandoned and left out of
    /// fusion.
    #[serde(default = "default_probe_envelope_secs")]
    pub probe_envelope_secs: u64,

    /// Maximum number of targets checked concurrently by a sweep
    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,

    /// Check interval for targets with no target or group override (seconds)
    #[serde(default = "default_check_interval_secs")]
    pub default_check_interval_secs: u64,

    /// Confidence written on each stored check result
    #[serde(default = "default_result_confidence")]
    pub result_confidence: u8,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.probe_envelope_secs == 0 {
            return Err(crate::Error::config("Probe envelope must be > 0"));
        }
        if self.max_concurrent_checks == 0 {
            return Err(crate::Error::config("Max concurrent checks must be > 0"));
        }
        if self.default_check_interval_secs == 0 {
            return Err(crate::Error::config("Default check interval must be > 0"));
        }
        if self.result_confidence > 100 {
            return Err(crate::Error::config("Result confidence must be <= 100"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            probe_envelope_secs: default_probe_envelope_secs(),
            max_concurrent_checks: default_max_concurrent_checks(),
            default_check_interval_secs: default_check_interval_secs(),
            result_confidence: default_result_confidence(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_probe_envelope_secs() -> u64 {
    20
}

fn default_max_concurrent_checks() -> usize {
    4
}

fn default_check_interval_secs() -> u64 {
    300
}

fn default_result_confidence() -> u8 {
    100
}

fn default_event_channel_capacity() -> usize {
    1000
}

/// Store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// JSON file store
    File {
        /// Path to the data file
        path: String,
    },
}

impl StoreConfig {
    /// Registry name of the store type
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::File { .. } => "file",
        }
    }

    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.trim().is_empty() => {
                Err(crate::Error::config("File store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = NawalaConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.probe_envelope_secs, 20);
        assert_eq!(config.detector.blocked_ip_prefixes.len(), 3);
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: NawalaConfig =
            serde_json::from_str(r#"{"store": {"type": "file", "path": "/tmp/n.json"}}"#).unwrap();
        assert_eq!(config.store.type_name(), "file");
        assert_eq!(config.probe.fetch_timeout_ms, 10_000);
        assert_eq!(config.detector.blockpage_phrases.len(), 6);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = NawalaConfig::default();
        config.engine.max_concurrent_checks = 0;
        assert!(config.validate().is_err());

        let config = NawalaConfig {
            store: StoreConfig::File {
                path: "  ".to_string(),
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
