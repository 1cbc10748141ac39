//! Blocked-signal detection
//!
//! Pure classification helpers: a sinkhole address prefix match and a
//! block-page phrase match. Both lists come from [`DetectorConfig`], so
//! operators extend them without a code change and tests substitute
//! fixtures.

use crate::config::DetectorConfig;

/// Matches resolver answers and response bodies against known block signals
#[derive(Debug, Clone)]
pub struct BlockSignalDetector {
    blocked_ip_prefixes: Vec<String>,
    /// Stored lowercased
    blockpage_phrases: Vec<String>,
}

impl BlockSignalDetector {
    /// Build a detector from explicit lists
    pub fn new<P, S>(blocked_ip_prefixes: P, blockpage_phrases: S) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        S: IntoIterator,
        S::Item: Into<String>,
    {
        Self {
            blocked_ip_prefixes: blocked_ip_prefixes
                .into_iter()
                .map(|p| Into::<String>::into(p).trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            blockpage_phrases: blockpage_phrases
                .into_iter()
                .map(|p| Into::<String>::into(p).trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Build a detector from configuration
    pub fn from_config(config: &DetectorConfig) -> Self {
        Self::new(
            config.blocked_ip_prefixes.iter().cloned(),
            config.blockpage_phrases.iter().cloned(),
        )
    }

    /// Whether `ip` starts with a known sinkhole prefix
    pub fn is_blocked_address(&self, ip: &str) -> bool {
        let ip = ip.trim();
        self.blocked_ip_prefixes
            .iter()
            .any(|prefix| ip.starts_with(prefix.as_str()))
    }

    /// Whether `body` contains a block-page phrase anywhere, ignoring case
    pub fn is_block_page_body(&self, body: &str) -> bool {
        if self.blockpage_phrases.is_empty() {
            return false;
        }
        let body = body.to_lowercase();
        self.blockpage_phrases
            .iter()
            .any(|phrase| body.contains(phrase.as_str()))
    }
}

impl Default for BlockSignalDetector {
    fn default() -> Self {
        Self::from_config(&DetectorConfig::default())
    }
}
