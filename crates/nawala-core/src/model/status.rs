// # Probe Status
//
// The closed status vocabulary shared by check results, targets and
// shortlink candidates. Serialized in the SCREAMING_SNAKE_CASE form used by
// stored rows and notification payloads (`OK`, `DNS_FILTERED`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification of one probe attempt, or the fused verdict of many
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeStatus {
    /// Resolved and fetched, no block indicators
    Ok,
    /// Resolver answered with a known sinkhole address
    DnsFiltered,
    /// Response body carried a block-page indicator
    HttpBlockpage,
    /// TLS handshake interfered with by SNI filtering
    HttpsSniBlock,
    /// Fetch failed without a more specific cause
    Timeout,
    /// Connection reset by peer
    Rst,
    /// Fetched, but the HTTP status is outside `[200, 400)`
    Inconclusive,
    /// No verdict available
    #[default]
    Unknown,
}

impl ProbeStatus {
    /// Every status, in declaration order
    pub const ALL: [ProbeStatus; 8] = [
        ProbeStatus::Ok,
        ProbeStatus::DnsFiltered,
        ProbeStatus::HttpBlockpage,
        ProbeStatus::HttpsSniBlock,
        ProbeStatus::Timeout,
        ProbeStatus::Rst,
        ProbeStatus::Inconclusive,
        ProbeStatus::Unknown,
    ];

    /// Wire name of the status
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeStatus::Ok => "OK",
            ProbeStatus::DnsFiltered => "DNS_FILTERED",
            ProbeStatus::HttpBlockpage => "HTTP_BLOCKPAGE",
            ProbeStatus::HttpsSniBlock => "HTTPS_SNI_BLOCK",
            ProbeStatus::Timeout => "TIMEOUT",
            ProbeStatus::Rst => "RST",
            ProbeStatus::Inconclusive => "INCONCLUSIVE",
            ProbeStatus::Unknown => "UNKNOWN",
        }
    }

    /// Whether the status counts toward the "blocked" side of fusion
    pub fn is_blocked(&self) -> bool {
        matches!(
            self,
            ProbeStatus::DnsFiltered
                | ProbeStatus::HttpBlockpage
                | ProbeStatus::HttpsSniBlock
                | ProbeStatus::Rst
        )
    }

    /// Tie-break rank used by fusion; lower wins
    ///
    /// `DNS_FILTERED > HTTP_BLOCKPAGE > HTTPS_SNI_BLOCK > RST > TIMEOUT >
    /// INCONCLUSIVE > UNKNOWN > OK`
    pub fn severity_rank(&self) -> u8 {
        match self {
            ProbeStatus::DnsFiltered => 0,
            ProbeStatus::HttpBlockpage => 1,
            ProbeStatus::HttpsSniBlock => 2,
            ProbeStatus::Rst => 3,
            ProbeStatus::Timeout => 4,
            ProbeStatus::Inconclusive => 5,
            ProbeStatus::Unknown => 6,
            ProbeStatus::Ok => 7,
        }
    }
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProbeStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProbeStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::Error::invalid_input(format!("Unknown probe status: {}", s)))
    }
}
