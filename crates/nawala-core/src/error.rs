//! Error types for the nawala engine
//!
//! Per-resolver probe failures never surface here: they are folded into a
//! [`ProbeStatus`](crate::model::ProbeStatus) by the prober. This enum covers
//! the failures that escape a single operation (storage, configuration,
//! missing records, lost races).

use thiserror::Error;

/// Result type alias for nawala operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the nawala engine
#[derive(Error, Debug)]
pub enum Error {
    /// Storage read or write failed
    #[error("Store error: {0}")]
    Store(String),

    /// Name resolution failed outside of the status machine
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// Page fetch failed outside of the status machine
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// A probe could not run at all (e.g. no lookup for the resolver kind)
    #[error("Probe error: {0}")]
    Probe(String),

    /// Notification delivery failed
    #[error("Notifier error ({notifier}): {message}")]
    Notifier {
        /// Notifier name
        notifier: String,
        /// Error message
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A concurrent writer changed the row first
    #[error("Conflict: {0}")]
    Conflict(String),

    /// An auto-rotation sweep is already running
    #[error("Auto-rotation sweep already in progress")]
    SweepInProgress,

    /// I/O errors (file store)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a lookup error
    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }

    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a probe error
    pub fn probe(msg: impl Into<String>) -> Self {
        Self::Probe(msg.into())
    }

    /// Create a notifier error
    pub fn notifier(notifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Notifier {
            notifier: notifier.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error is a lost optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
