// src/core/errors.rs

//! Defines the primary error type for the entire crate.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing every failure the synchronization layer can report.
///
/// Only `connect`, `subscribe` and the one-shot helpers surface these to callers.
/// Failures inside background tasks travel on the session's fault channel instead.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Unrecognized context, malformed endpoint or invalid settings. Raised before any I/O.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport or handshake failure while establishing a session.
    #[error("Connection error: {0}")]
    Connect(String),

    /// A single fetch from the data source failed. Recoverable.
    #[error("Fetch failed for '{key}': {reason}")]
    Fetch { key: String, reason: String },

    /// A single update could not be decoded. Recoverable.
    #[error("Decode failed for '{key}': {reason}")]
    Decode { key: String, reason: String },

    /// The data source will never serve this key again. Fatal for the owning task.
    #[error("Data source unavailable for '{key}': {reason}")]
    SourceUnavailable { key: String, reason: String },

    #[error("Update stream for '{0}' closed")]
    StreamClosed(String),

    #[error("Unknown key '{0}'")]
    UnknownKey(String),

    #[error("Session is shut down")]
    SessionClosed,

    #[error("Step size cannot be zero")]
    ZeroStepSize,

    #[error("Arithmetic overflow while standardizing {0}")]
    Overflow(u64),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Returns true if a background task must stop after seeing this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::SourceUnavailable { .. })
    }

    /// Returns true for failures detected before any network attempt.
    pub fn is_config(&self) -> bool {
        matches!(self, SyncError::Config(_))
    }

    pub fn is_connect(&self) -> bool {
        matches!(self, SyncError::Connect(_))
    }
}

// Manual implementation of Clone because `std::io::Error` is not cloneable.
// It is wrapped in an Arc so clones stay cheap.
impl Clone for SyncError {
    fn clone(&self) -> Self {
        match self {
            SyncError::Config(s) => SyncError::Config(s.clone()),
            SyncError::Connect(s) => SyncError::Connect(s.clone()),
            SyncError::Fetch { key, reason } => SyncError::Fetch {
                key: key.clone(),
                reason: reason.clone(),
            },
            SyncError::Decode { key, reason } => SyncError::Decode {
                key: key.clone(),
                reason: reason.clone(),
            },
            SyncError::SourceUnavailable { key, reason } => SyncError::SourceUnavailable {
                key: key.clone(),
                reason: reason.clone(),
            },
            SyncError::StreamClosed(s) => SyncError::StreamClosed(s.clone()),
            SyncError::UnknownKey(s) => SyncError::UnknownKey(s.clone()),
            SyncError::SessionClosed => SyncError::SessionClosed,
            SyncError::ZeroStepSize => SyncError::ZeroStepSize,
            SyncError::Overflow(v) => SyncError::Overflow(*v),
            SyncError::InvalidAddress(s) => SyncError::InvalidAddress(s.clone()),
            SyncError::InvalidUrl(s) => SyncError::InvalidUrl(s.clone()),
            SyncError::Io(e) => SyncError::Io(Arc::clone(e)),
            SyncError::Internal(s) => SyncError::Internal(s.clone()),
        }
    }
}

impl PartialEq for SyncError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (SyncError::Config(a), SyncError::Config(b)) => a == b,
            (SyncError::Connect(a), SyncError::Connect(b)) => a == b,
            (
                SyncError::Fetch { key: k1, reason: r1 },
                SyncError::Fetch { key: k2, reason: r2 },
            ) => k1 == k2 && r1 == r2,
            (
                SyncError::Decode { key: k1, reason: r1 },
                SyncError::Decode { key: k2, reason: r2 },
            ) => k1 == k2 && r1 == r2,
            (
                SyncError::SourceUnavailable { key: k1, reason: r1 },
                SyncError::SourceUnavailable { key: k2, reason: r2 },
            ) => k1 == k2 && r1 == r2,
            (SyncError::StreamClosed(a), SyncError::StreamClosed(b)) => a == b,
            (SyncError::UnknownKey(a), SyncError::UnknownKey(b)) => a == b,
            (SyncError::Overflow(a), SyncError::Overflow(b)) => a == b,
            (SyncError::InvalidAddress(a), SyncError::InvalidAddress(b)) => a == b,
            (SyncError::InvalidUrl(a), SyncError::InvalidUrl(b)) => a == b,
            (SyncError::Io(e1), SyncError::Io(e2)) => e1.to_string() == e2.to_string(),
            (SyncError::Internal(a), SyncError::Internal(b)) => a == b,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Io(Arc::new(e))
    }
}

impl From<url::ParseError> for SyncError {
    fn from(e: url::ParseError) -> Self {
        SyncError::InvalidUrl(e.to_string())
    }
}

impl From<hex::FromHexError> for SyncError {
    fn from(e: hex::FromHexError) -> Self {
        SyncError::InvalidAddress(e.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Internal(format!("JSON serialization/deserialization error: {e}"))
    }
}
