//! Error types for the fallible boundaries of the router
//!
//! None of these escape the public classification entry points. They exist so
//! backends, history stores and config loaders can report *why* they failed,
//! which the callers then fold into a degraded result and a `warn!` line.

use std::time::Duration;
use thiserror::Error;

/// Errors from a chat-completion backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("response parse error: {0}")]
    ParseError(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not carry the configured duration on the error
            Self::Timeout(Duration::ZERO)
        } else if e.is_decode() {
            Self::ParseError(e.to_string())
        } else {
            Self::RequestFailed(e.to_string())
        }
    }
}

/// Errors from an outcome history store.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from loading router configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("delegation level {0} is out of range (expected 0-5)")]
    InvalidLevel(u8),
}

/// Result alias for history store operations.
pub type HistoryResult<T> = Result<T, HistoryError>;
