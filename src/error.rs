//! Error taxonomy for the gateway.

use crate::types::Purpose;
use std::path::PathBuf;
use thiserror::Error;

/// Missing or unusable credentials. Startup-class; never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("no completion credentials configured for purpose '{0}' and no general fallback")]
    MissingCredentials(Purpose),

    #[error("invalid completion client configuration for purpose '{purpose}': {reason}")]
    InvalidClient { purpose: Purpose, reason: String },
}

/// Any failure from the remote completion call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("completion request timed out")]
    Timeout,

    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion transport error: {0}")]
    Transport(String),

    #[error("failed to decode completion response: {0}")]
    Decode(String),

    #[error("completion response contained no content")]
    EmptyResponse,

    #[error("completion stream ended without a finish marker")]
    Truncated,
}

impl UpstreamError {
    /// Whether the upstream transport gave up waiting.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Cache I/O failures other than the expected "file absent" miss.
#[derive(Error, Debug)]
pub enum CacheIoError {
    #[error("failed to read cache entry {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache entry {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write cache entry {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors surfaced by gateway operations.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("invalid input ({context}): {reason}")]
    InvalidInput { context: String, reason: String },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("completion failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: UpstreamError,
    },

    /// Shown to users through the `common.service_busy` message.
    #[error("completion service did not respond in time")]
    ServiceBusy,
}

impl GatewayError {
    /// The upstream failure behind this error, if any.
    pub fn upstream(&self) -> Option<&UpstreamError> {
        match self {
            Self::Upstream(e) => Some(e),
            Self::RetriesExhausted { last, .. } => Some(last),
            _ => None,
        }
    }

    /// True when the remote service timed out, directly or on the last retry.
    pub fn is_timeout(&self) -> bool {
        self.upstream().map(UpstreamError::is_timeout).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_visible_through_retry_exhaustion() {
        let err = GatewayError::RetriesExhausted {
            attempts: 3,
            last: UpstreamError::Timeout,
        };
        assert!(err.is_timeout());
        assert!(!GatewayError::ServiceBusy.is_timeout());
    }

    #[test]
    fn missing_credentials_names_the_purpose() {
        let err = ConfigurationError::MissingCredentials(Purpose::UrlSafety);
        assert!(err.to_string().contains("url_safety"));
    }
}
