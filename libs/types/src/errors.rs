//! Error types for the market data relay
//!
//! Comprehensive error taxonomy using thiserror. "No matching series" is
//! deliberately absent: an empty history is a result, not an error.

use thiserror::Error;

/// Top-level relay error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    /// Time-series backend or bus connection lost, or a query failed
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend query timed out after {timeout_ms}ms")]
    BackendTimeout { timeout_ms: u64 },

    /// Upstream envelope failed to decode; the whole message is dropped
    #[error("Malformed upstream message: {0}")]
    MalformedUpstreamMessage(String),

    /// One key's update failed to decode; other keys still apply
    #[error("Invalid update for key {key}: {reason}")]
    InvalidUpdate { key: String, reason: String },

    #[error("Downstream send failed for client {client_id}")]
    DownstreamSendFailure { client_id: String },

    #[error("Invalid time bound: {0}")]
    InvalidTimeBound(String),
}

impl RelayError {
    /// Whether the error came from an external collaborator rather than input.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            RelayError::BackendUnavailable(_) | RelayError::BackendTimeout { .. }
        )
    }
}
