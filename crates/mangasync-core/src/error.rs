//! Error types for the mangasync system
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for mangasync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the mangasync system
#[derive(Error, Debug)]
pub enum Error {
    /// Connection, timeout, or other transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// The session token was rejected (HTTP 401)
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    /// Login or token refresh failed outright
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The upstream asked us to slow down (HTTP 429)
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Unexpected response payload
    #[error("Decode error: {0}")]
    Decode(String),

    /// Non-success HTTP status that is not covered by a dedicated variant
    #[error("HTTP error ({status}): {message}")]
    Http {
        /// Status code returned by the upstream
        status: u16,
        /// Response body or short description
        message: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Another run holds the run lock
    #[error("A reconciliation run is already in progress")]
    RunInProgress,

    /// The run did not finish before its deadline
    #[error("Run deadline of {0:?} exceeded")]
    DeadlineExceeded(std::time::Duration),
}

impl Error {
    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create an authorization-expired error
    pub fn auth_expired(msg: impl Into<String>) -> Self {
        Self::AuthExpired(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create an HTTP status error
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Map a non-success HTTP status onto the error taxonomy.
    ///
    /// Shared by every HTTP-backed client so that 401 and 429 always reach the
    /// [`RecoveryPolicy`](crate::recovery::RecoveryPolicy) as the variants it
    /// knows how to recover from.
    pub fn from_status(status: u16, context: &str, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            401 => Self::AuthExpired(format!("{context}: {body}")),
            429 => Self::RateLimited(format!("{context}: {body}")),
            _ => Self::Http {
                status,
                message: format!("{context}: {body}"),
            },
        }
    }
}
