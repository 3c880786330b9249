//! Error types for proxy operations.
//!
//! - Server errors (binding, accept, HTTP serving)
//! - Upstream errors (connect, request forwarding, upgrades)
//! - Request body errors while buffering for the interception hook

use thiserror::Error;

/// Unified error type for proxy operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// I/O error (socket operations).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Hyper HTTP error.
    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    /// Failed to bind the listening socket.
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        /// The address we tried to bind.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to reach or talk to the upstream daemon.
    #[error("Upstream request to '{addr}' failed: {message}")]
    Upstream {
        /// The upstream authority.
        addr: String,
        /// Error message.
        message: String,
    },

    /// Could not read the request body.
    #[error("Failed to read request body: {0}")]
    Body(String),

    /// The rewritten request could not be assembled.
    #[error("Invalid forwarded request: {0}")]
    InvalidRequest(String),

    /// Upgrade to a raw stream failed.
    #[error("HTTP upgrade failed: {0}")]
    UpgradeFailed(String),
}

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

impl From<http::Error> for ProxyError {
    fn from(err: http::Error) -> Self {
        ProxyError::InvalidRequest(err.to_string())
    }
}
