//! Error types for port bridging.
//!
//! None of these reach the proxied HTTP request; they are logged where they
//! occur and, for listener startup, reported through [`BridgeHandle::ready`].
//!
//! [`BridgeHandle::ready`]: super::BridgeHandle::ready

use std::time::Duration;
use thiserror::Error;

/// Errors from bridge listeners and sessions.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The host port token is not a usable TCP port.
    #[error("Invalid host port '{0}'")]
    InvalidPort(String),

    /// Failed to listen on the local endpoint.
    #[error("Failed to listen on {addr}: {source}")]
    ListenFailed {
        /// The local address we tried to bind.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to connect to the remote endpoint.
    #[error("Failed to connect to {addr}: {source}")]
    ConnectFailed {
        /// The remote address we tried to reach.
        addr: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The remote endpoint did not accept within the dial timeout.
    #[error("Timed out connecting to {addr} after {timeout:?}")]
    ConnectTimeout {
        /// The remote address we tried to reach.
        addr: String,
        /// The dial bound that elapsed.
        timeout: Duration,
    },

    /// The listener task ended before reporting whether it bound.
    #[error("Bridge listener for port {0} exited before starting")]
    ListenerGone(String),

    /// Shutdown was signalled before the operation completed.
    #[error("Bridge shut down")]
    Shutdown,
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
