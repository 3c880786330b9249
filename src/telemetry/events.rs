//! Audit event types for structured logging.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Audit events for the proxy and its bridges.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Proxy started accepting requests.
    ProxyStart {
        /// Local listen address.
        listen: String,
        /// Remote Docker daemon address.
        upstream: String,
        /// Destination path prefix for rewritten paths.
        base: String,
    },

    /// A bind entry was rewritten.
    BindRewrite {
        /// Entry as sent by the client.
        original: String,
        /// Entry as forwarded.
        rewritten: String,
    },

    /// An environment variable was rewritten.
    EnvRewrite {
        /// Variable as sent by the client.
        original: String,
        /// Variable as forwarded.
        rewritten: String,
    },

    /// A container-create body was replaced before forwarding.
    PayloadModified {
        /// Request path.
        path: String,
        /// Number of rewritten strings.
        rewrites: usize,
    },

    /// A bridge listener started.
    BridgeOpen {
        /// Port token from the payload.
        port: String,
        /// Bound local address.
        local: String,
        /// Remote endpoint.
        remote: String,
    },

    /// A bridge was abandoned before listening.
    BridgeSkip {
        /// Port token from the payload.
        port: String,
        /// Why the listener could not start.
        reason: String,
    },

    /// A bridge session could not reach the remote endpoint.
    BridgeDialFailed {
        /// Port token from the payload.
        port: String,
        /// Remote endpoint.
        remote: String,
        /// Connect error.
        reason: String,
    },
}

/// Wrapper for serializing events with timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct TimestampedEvent<'a> {
    /// ISO8601 timestamp.
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    /// The actual event (flattened into this struct).
    #[serde(flatten)]
    pub event: &'a AuditEvent,
}

impl AuditEvent {
    /// Wrap this event with a timestamp for serialization.
    pub fn with_timestamp(&self) -> TimestampedEvent<'_> {
        TimestampedEvent {
            timestamp: Utc::now(),
            event: self,
        }
    }
}
