//! Telemetry error types.

use thiserror::Error;

/// Errors that can occur while setting up the audit trail.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// Failed to connect to syslog.
    #[error("Failed to connect to syslog: {0}")]
    SyslogConnection(String),

    /// Failed to serialize event to JSON.
    #[error("Failed to serialize event: {0}")]
    SerializationError(#[from] serde_json::Error),
}
