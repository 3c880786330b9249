//! Audit trail for dockbridge.
//!
//! Payload rewrites and bridge lifecycle events are written as JSON to syslog
//! with the `DOCKBRIDGE` tag, separate from the `tracing` diagnostics on stderr.
//!
//! # Event Format
//!
//! ```json
//! {"ts":"2026-01-07T14:32:01Z","event":"bind_rewrite","original":"C:\\data:/app","rewritten":"/mnt/hgfs/docker/volumes/C/data:/app"}
//! ```

mod audit;
mod error;
mod events;

pub use audit::{AuditLogger, SYSLOG_TAG};
pub use error::TelemetryError;
pub use events::{AuditEvent, TimestampedEvent};
