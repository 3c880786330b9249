//! dockbridge: Docker API proxy for a daemon running inside a VM
//!
//! A Windows host talks to a Docker daemon in a Linux VM. Host paths such as
//! `C:\Users\me\app` mean nothing to that daemon, and ports it publishes are
//! bound on the VM rather than on `localhost`. dockbridge sits between the
//! two and fixes both.
//!
//! # Architecture
//!
//! - **Proxy**: HTTP/1.1 reverse proxy to the VM daemon, with an interception
//!   hook for container-create requests
//! - **Rewrite**: Translates drive-letter paths in `Binds` and `Env` onto the
//!   VM's shared-folder mount
//! - **Bridge**: On-demand localhost listeners relaying published ports to the VM
//! - **Config**: Hierarchical TOML configuration merged with CLI flags
//! - **Telemetry**: Structured syslog logging for audit trails

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod bridge;
pub mod cli;
pub mod config;
pub mod orchestrator;
pub mod proxy;
pub mod rewrite;
pub mod shutdown;
pub mod telemetry;
