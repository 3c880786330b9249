//! Configuration system for dockbridge.
//!
//! This module provides TOML configuration loading with hierarchy merging.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded from multiple sources and merged in order:
//!
//! 1. System config: `/etc/dockbridge/config.toml`
//! 2. User config: `~/.config/dockbridge/config.toml`
//! 3. Additional config file (via `--config` flag)
//! 4. CLI flags (highest priority)
//!
//! No file is required; built-in defaults match a VMware host-only network
//! with shared folders under `/mnt/hgfs`.
//!
//! # Example
//!
//! ```toml
//! [upstream]
//! host = "192.168.137.25"
//! port = 2375
//!
//! [paths]
//! base = "/mnt/hgfs/docker/volumes/"
//!
//! [bridge]
//! dial_timeout_secs = 5
//! ```

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::{ConfigLoader, SYSTEM_CONFIG_PATH};
pub use schema::{
    BridgeSection, Config, GeneralConfig, PathsSection, ProxySection, Settings, UpstreamSection,
    DEFAULT_BASE, DEFAULT_LISTEN_ADDRESS, DEFAULT_LOCAL_PORT, DEFAULT_VM_HOST, DEFAULT_VM_PORT,
};
