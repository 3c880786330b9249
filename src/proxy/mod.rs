//! Docker API reverse proxy.
//!
//! This module provides the forwarding side of dockbridge:
//! - A local HTTP/1.1 listener that forwards every request to the VM daemon
//! - A [`RequestHook`] seam for rewriting selected request bodies
//! - [`CreateInterceptor`], the hook for container-create payloads
//! - Upgrade splicing for attach and exec streams
//!
//! # Architecture
//!
//! ```text
//! docker CLI ──► ProxyServer (127.0.0.1:2375)
//!                  │
//!                  ├─ POST .../containers/create ──► CreateInterceptor
//!                  │                                   ├─ rewrite Binds / Env
//!                  │                                   └─ request bridges
//!                  ▼
//!                pooled client ──► VM daemon (192.168.137.25:2375)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use dockbridge::proxy::{CreateInterceptor, ProxyConfig, ProxyServer, UpstreamConfig};
//! use std::sync::Arc;
//!
//! let hook = Arc::new(CreateInterceptor::new("/mnt/hgfs/docker/volumes/", bridges, audit));
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let server = ProxyServer::bind(config, hook, shutdown_rx).await?;
//! server.run().await?;
//! ```

pub mod error;
pub mod hook;
pub mod server;

// Re-export main types for convenient access
pub use error::{ProxyError, ProxyResult};
pub use hook::{set_content_length, CreateInterceptor, RequestHook, CONTAINER_CREATE_PATH};
pub use server::{ProxyBody, ProxyConfig, ProxyServer, UpstreamConfig};
