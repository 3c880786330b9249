//! Process wiring and lifecycle management.
//!
//! This module coordinates the audit logger, the bridge manager, the
//! container-create interceptor and the proxy server, and tears them down
//! together on shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bridge::BridgeManager;
use crate::config::Settings;
use crate::proxy::{CreateInterceptor, ProxyResult, ProxyServer};
use crate::telemetry::{AuditEvent, AuditLogger};

/// Build the audit logger for `settings`.
///
/// An unreachable syslog daemon is not fatal; events are discarded instead.
pub fn audit_logger(settings: &Settings) -> Arc<AuditLogger> {
    if !settings.syslog {
        return Arc::new(AuditLogger::new_null());
    }
    match AuditLogger::new() {
        Ok(logger) => Arc::new(logger),
        Err(e) => {
            warn!("Audit events disabled: {}", e);
            Arc::new(AuditLogger::new_null())
        }
    }
}

/// Owns the resolved settings and starts the proxy.
pub struct Orchestrator {
    settings: Settings,
    audit: Arc<AuditLogger>,
}

impl Orchestrator {
    /// Create an orchestrator that audits to syslog if `settings.syslog` is set.
    pub fn new(settings: Settings) -> Self {
        let audit = audit_logger(&settings);
        Self { settings, audit }
    }

    /// Replace the audit logger.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    /// The settings this orchestrator runs with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Bind the proxy and start serving in the background.
    pub async fn start(&self) -> Result<RunningProxy> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let bridges = Arc::new(
            BridgeManager::new(self.settings.bridge.clone()).with_audit(self.audit.clone()),
        );
        let hook = Arc::new(CreateInterceptor::new(
            self.settings.base.clone(),
            bridges.clone(),
            self.audit.clone(),
        ));

        let server = ProxyServer::bind(self.settings.proxy_config(), hook, shutdown_rx)
            .await
            .context("Failed to start proxy")?;
        let local_addr = server.local_addr();

        self.log_banner(local_addr, server.upstream());
        self.audit.log(AuditEvent::ProxyStart {
            listen: local_addr.to_string(),
            upstream: server.upstream().to_string(),
            base: self.settings.base.clone(),
        });

        let server_task = tokio::spawn(server.run());

        Ok(RunningProxy {
            local_addr,
            bridges,
            shutdown_tx,
            server_task,
        })
    }

    /// Start, serve until Ctrl-C, then shut down.
    pub async fn run(self) -> Result<()> {
        let running = self.start().await?;

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        info!("Received interrupt, shutting down");

        running.shutdown().await
    }

    fn log_banner(&self, local_addr: SocketAddr, upstream: &str) {
        info!("-------------------------------------------------------");
        info!("DOCKER BRIDGE PROXY: tcp://{} -> tcp://{}", local_addr, upstream);
        info!("Path Mapping: Windows -> {}{{DRIVE}}/", self.settings.base);
        info!(
            "Port bridges: {}:<port> -> {}:<port>",
            self.settings.bridge.listen_ip, self.settings.bridge.remote_host
        );
        info!("-------------------------------------------------------");
    }
}

/// A started proxy and its bridges.
pub struct RunningProxy {
    local_addr: SocketAddr,
    bridges: Arc<BridgeManager>,
    shutdown_tx: watch::Sender<bool>,
    server_task: JoinHandle<ProxyResult<()>>,
}

impl RunningProxy {
    /// Address the proxy is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The bridge manager fed by the interceptor.
    pub fn bridges(&self) -> &Arc<BridgeManager> {
        &self.bridges
    }

    /// Stop accepting clients and close every bridge.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.bridges.shutdown();

        self.server_task
            .await
            .context("Proxy task panicked")?
            .context("Proxy server failed")?;

        info!(
            "Stopped ({} port(s) were bridged)",
            self.bridges.registered_count()
        );
        Ok(())
    }
}
