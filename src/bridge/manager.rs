//! Forward registry and bridge startup.
//!
//! The registry is a set of port tokens behind one mutex. Its only critical
//! section is the test-and-set in [`BridgeManager::request_bridge`]; binding,
//! accepting and relaying all happen in spawned tasks outside the lock.
//!
//! Membership only grows. A port whose bind failed stays registered and is
//! never retried for the life of the manager.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::error::{BridgeError, BridgeResult};
use super::listener::BridgeListener;
use crate::telemetry::AuditLogger;

/// Default bound on a bridge session's outbound connect.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings shared by every bridge a manager starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Local interface the listeners bind (loopback by default).
    pub listen_ip: IpAddr,
    /// Remote host that receives relayed traffic.
    pub remote_host: String,
    /// Bound on each outbound connect.
    pub dial_timeout: Duration,
}

impl BridgeConfig {
    /// Loopback listeners relaying to `remote_host` with the default dial timeout.
    pub fn new(remote_host: impl Into<String>) -> Self {
        Self {
            listen_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            remote_host: remote_host.into(),
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }
}

/// Handle to a bridge started by [`BridgeManager::request_bridge`].
///
/// Dropping it leaves the bridge running.
#[derive(Debug)]
pub struct BridgeHandle {
    port: String,
    ready: Option<oneshot::Receiver<BridgeResult<SocketAddr>>>,
    task: JoinHandle<()>,
}

impl BridgeHandle {
    /// The registered port token.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Wait until the listener has bound (or failed to).
    ///
    /// Returns the local address. Calling this a second time yields
    /// [`BridgeError::ListenerGone`].
    pub async fn ready(&mut self) -> BridgeResult<SocketAddr> {
        let Some(rx) = self.ready.take() else {
            return Err(BridgeError::ListenerGone(self.port.clone()));
        };
        rx.await
            .unwrap_or_else(|_| Err(BridgeError::ListenerGone(self.port.clone())))
    }

    /// The listener task, which completes on shutdown or bind failure.
    pub fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}

/// Starts at most one bridge listener per distinct port token.
pub struct BridgeManager {
    config: BridgeConfig,
    /// Ports that have been requested at least once.
    registry: Mutex<HashSet<String>>,
    /// Shutdown sender (shared by all listeners and sessions).
    shutdown_tx: watch::Sender<bool>,
    /// Shutdown receiver template.
    shutdown_rx: watch::Receiver<bool>,
    /// Optional audit logger.
    audit: Option<Arc<AuditLogger>>,
}

impl BridgeManager {
    /// Create a manager with an empty registry.
    pub fn new(config: BridgeConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            config,
            registry: Mutex::new(HashSet::new()),
            shutdown_tx,
            shutdown_rx,
            audit: None,
        }
    }

    /// Set the audit logger for bridge events.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// The manager's bridge settings.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Register `port` and start a bridge for it if it is new.
    ///
    /// Returns `None` when the port was already registered. Must be called from
    /// within a Tokio runtime.
    pub fn request_bridge(&self, port: &str) -> Option<BridgeHandle> {
        if !self.register(port) {
            debug!("Port {} already bridged", port);
            return None;
        }

        info!(
            "Starting bridge for port {} -> {}",
            port, self.config.remote_host
        );

        let listener = BridgeListener::new(
            port.to_string(),
            self.config.listen_ip,
            self.config.remote_host.clone(),
            self.config.dial_timeout,
            self.shutdown_rx.clone(),
        )
        .with_audit(self.audit.clone());

        let (ready_tx, ready_rx) = oneshot::channel();
        let task = tokio::spawn(listener.run(ready_tx));

        Some(BridgeHandle {
            port: port.to_string(),
            ready: Some(ready_rx),
            task,
        })
    }

    /// Test-and-set membership. True if `port` was newly added.
    fn register(&self, port: &str) -> bool {
        let mut registry = match self.registry.lock() {
            Ok(guard) => guard,
            // The set is only ever inserted into; a poisoned guard still holds a valid set.
            Err(poisoned) => poisoned.into_inner(),
        };
        if registry.contains(port) {
            return false;
        }
        registry.insert(port.to_string())
    }

    /// Whether `port` has been requested before.
    pub fn is_registered(&self, port: &str) -> bool {
        match self.registry.lock() {
            Ok(registry) => registry.contains(port),
            Err(poisoned) => poisoned.into_inner().contains(port),
        }
    }

    /// Registered port tokens, sorted.
    pub fn registered_ports(&self) -> Vec<String> {
        let mut ports: Vec<String> = match self.registry.lock() {
            Ok(registry) => registry.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        };
        ports.sort();
        ports
    }

    /// Number of registered ports.
    pub fn registered_count(&self) -> usize {
        match self.registry.lock() {
            Ok(registry) => registry.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Signal every listener and session to stop.
    ///
    /// The registry is left as is; later requests for new ports start
    /// listeners that exit immediately.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        info!("Shutting down all port bridges");
    }
}
