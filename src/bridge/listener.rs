//! Local listener for one bridged port.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use super::error::{BridgeError, BridgeResult};
use super::session::{relay, RemoteEndpoint};
use crate::shutdown::wait_for_shutdown;
use crate::telemetry::{AuditEvent, AuditLogger};

/// Pause after a failed accept so a persistent error (e.g. EMFILE) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Accepts local connections on one port and relays each to the remote host.
pub struct BridgeListener {
    /// Port token as it appeared in the payload.
    port_token: String,
    /// Local interface to bind.
    listen_ip: IpAddr,
    /// Remote host name or IP.
    remote_host: String,
    /// Bound on each outbound connect.
    dial_timeout: Duration,
    /// Shutdown signal.
    shutdown_rx: watch::Receiver<bool>,
    /// Optional audit logger.
    audit: Option<Arc<AuditLogger>>,
}

impl BridgeListener {
    /// Create a listener for `port_token`. Nothing is bound until [`run`](Self::run).
    pub fn new(
        port_token: String,
        listen_ip: IpAddr,
        remote_host: String,
        dial_timeout: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            port_token,
            listen_ip,
            remote_host,
            dial_timeout,
            shutdown_rx,
            audit: None,
        }
    }

    /// Set the audit logger for bridge events.
    pub fn with_audit(mut self, audit: Option<Arc<AuditLogger>>) -> Self {
        self.audit = audit;
        self
    }

    /// Bind and serve until shutdown.
    ///
    /// The bind result is sent on `ready` before the accept loop starts. A bind
    /// failure ends the listener; it is not retried.
    pub async fn run(self, ready: oneshot::Sender<BridgeResult<SocketAddr>>) {
        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                warn!("[TUNNEL] Skipping port {}: {}", self.port_token, e);
                self.audit_event(AuditEvent::BridgeSkip {
                    port: self.port_token.clone(),
                    reason: e.to_string(),
                });
                let _ = ready.send(Err(e));
                return;
            }
        };

        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(e) => {
                let _ = ready.send(Err(BridgeError::ListenFailed {
                    addr: format!("{}:{}", self.listen_ip, self.port_token),
                    source: e,
                }));
                return;
            }
        };

        let remote = RemoteEndpoint {
            host: self.remote_host.clone(),
            port: local_addr.port(),
            dial_timeout: self.dial_timeout,
        };

        info!("[TUNNEL] Local bridge created: {} -> {}", local_addr, remote);
        self.audit_event(AuditEvent::BridgeOpen {
            port: self.port_token.clone(),
            local: local_addr.to_string(),
            remote: remote.to_string(),
        });
        let _ = ready.send(Ok(local_addr));

        let remote = Arc::new(remote);
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!("Bridge connection from {} on {}", peer_addr, local_addr);
                            self.spawn_session(stream, remote.clone());
                        }
                        Err(e) => {
                            warn!("Accept error on bridge {}: {}", local_addr, e);
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        }
                    }
                }
                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("Bridge {} -> {} shutting down", local_addr, remote);
                    break;
                }
            }
        }
    }

    async fn bind(&self) -> BridgeResult<TcpListener> {
        let port: u16 = match self.port_token.parse() {
            Ok(port) if port != 0 => port,
            _ => return Err(BridgeError::InvalidPort(self.port_token.clone())),
        };
        let addr = SocketAddr::new(self.listen_ip, port);
        TcpListener::bind(addr)
            .await
            .map_err(|e| BridgeError::ListenFailed {
                addr: addr.to_string(),
                source: e,
            })
    }

    fn spawn_session(&self, stream: tokio::net::TcpStream, remote: Arc<RemoteEndpoint>) {
        let shutdown_rx = self.shutdown_rx.clone();
        let audit = self.audit.clone();
        let port = self.port_token.clone();

        tokio::spawn(async move {
            if let Err(e) = relay(stream, &remote, shutdown_rx).await {
                warn!("[TUNNEL] {}", e);
                if let Some(audit) = audit {
                    audit.log(AuditEvent::BridgeDialFailed {
                        port,
                        remote: remote.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        });
    }

    fn audit_event(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.log(event);
        }
    }
}
