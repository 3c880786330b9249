//! One accepted connection relayed to the remote host.

use std::fmt;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::debug;

use super::error::{BridgeError, BridgeResult};
use crate::shutdown::wait_for_shutdown;

/// Where a bridge sends its traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEndpoint {
    /// Remote hostname or IP.
    pub host: String,
    /// Remote TCP port (same number as the local one).
    pub port: u16,
    /// Bound on the outbound connect.
    pub dial_timeout: Duration,
}

impl RemoteEndpoint {
    /// Connect to the remote endpoint, giving up after `dial_timeout`.
    pub async fn connect(&self) -> BridgeResult<TcpStream> {
        match tokio::time::timeout(
            self.dial_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(BridgeError::ConnectFailed {
                addr: self.to_string(),
                source: e,
            }),
            Err(_) => Err(BridgeError::ConnectTimeout {
                addr: self.to_string(),
                timeout: self.dial_timeout,
            }),
        }
    }
}

impl fmt::Display for RemoteEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Which side ended a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client->remote copy finished first.
    ClientClosed,
    /// The remote->client copy finished first.
    RemoteClosed,
    /// Shutdown was signalled.
    Shutdown,
}

/// Relay `client` to `remote` until either direction finishes.
///
/// The client connection is dropped (closed) if the remote cannot be reached.
/// Once one copy completes both connections are dropped; the other direction
/// is not drained.
pub async fn relay(
    mut client: TcpStream,
    remote: &RemoteEndpoint,
    mut shutdown_rx: watch::Receiver<bool>,
) -> BridgeResult<SessionEnd> {
    let mut upstream = tokio::select! {
        result = remote.connect() => result?,
        _ = wait_for_shutdown(&mut shutdown_rx) => return Ok(SessionEnd::Shutdown),
    };

    let (mut client_read, mut client_write) = client.split();
    let (mut upstream_read, mut upstream_write) = upstream.split();

    let client_to_upstream = tokio::io::copy(&mut client_read, &mut upstream_write);
    let upstream_to_client = tokio::io::copy(&mut upstream_read, &mut client_write);

    let end = tokio::select! {
        result = client_to_upstream => {
            match result {
                Ok(n) => debug!("Client->{} copy ended after {} bytes", remote, n),
                Err(e) => debug!("Client->{} copy ended: {}", remote, e),
            }
            SessionEnd::ClientClosed
        }
        result = upstream_to_client => {
            match result {
                Ok(n) => debug!("{}->client copy ended after {} bytes", remote, n),
                Err(e) => debug!("{}->client copy ended: {}", remote, e),
            }
            SessionEnd::RemoteClosed
        }
        _ = wait_for_shutdown(&mut shutdown_rx) => SessionEnd::Shutdown,
    };

    Ok(end)
}
