//! Reverse proxy server.
//!
//! This module provides the server that:
//! - Listens for Docker API clients on a local TCP address
//! - Forwards every request to the configured upstream daemon
//! - Passes selected requests through a [`RequestHook`] first
//! - Splices upgraded connections (attach, exec) into raw byte streams
//!
//! # Architecture
//!
//! Each accepted connection is served by hyper's HTTP/1.1 server in its own
//! Tokio task. Requests are forwarded through one pooled client so upstream
//! connections are reused across clients.
//!
//! # Example
//!
//! ```ignore
//! use dockbridge::proxy::{ProxyConfig, ProxyServer, UpstreamConfig};
//!
//! let config = ProxyConfig {
//!     listen_addr: "127.0.0.1:2375".parse()?,
//!     upstream: UpstreamConfig::new("192.168.137.25", 2375),
//! };
//! let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//! let server = ProxyServer::bind(config, hook, shutdown_rx).await?;
//! server.run().await?;
//!
//! // To shutdown:
//! shutdown_tx.send(true)?;
//! ```

use std::convert::Infallible;
use std::error::Error as StdError;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_TYPE, HOST, UPGRADE};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri, Version};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper::{Request, Response};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::{ProxyError, ProxyResult};
use super::hook::RequestHook;
use crate::shutdown::wait_for_shutdown;

/// Body type used on both sides of the proxy.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Default bound on establishing an upstream connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default TCP keepalive interval for upstream connections.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);
/// Default lifetime of an idle pooled upstream connection.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
/// Default cap on idle pooled upstream connections.
pub const DEFAULT_MAX_IDLE_CONNECTIONS: usize = 100;

/// Hop-by-hop headers (RFC 7230 §6.1) plus the legacy proxy variant.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// The Docker daemon requests are forwarded to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /// Hostname or IP of the daemon.
    pub host: String,
    /// TCP port of the daemon.
    pub port: u16,
    /// Bound on establishing a connection.
    pub connect_timeout: Duration,
    /// TCP keepalive interval.
    pub keepalive: Duration,
    /// Idle pooled connections are closed after this long.
    pub idle_timeout: Duration,
    /// Maximum idle pooled connections.
    pub max_idle_connections: usize,
}

impl UpstreamConfig {
    /// Upstream at `host:port` with default transport settings.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keepalive: DEFAULT_KEEPALIVE,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_idle_connections: DEFAULT_MAX_IDLE_CONNECTIONS,
        }
    }

    /// `host:port`, with IPv6 literals bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Configuration for the proxy server.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Local address to accept clients on.
    pub listen_addr: SocketAddr,
    /// Daemon to forward to.
    pub upstream: UpstreamConfig,
}

/// Shared per-server state handed to every connection task.
struct ProxyState {
    authority: String,
    host_header: HeaderValue,
    client: Client<HttpConnector, ProxyBody>,
    hook: Arc<dyn RequestHook>,
}

/// The reverse proxy server.
pub struct ProxyServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: Arc<ProxyState>,
    /// Shutdown signal receiver.
    shutdown_rx: watch::Receiver<bool>,
}

impl ProxyServer {
    /// Bind the listening socket and build the upstream client.
    ///
    /// With port 0, [`local_addr`](Self::local_addr) reports the assigned port.
    pub async fn bind(
        config: ProxyConfig,
        hook: Arc<dyn RequestHook>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> ProxyResult<Self> {
        let authority = config.upstream.authority();
        let host_header = HeaderValue::from_str(&authority)
            .map_err(|e| ProxyError::InvalidRequest(format!("upstream '{}': {}", authority, e)))?;

        let listener =
            TcpListener::bind(config.listen_addr)
                .await
                .map_err(|e| ProxyError::Bind {
                    addr: config.listen_addr.to_string(),
                    source: e,
                })?;
        let local_addr = listener.local_addr()?;

        let state = Arc::new(ProxyState {
            authority,
            host_header,
            client: build_client(&config.upstream),
            hook,
        });

        Ok(Self {
            listener,
            local_addr,
            state,
            shutdown_rx,
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Upstream authority requests are forwarded to.
    pub fn upstream(&self) -> &str {
        &self.state.authority
    }

    /// Accept and serve connections until the shutdown signal is received.
    ///
    /// In-flight connections are not awaited; they end when their client or
    /// the runtime goes away.
    pub async fn run(self) -> ProxyResult<()> {
        info!(
            "Proxy listening on {} -> {}",
            self.local_addr, self.state.authority
        );

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            debug!("Accepted connection from {}", peer);
                            self.spawn_connection_handler(stream, peer);
                        }
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("Proxy shutting down");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Spawn a task to handle a single connection.
    fn spawn_connection_handler(&self, stream: TcpStream, peer: SocketAddr) {
        let state = self.state.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, state).await {
                // Resets are routine when clients hang up mid-stream.
                let err_str = e.to_string();
                if err_str.contains("connection reset")
                    || err_str.contains("broken pipe")
                    || err_str.contains("Connection reset")
                {
                    debug!("Connection from {} ended: {}", peer, e);
                } else {
                    warn!("Connection error from {}: {}", peer, e);
                }
            }
        });
    }
}

fn build_client(upstream: &UpstreamConfig) -> Client<HttpConnector, ProxyBody> {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(upstream.connect_timeout));
    connector.set_keepalive(Some(upstream.keepalive));
    connector.set_nodelay(true);

    Client::builder(TokioExecutor::new())
        .pool_timer(TokioTimer::new())
        .pool_idle_timeout(upstream.idle_timeout)
        .pool_max_idle_per_host(upstream.max_idle_connections)
        .build(connector)
}

/// Serve one client connection.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    state: Arc<ProxyState>,
) -> ProxyResult<()> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |req: Request<Incoming>| {
        let state = state.clone();
        async move { Ok::<_, Infallible>(proxy_request(req, peer, state).await) }
    });

    // Upgrades are needed for attach/exec hijacking.
    http1::Builder::new()
        .preserve_header_case(true)
        .title_case_headers(true)
        .serve_connection(io, service)
        .with_upgrades()
        .await
        .map_err(ProxyError::from)
}

/// Forward a request, turning failures into an error response.
async fn proxy_request(
    req: Request<Incoming>,
    peer: SocketAddr,
    state: Arc<ProxyState>,
) -> Response<ProxyBody> {
    let method = req.method().clone();
    let uri = req.uri().clone();

    match forward(req, peer, &state).await {
        Ok(response) => {
            debug!("{} {} -> {}", method, uri, response.status());
            response
        }
        Err(e) => {
            warn!("{} {} failed: {}", method, uri, e);
            error_response(&e)
        }
    }
}

async fn forward(
    mut req: Request<Incoming>,
    peer: SocketAddr,
    state: &ProxyState,
) -> ProxyResult<Response<ProxyBody>> {
    let upgrade = upgrade_protocol(req.headers());
    let client_upgrade = upgrade.as_ref().map(|_| hyper::upgrade::on(&mut req));

    let (mut parts, body) = req.into_parts();
    parts.uri = upstream_uri(&state.authority, &parts.uri)?;
    parts.version = Version::HTTP_11;
    prepare_forward_headers(&mut parts.headers, upgrade, peer.ip(), &state.host_header);

    let body = if state.hook.wants(&parts) {
        let buffered = body
            .collect()
            .await
            .map_err(|e| ProxyError::Body(e.to_string()))?
            .to_bytes();
        full_body(state.hook.rewrite(&mut parts, buffered))
    } else {
        body.boxed()
    };

    let mut response = state
        .client
        .request(Request::from_parts(parts, body))
        .await
        .map_err(|e| ProxyError::Upstream {
            addr: state.authority.clone(),
            message: error_chain(&e),
        })?;

    if let Some(client_upgrade) = client_upgrade {
        if response.status() == StatusCode::SWITCHING_PROTOCOLS {
            let upstream_upgrade = hyper::upgrade::on(&mut response);
            tokio::spawn(splice_upgraded(client_upgrade, upstream_upgrade));

            let (mut parts, _) = response.into_parts();
            let protocol = upgrade_protocol(&parts.headers);
            strip_hop_by_hop_headers(&mut parts.headers);
            restore_upgrade_headers(&mut parts.headers, protocol);
            return Ok(Response::from_parts(parts, empty_body()));
        }
    }

    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop_headers(&mut parts.headers);
    Ok(Response::from_parts(parts, body.boxed()))
}

/// Join both halves of an upgraded exchange and copy bytes until either closes.
async fn splice_upgraded(client: OnUpgrade, upstream: OnUpgrade) {
    match tokio::try_join!(client, upstream) {
        Ok((client, upstream)) => {
            let mut client_io = TokioIo::new(client);
            let mut upstream_io = TokioIo::new(upstream);
            match tokio::io::copy_bidirectional(&mut client_io, &mut upstream_io).await {
                Ok((sent, received)) => {
                    debug!("Upgraded stream closed ({} bytes up, {} down)", sent, received)
                }
                Err(e) => debug!("Upgraded stream ended: {}", e),
            }
            let _ = client_io.shutdown().await;
            let _ = upstream_io.shutdown().await;
        }
        Err(e) => warn!("{}", ProxyError::UpgradeFailed(e.to_string())),
    }
}

/// The requested `Upgrade` protocol, if the request asks for one.
fn upgrade_protocol(headers: &HeaderMap) -> Option<HeaderValue> {
    let wants_upgrade = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    if wants_upgrade {
        headers.get(UPGRADE).cloned()
    } else {
        None
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop_headers(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    for name in listed {
        headers.remove(name.as_str());
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

fn restore_upgrade_headers(headers: &mut HeaderMap, protocol: Option<HeaderValue>) {
    if let Some(protocol) = protocol {
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(UPGRADE, protocol);
    }
}

fn prepare_forward_headers(
    headers: &mut HeaderMap,
    upgrade: Option<HeaderValue>,
    peer: IpAddr,
    host: &HeaderValue,
) {
    strip_hop_by_hop_headers(headers);
    restore_upgrade_headers(headers, upgrade);
    headers.insert(HOST, host.clone());
    append_forwarded_for(headers, peer);
}

/// Add `peer` to `X-Forwarded-For`, keeping any earlier hops.
fn append_forwarded_for(headers: &mut HeaderMap, peer: IpAddr) {
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) if !prior.trim().is_empty() => format!("{}, {}", prior, peer),
        _ => peer.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(HeaderName::from_static(X_FORWARDED_FOR), value);
    }
}

/// Point `orig`'s path and query at the upstream authority.
pub fn upstream_uri(authority: &str, orig: &Uri) -> ProxyResult<Uri> {
    let path_and_query = orig.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("http://{}{}", authority, path_and_query)
        .parse::<Uri>()
        .map_err(|e| ProxyError::InvalidRequest(format!("{}{}: {}", authority, path_and_query, e)))
}

fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Plain-text response for a failed forward.
fn error_response(err: &ProxyError) -> Response<ProxyBody> {
    let status = match err {
        ProxyError::Body(_) | ProxyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    };
    let mut response = Response::new(full_body(Bytes::from(format!("{}\n", err))));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}

/// Create an empty body.
fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

/// Create a body with fixed content.
fn full_body(content: Bytes) -> ProxyBody {
    Full::new(content).map_err(|never| match never {}).boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_upstream_authority() {
        assert_eq!(
            UpstreamConfig::new("192.168.137.25", 2375).authority(),
            "192.168.137.25:2375"
        );
        assert_eq!(UpstreamConfig::new("::1", 2375).authority(), "[::1]:2375");
        assert_eq!(UpstreamConfig::new("vm.local", 80).authority(), "vm.local:80");
    }

    #[test]
    fn test_upstream_defaults() {
        let upstream = UpstreamConfig::new("vm", 2375);
        assert_eq!(upstream.connect_timeout, Duration::from_secs(5));
        assert_eq!(upstream.keepalive, Duration::from_secs(30));
        assert_eq!(upstream.idle_timeout, Duration::from_secs(90));
        assert_eq!(upstream.max_idle_connections, 100);
    }

    #[test]
    fn test_upstream_uri_keeps_path_and_query() {
        let orig: Uri = "/v1.43/containers/json?all=1".parse().unwrap();
        let uri = upstream_uri("10.0.0.5:2375", &orig).unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.5:2375/v1.43/containers/json?all=1");
    }

    #[test]
    fn test_upstream_uri_replaces_absolute_form() {
        let orig: Uri = "http://localhost:2375/_ping".parse().unwrap();
        let uri = upstream_uri("10.0.0.5:2375", &orig).unwrap();
        assert_eq!(uri.to_string(), "http://10.0.0.5:2375/_ping");
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive, X-Trace"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-trace", HeaderValue::from_static("abc"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        strip_hop_by_hop_headers(&mut headers);

        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_upgrade_protocol_detection() {
        let mut headers = HeaderMap::new();
        headers.insert(UPGRADE, HeaderValue::from_static("tcp"));
        assert!(upgrade_protocol(&headers).is_none());

        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        assert_eq!(upgrade_protocol(&headers).unwrap(), "tcp");
    }

    #[test]
    fn test_prepare_forward_headers_keeps_upgrade() {
        let mut headers = HeaderMap::new();
        headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
        headers.insert(UPGRADE, HeaderValue::from_static("tcp"));
        headers.insert(HOST, HeaderValue::from_static("localhost:2375"));
        let upgrade = upgrade_protocol(&headers);

        prepare_forward_headers(
            &mut headers,
            upgrade,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            &HeaderValue::from_static("10.0.0.5:2375"),
        );

        assert_eq!(headers.get(CONNECTION).unwrap(), "Upgrade");
        assert_eq!(headers.get(UPGRADE).unwrap(), "tcp");
        assert_eq!(headers.get(HOST).unwrap(), "10.0.0.5:2375");
        assert_eq!(headers.get(X_FORWARDED_FOR).unwrap(), "127.0.0.1");
    }

    #[test]
    fn test_forwarded_for_appends() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("10.1.1.1"));
        append_forwarded_for(&mut headers, IpAddr::V4(Ipv4Addr::new(10, 2, 2, 2)));
        assert_eq!(headers.get(X_FORWARDED_FOR).unwrap(), "10.1.1.1, 10.2.2.2");
    }

    #[test]
    fn test_error_response_status() {
        let upstream = error_response(&ProxyError::Upstream {
            addr: "vm:2375".to_string(),
            message: "connection refused".to_string(),
        });
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            upstream.headers().get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );

        let body = error_response(&ProxyError::Body("reset".to_string()));
        assert_eq!(body.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let err = ProxyError::Bind {
            addr: "127.0.0.1:1".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        };
        let chain = error_chain(&err);
        assert!(chain.starts_with("Failed to listen on 127.0.0.1:1"));
        assert!(chain.ends_with(": in use"));
    }
}
