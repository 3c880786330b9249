//! Request interception before forwarding.
//!
//! The transport asks its [`RequestHook`] whether a request needs its body.
//! If so, the body is buffered, handed to [`RequestHook::rewrite`], and the
//! returned bytes are forwarded with a matching `Content-Length`.

use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::request::Parts;
use http::{HeaderValue, Method};
use tracing::{debug, info};

use crate::bridge::BridgeManager;
use crate::rewrite::{PayloadRewriter, RewriteKind};
use crate::telemetry::{AuditEvent, AuditLogger};

/// Path fragment of the Docker container-create endpoint (any API version).
pub const CONTAINER_CREATE_PATH: &str = "/containers/create";

/// Mutates selected requests before they are forwarded.
pub trait RequestHook: Send + Sync {
    /// Whether the request body should be buffered and passed to [`rewrite`](Self::rewrite).
    fn wants(&self, parts: &Parts) -> bool;

    /// Produce the body to forward. Implementations may adjust headers but
    /// must leave `Content-Length` consistent with the returned bytes.
    fn rewrite(&self, parts: &mut Parts, body: Bytes) -> Bytes;
}

/// Rewrites container-create payloads and starts bridges for published ports.
pub struct CreateInterceptor {
    rewriter: PayloadRewriter,
    bridges: Arc<BridgeManager>,
    audit: Arc<AuditLogger>,
}

impl CreateInterceptor {
    /// Create an interceptor translating paths under `base`.
    pub fn new(base: impl Into<String>, bridges: Arc<BridgeManager>, audit: Arc<AuditLogger>) -> Self {
        Self {
            rewriter: PayloadRewriter::new(base),
            bridges,
            audit,
        }
    }

    /// True for `POST` requests whose path contains `/containers/create`.
    pub fn qualifies(method: &Method, path: &str) -> bool {
        method == Method::POST && path.contains(CONTAINER_CREATE_PATH)
    }

    /// Rewrite a create body, report rewrites, and request bridges.
    ///
    /// Bridges start in the background; this returns as soon as the body is ready.
    pub fn intercept(&self, path: &str, body: Bytes) -> Bytes {
        let outcome = self.rewriter.rewrite(body);

        for rewrite in &outcome.rewrites {
            match rewrite.kind {
                RewriteKind::Bind => {
                    info!("[PATH] Rewrote Bind: {} -> {}", rewrite.original, rewrite.rewritten);
                    self.audit.log(AuditEvent::BindRewrite {
                        original: rewrite.original.clone(),
                        rewritten: rewrite.rewritten.clone(),
                    });
                }
                RewriteKind::Env => {
                    info!("[ENV]  Rewrote: {} -> {}", rewrite.original, rewrite.rewritten);
                    self.audit.log(AuditEvent::EnvRewrite {
                        original: rewrite.original.clone(),
                        rewritten: rewrite.rewritten.clone(),
                    });
                }
            }
        }

        for port in &outcome.ports {
            // Handle dropped: the bridge outlives this request.
            let _ = self.bridges.request_bridge(port);
        }

        if outcome.was_modified() {
            info!("[OK] Payload modified for VM compatibility.");
            self.audit.log(AuditEvent::PayloadModified {
                path: path.to_string(),
                rewrites: outcome.rewrites.len(),
            });
        } else {
            debug!("Create payload for {} forwarded unchanged", path);
        }

        outcome.body
    }
}

impl RequestHook for CreateInterceptor {
    fn wants(&self, parts: &Parts) -> bool {
        Self::qualifies(&parts.method, parts.uri.path())
    }

    fn rewrite(&self, parts: &mut Parts, body: Bytes) -> Bytes {
        let body = self.intercept(parts.uri.path(), body);
        set_content_length(parts, body.len());
        body
    }
}

/// Replace any framing headers with a `Content-Length` of `len`.
pub fn set_content_length(parts: &mut Parts, len: usize) {
    parts.headers.remove(TRANSFER_ENCODING);
    parts.headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
}
