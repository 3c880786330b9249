//! Container-create payload rewriting.
//!
//! Only a narrow slice of the Docker `ContainerCreate` body is examined:
//!
//! ```text
//! {
//!   "HostConfig": {
//!     "Binds": ["C:\\data:/app:ro", ...],
//!     "PortBindings": { "5432/tcp": [ { "HostPort": "54322" } ] }
//!   },
//!   "Env": ["DB_PATH=C:\\config\\db", ...]
//! }
//! ```
//!
//! Every field is optional and a field of the wrong type is skipped. A body
//! that is not a JSON object passes through byte-for-byte.

use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::warn;

use super::path::PathReference;

/// Which part of the payload a rewrite touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteKind {
    /// An element of `HostConfig.Binds`.
    Bind,
    /// An element of `Env`.
    Env,
}

/// One rewritten string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    /// Where the string came from.
    pub kind: RewriteKind,
    /// Value before translation.
    pub original: String,
    /// Value after translation.
    pub rewritten: String,
}

/// Result of running the rewriter over one request body.
#[derive(Debug, Clone)]
pub struct RewriteOutcome {
    /// Body to forward. Identical to the input when nothing was rewritten.
    pub body: Bytes,
    /// Host ports declared under `HostConfig.PortBindings`, one per occurrence.
    pub ports: Vec<String>,
    /// Strings that were rewritten, in payload order.
    pub rewrites: Vec<Rewrite>,
}

impl RewriteOutcome {
    fn passthrough(body: Bytes) -> Self {
        Self {
            body,
            ports: Vec::new(),
            rewrites: Vec::new(),
        }
    }

    /// Whether the forwarded body differs from the input.
    pub fn was_modified(&self) -> bool {
        !self.rewrites.is_empty()
    }
}

/// Rewrites Windows path references in container-create payloads.
#[derive(Debug, Clone)]
pub struct PayloadRewriter {
    base: String,
}

impl PayloadRewriter {
    /// Create a rewriter translating paths under `base`.
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    /// The destination path prefix.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Rewrite `raw`, reporting discovered host ports.
    ///
    /// Never fails: unparsable input is returned unchanged with no ports.
    pub fn rewrite(&self, raw: Bytes) -> RewriteOutcome {
        if raw.is_empty() {
            return RewriteOutcome::passthrough(raw);
        }

        let mut root: Map<String, Value> = match serde_json::from_slice(&raw) {
            Ok(map) => map,
            Err(_) => return RewriteOutcome::passthrough(raw),
        };

        let mut rewrites = Vec::new();
        let mut ports = Vec::new();

        if let Some(Value::Object(host_config)) = root.get_mut("HostConfig") {
            if let Some(Value::Array(binds)) = host_config.get_mut("Binds") {
                self.rewrite_binds(binds, &mut rewrites);
            }
            if let Some(Value::Object(port_bindings)) = host_config.get("PortBindings") {
                collect_host_ports(port_bindings, &mut ports);
            }
        }

        if let Some(Value::Array(env)) = root.get_mut("Env") {
            self.rewrite_env(env, &mut rewrites);
        }

        if rewrites.is_empty() {
            return RewriteOutcome {
                body: raw,
                ports,
                rewrites,
            };
        }

        match serde_json::to_vec(&root) {
            Ok(encoded) => RewriteOutcome {
                body: Bytes::from(encoded),
                ports,
                rewrites,
            },
            Err(e) => {
                warn!("Failed to re-encode rewritten payload, forwarding original: {}", e);
                RewriteOutcome {
                    body: raw,
                    ports,
                    rewrites: Vec::new(),
                }
            }
        }
    }

    fn rewrite_binds(&self, binds: &mut [Value], rewrites: &mut Vec<Rewrite>) {
        for entry in binds.iter_mut() {
            let Value::String(bind) = entry else {
                continue;
            };
            let Some(reference) = PathReference::parse_bind(bind.as_str()) else {
                continue;
            };
            let rewritten = reference.translate(&self.base);
            let original = std::mem::replace(bind, rewritten.clone());
            rewrites.push(Rewrite {
                kind: RewriteKind::Bind,
                original,
                rewritten,
            });
        }
    }

    fn rewrite_env(&self, env: &mut [Value], rewrites: &mut Vec<Rewrite>) {
        for entry in env.iter_mut() {
            let Value::String(var) = entry else {
                continue;
            };
            let Some((key, value)) = var.split_once('=') else {
                continue;
            };
            let Some(reference) = PathReference::parse_value(value) else {
                continue;
            };
            let rewritten = format!("{}={}", key, reference.translate(&self.base));
            let original = std::mem::replace(var, rewritten.clone());
            rewrites.push(Rewrite {
                kind: RewriteKind::Env,
                original,
                rewritten,
            });
        }
    }
}

fn collect_host_ports(port_bindings: &Map<String, Value>, ports: &mut Vec<String>) {
    for bindings in port_bindings.values() {
        let Value::Array(bindings) = bindings else {
            continue;
        };
        for binding in bindings {
            if let Some(Value::String(host_port)) = binding.get("HostPort") {
                ports.push(host_port.clone());
            }
        }
    }
}
