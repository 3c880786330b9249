//! Dynamic TCP bridges for published container ports.
//!
//! When a container-create request publishes a host port, the same port on
//! the local loopback is bridged to the remote VM so that `localhost:<port>`
//! reaches the container.
//!
//! # Architecture
//!
//! ```text
//! Interception hook
//!   │ request_bridge("54322")
//!   ▼
//! BridgeManager ── registry (Mutex<HashSet>) ── first time only
//!   │ spawn
//!   ▼
//! BridgeListener (127.0.0.1:54322)
//!   │ on accept, spawn
//!   ▼
//! Bridge session ── dial (5s) ──► <remote>:54322
//!   copy client -> remote / remote -> client until either finishes
//! ```

pub mod error;
pub mod listener;
pub mod manager;
pub mod session;

pub use error::{BridgeError, BridgeResult};
pub use listener::BridgeListener;
pub use manager::{BridgeConfig, BridgeHandle, BridgeManager, DEFAULT_DIAL_TIMEOUT};
pub use session::{relay, RemoteEndpoint, SessionEnd};
