//! Payload rewriting for container-create requests.
//!
//! - [`path`]: drive-letter path parsing and translation to the VM share
//! - [`payload`]: JSON body rewriting and published-port discovery

pub mod path;
pub mod payload;

pub use path::{translate, PathReference};
pub use payload::{PayloadRewriter, Rewrite, RewriteKind, RewriteOutcome};
