//! # Relay Core
//!
//! I/O-free primitives shared by every component of the flag relay:
//!
//! - [`model`] — the versioned data model (`Kind`, `VersionedItem`, `Snapshot`)
//! - [`store`] — the in-memory [`VersionedStore`] every environment owns
//! - [`streaming`] — the SSE wire format shared by the upstream client and
//!   the downstream stream handler
//! - [`error`] — [`RelayError`] and the retry/backoff helpers built on it
//! - [`config`] — [`RelayConfig`] and environment-variable loading
//!
//! Nothing here opens a socket or touches the filesystem — that lives in
//! `relay-api`, which depends on this crate.
//!
//! ## Features
//!
//! - `monitoring` - enables Prometheus metric types used by `relay-api`'s
//!   HTTP surface.
//! - `streaming` - enables the SSE wire-format module.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod error;
pub mod model;
#[cfg(feature = "streaming")]
#[cfg_attr(docsrs, doc(cfg(feature = "streaming")))]
pub mod streaming;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::RelayConfig;
pub use error::{ErrorCategory, ErrorSeverity, RelayError, Result};
pub use model::{Kind, Snapshot, VersionedItem};
pub use store::{SharedStore, VersionedStore, WriteOutcome};

/// Current version of relay-core.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports across the workspace.
pub mod prelude {
    pub use crate::config::RelayConfig;
    pub use crate::error::{backoff_delay, ErrorCategory, ErrorSeverity, RelayError, Result};
    pub use crate::model::{Kind, Snapshot, VersionedItem};
    pub use crate::store::{SharedStore, VersionedStore, WriteOutcome};
    pub use async_trait::async_trait;
    pub use serde_json::{json, Value};
    pub use uuid::Uuid;
}
