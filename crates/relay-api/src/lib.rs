//! # Relay API
//!
//! Everything in the flag relay that touches a socket: the upstream SSE
//! client, the optional persistent cache, the per-subscriber fan-out
//! broadcaster, the event-forwarding pipeline, and the downstream HTTP
//! handlers that expose all of it to SDKs. `relay-core` owns the data
//! model and wire format this crate drives; `relay-app` wires this crate's
//! [`Supervisor`] and [`handlers::configure`] into an actix `HttpServer`.
//!
//! ## Features
//!
//! - `monitoring` — Prometheus counters/gauges (enabled by default).
//! - `redis-backend` — the `RedisAdapter` `PersistentAdapter` (enabled by
//!   default); disable to build without the `redis` dependency when no
//!   persistent backend is needed.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod broadcaster;
pub mod evaluator;
pub mod events;
pub mod handlers;
#[cfg(feature = "monitoring")]
#[cfg_attr(docsrs, doc(cfg(feature = "monitoring")))]
pub mod metrics;
pub mod persistent;
pub mod supervisor;
pub mod upstream;

pub use evaluator::{Evaluator, PassthroughEvaluator};
pub use supervisor::{EnvironmentHandle, Supervisor};

/// Current version of relay-api.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for common imports across `relay-app`.
pub mod prelude {
    pub use crate::evaluator::{Evaluator, PassthroughEvaluator};
    pub use crate::handlers;
    pub use crate::supervisor::{EnvironmentHandle, Supervisor};
    pub use relay_core::prelude::*;
    pub use actix_web::{web, App, HttpServer};
}
