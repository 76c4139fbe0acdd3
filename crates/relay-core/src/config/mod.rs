//! Configuration for the relay process.
//!
//! Loaded once at startup from environment variables (`dotenvy::dotenv().ok()`
//! first so a `.env` file in the working directory is picked up in
//! development), validated, and then treated as immutable for the lifetime
//! of the process. CLI/file-based config loading is an explicit non-goal of
//! the core pipeline; `relay-app` is the only crate that touches `std::env`
//! directly.

pub mod env_utils;
pub mod error;
pub mod validation;

pub use error::{ConfigError, ConfigResult};

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Top-level relay configuration: one upstream/event policy shared by every
/// configured environment, plus the list of environments themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    pub listen: ListenConfig,
    pub upstream: UpstreamConfig,
    pub events: EventRelayConfig,
    pub persistent_store: PersistentStoreConfig,
    pub environments: Vec<EnvironmentConfig>,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

/// Upstream LaunchDarkly endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub stream_uri: String,
    pub poll_uri: String,
    pub events_uri: String,
    pub heartbeat_interval: Duration,
}

/// Bounded-queue / batching policy for the event-forwarding pipeline,
/// shared by every environment's `VerbatimRelay`/`SummarizingRelay`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRelayConfig {
    pub capacity: usize,
    pub flush_interval: Duration,
    /// `0` disables sampling; `N > 1` keeps 1 in N payloads.
    pub sampling_interval: u32,
    pub send_events: bool,
}

/// Selects and configures the optional `PersistentAdapter` backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentStoreConfig {
    pub backend: PersistentBackend,
    pub url: Option<String>,
    pub ttl: Duration,
    pub prefix: String,
}

/// Concrete `PersistentAdapter` backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistentBackend {
    /// No persistent backend; the in-memory `VersionedStore` is authoritative.
    None,
    Redis,
}

/// One configured environment: an SDK credential plus the keys it exposes
/// to downstream client-side/mobile SDKs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    pub name: String,
    pub sdk_key: String,
    pub mobile_key: Option<String>,
    pub env_id: Option<String>,
}

impl RelayConfig {
    /// Load configuration from environment variables. A single environment
    /// is read from `SDK_KEY`/`MOBILE_KEY`/`ENV_ID`/`ENVIRONMENT_NAME`;
    /// multi-environment deployments are expected to set these through a
    /// process supervisor that forks one relay per environment, matching
    /// the per-environment Supervisor model in the design.
    pub fn from_env() -> ConfigResult<Self> {
        let sdk_key = env::var("SDK_KEY")
            .map_err(|_| ConfigError::env_var_not_found("SDK_KEY", None))?;

        Ok(Self {
            listen: ListenConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_utils::EnvLoader::load_with_default("PORT", 8030u16)?,
            },
            upstream: UpstreamConfig {
                stream_uri: env::var("STREAM_URI")
                    .unwrap_or_else(|_| "https://stream.launchdarkly.com".to_string()),
                poll_uri: env::var("POLL_URI")
                    .unwrap_or_else(|_| "https://sdk.launchdarkly.com".to_string()),
                events_uri: env::var("EVENTS_URI")
                    .unwrap_or_else(|_| "https://events.launchdarkly.com".to_string()),
                heartbeat_interval: env_utils::EnvLoader::load_duration_seconds("HEARTBEAT_INTERVAL_SECONDS", 180)?,
            },
            events: EventRelayConfig {
                capacity: env_utils::EnvLoader::load_with_default("EVENT_CAPACITY", 1000usize)?,
                flush_interval: env_utils::EnvLoader::load_duration_seconds("EVENT_FLUSH_INTERVAL_SECONDS", 5)?,
                sampling_interval: env_utils::EnvLoader::load_with_default("EVENT_SAMPLING_INTERVAL", 0u32)?,
                send_events: env_utils::EnvLoader::load_bool("SEND_EVENTS", true),
            },
            persistent_store: PersistentStoreConfig {
                backend: match env::var("PERSISTENT_STORE_BACKEND").as_deref() {
                    Ok("redis") => PersistentBackend::Redis,
                    _ => PersistentBackend::None,
                },
                url: env::var("PERSISTENT_STORE_URL").ok(),
                ttl: env_utils::EnvLoader::load_duration_seconds("PERSISTENT_STORE_TTL_SECONDS", 60)?,
                prefix: env::var("PERSISTENT_STORE_PREFIX").unwrap_or_else(|_| "relay".to_string()),
            },
            environments: vec![EnvironmentConfig {
                name: env::var("ENVIRONMENT_NAME").unwrap_or_else(|_| "default".to_string()),
                sdk_key,
                mobile_key: env::var("MOBILE_KEY").ok(),
                env_id: env::var("ENV_ID").ok(),
            }],
        })
    }

    /// Validate invariants that must hold before the relay starts serving
    /// traffic. Failure here is a [`ConfigError`] (fail-fast startup).
    pub fn validate(&self) -> ConfigResult<()> {
        validation::validate_url(&self.upstream.stream_uri, "STREAM_URI")?;
        validation::validate_url(&self.upstream.poll_uri, "POLL_URI")?;
        validation::validate_url(&self.upstream.events_uri, "EVENTS_URI")?;

        if self.listen.port == 0 {
            return Err(ConfigError::validation_failed(
                "PORT must be greater than 0",
                "listen",
                "use a valid TCP port",
                vec![("port".to_string(), self.listen.port.to_string())],
            ));
        }

        if self.events.capacity == 0 {
            return Err(ConfigError::validation_failed(
                "EVENT_CAPACITY must be greater than 0",
                "events",
                "set a positive queue capacity",
                vec![("capacity".to_string(), self.events.capacity.to_string())],
            ));
        }

        if self.environments.is_empty() {
            return Err(ConfigError::RequiredFieldMissing("environments".to_string()));
        }
        for env in &self.environments {
            validation::validate_non_empty_string(&env.sdk_key, "sdk_key")?;
        }

        if self.persistent_store.backend == PersistentBackend::Redis && self.persistent_store.url.is_none() {
            return Err(ConfigError::RequiredFieldMissing("PERSISTENT_STORE_URL".to_string()));
        }

        Ok(())
    }
}
