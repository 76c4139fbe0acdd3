//! Per-environment lifecycle: wires the store, the upstream stream client,
//! the broadcaster, and the two event relays together, exposes a readiness
//! signal per environment, and tears everything down on shutdown.

use crate::broadcaster::Broadcaster;
use crate::evaluator::Evaluator;
use crate::events::{SummarizingRelay, VerbatimRelay};
use crate::persistent::PersistentAdapter;
use crate::upstream::{PollRequestor, UpstreamEventPoster, UpstreamStreamClient};
use relay_core::config::{EnvironmentConfig, PersistentBackend, RelayConfig};
use relay_core::{store, RelayError, Result, SharedStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Everything the HTTP handlers need for one configured environment.
pub struct EnvironmentHandle {
    pub name: String,
    pub sdk_key: String,
    pub mobile_key: Option<String>,
    pub env_id: Option<String>,
    pub store: SharedStore,
    pub broadcaster: Broadcaster,
    pub stream_client: Arc<UpstreamStreamClient>,
    pub poll_requestor: PollRequestor,
    pub verbatim: Arc<VerbatimRelay>,
    pub summarizing: Arc<SummarizingRelay>,
    pub persistent: Arc<dyn PersistentAdapter>,
    pub evaluator: Arc<dyn Evaluator>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl EnvironmentHandle {
    /// `GET /status` summary for this environment: store readiness plus
    /// upstream stream/backend health.
    pub fn health(&self) -> EnvironmentHealth {
        EnvironmentHealth {
            data_store_status: if self.persistent.is_available() { "VALID" } else { "UNAVAILABLE" },
            stream_initialized: self.store.is_initialized(),
            upstream_healthy: !matches!(
                self.stream_client.state(),
                crate::upstream::StreamState::Terminal
            ),
        }
    }
}

/// Shape of one entry in `GET /status`'s `environments` map.
#[derive(Debug, serde::Serialize)]
pub struct EnvironmentHealth {
    #[serde(rename = "dataStoreStatus")]
    pub data_store_status: &'static str,
    #[serde(rename = "streamInitialized")]
    pub stream_initialized: bool,
    #[serde(rename = "upstreamHealthy")]
    pub upstream_healthy: bool,
}

/// Owns every configured environment's [`EnvironmentHandle`] for the
/// lifetime of the process.
pub struct Supervisor {
    pub environments: HashMap<String, Arc<EnvironmentHandle>>,
}

impl Supervisor {
    /// Resolve the environment whose server-side SDK key matches
    /// `Authorization`. Used by the `/all`, `/sdk/latest-all`, and `/bulk`
    /// routes.
    pub fn find_by_sdk_key(&self, sdk_key: &str) -> Option<&Arc<EnvironmentHandle>> {
        self.environments.values().find(|handle| handle.sdk_key == sdk_key)
    }

    /// Resolve the environment whose mobile key matches `Authorization`.
    /// Used by the `/meval`/`REPORT /meval` and `/mobile/events/bulk` routes.
    pub fn find_by_mobile_key(&self, mobile_key: &str) -> Option<&Arc<EnvironmentHandle>> {
        self.environments.values().find(|handle| handle.mobile_key.as_deref() == Some(mobile_key))
    }

    /// Resolve the environment named by a client-side route's `<envKey>`
    /// path segment. Falls back to matching `name` so a deployment that
    /// never set `env_id` can still be addressed.
    pub fn find_by_env_key(&self, env_key: &str) -> Option<&Arc<EnvironmentHandle>> {
        self.environments
            .values()
            .find(|handle| handle.env_id.as_deref() == Some(env_key) || handle.name == env_key)
    }

    /// Construct the store, stream client, broadcaster, and relays for
    /// every configured environment, then start each environment's
    /// upstream stream client and relay flushers. Returns once every
    /// environment's tasks are spawned — `wait_ready` on an individual
    /// handle's `stream_client` is the caller's signal that the first
    /// `put` has landed for that environment.
    pub async fn start(config: &RelayConfig, evaluator: Arc<dyn Evaluator>) -> Result<Arc<Self>> {
        let http_client = reqwest::Client::builder()
            .user_agent(format!("flag-relay/{}", relay_core::VERSION))
            .build()
            .map_err(|e| RelayError::Config { message: format!("failed to build HTTP client: {}", e) })?;

        let mut environments = HashMap::new();
        for env_config in &config.environments {
            let handle = Self::start_environment(config, env_config, &http_client, evaluator.clone()).await?;
            environments.insert(env_config.name.clone(), handle);
        }

        Ok(Arc::new(Self { environments }))
    }

    async fn start_environment(
        config: &RelayConfig,
        env_config: &EnvironmentConfig,
        http_client: &reqwest::Client,
        evaluator: Arc<dyn Evaluator>,
    ) -> Result<Arc<EnvironmentHandle>> {
        let store = store::shared_store();
        let broadcaster = Broadcaster::for_environment(env_config.name.clone(), 100);
        let persistent = build_persistent_adapter(config, http_client).await?;

        if backing_store_has_data(persistent.as_ref()).await {
            warm_store_from_persistent(&store, persistent.as_ref()).await;
        }

        let poll_requestor =
            PollRequestor::new(http_client.clone(), config.upstream.poll_uri.clone(), env_config.sdk_key.clone());
        let stream_client = Arc::new(UpstreamStreamClient::for_environment(
            http_client.clone(),
            config.upstream.stream_uri.clone(),
            env_config.sdk_key.clone(),
            env_config.name.clone(),
            store.clone(),
            broadcaster.clone(),
            poll_requestor.clone(),
            persistent.clone(),
        ));

        let poster = UpstreamEventPoster::new(http_client.clone(), config.upstream.events_uri.clone(), env_config.sdk_key.clone());
        let verbatim = VerbatimRelay::new(env_config.name.clone(), config.events.clone(), poster.clone());
        let summarizing = SummarizingRelay::new(env_config.name.clone(), config.events.clone(), poster);

        let handle = Arc::new(EnvironmentHandle {
            name: env_config.name.clone(),
            sdk_key: env_config.sdk_key.clone(),
            mobile_key: env_config.mobile_key.clone(),
            env_id: env_config.env_id.clone(),
            store,
            broadcaster,
            stream_client: stream_client.clone(),
            poll_requestor,
            verbatim: verbatim.clone(),
            summarizing: summarizing.clone(),
            persistent,
            evaluator,
            tasks: std::sync::Mutex::new(Vec::new()),
        });

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(async move { stream_client.run().await }));
        tasks.push(verbatim.spawn_flusher());
        tasks.push(summarizing.spawn_flusher());
        *handle.tasks.lock().expect("tasks mutex poisoned") = tasks;

        Ok(handle)
    }

    /// Drain queues (best-effort, bounded by `timeout`), flush once more,
    /// then abort every background task. One bad environment's shutdown
    /// failure doesn't stop the others.
    pub async fn shutdown(&self, timeout: Duration) {
        for handle in self.environments.values() {
            let flush = async {
                handle.verbatim.flush().await;
                handle.summarizing.flush().await;
            };
            if tokio::time::timeout(timeout, flush).await.is_err() {
                tracing::warn!(environment = %handle.name, "shutdown flush timed out, dropping remaining queued events");
            }
            for task in handle.tasks.lock().expect("tasks mutex poisoned").drain(..) {
                task.abort();
            }
        }
    }
}

async fn build_persistent_adapter(
    config: &RelayConfig,
    #[allow(unused_variables)] http_client: &reqwest::Client,
) -> Result<Arc<dyn PersistentAdapter>> {
    match config.persistent_store.backend {
        PersistentBackend::None => Ok(Arc::new(crate::persistent::NoopAdapter)),
        PersistentBackend::Redis => {
            #[cfg(feature = "redis-backend")]
            {
                let url = config.persistent_store.url.as_deref().ok_or_else(|| RelayError::Config {
                    message: "PERSISTENT_STORE_URL is required when backend=redis".to_string(),
                })?;
                let adapter = crate::persistent::redis::RedisAdapter::connect(
                    url,
                    config.persistent_store.ttl,
                    config.persistent_store.prefix.clone(),
                )
                .await?;
                Ok(Arc::new(adapter) as Arc<dyn PersistentAdapter>)
            }
            #[cfg(not(feature = "redis-backend"))]
            {
                Err(RelayError::Config { message: "backend=redis requires the redis-backend feature".to_string() })
            }
        }
    }
}

/// Whether the backing store already holds prior data, queried directly
/// rather than via `is_initialized()` — a freshly connected adapter's
/// in-process flag starts `false` regardless of what the backend holds, so
/// the cold-start warm path has to ask the backend itself.
async fn backing_store_has_data(persistent: &dyn PersistentAdapter) -> bool {
    for kind in relay_core::Kind::all() {
        match persistent.get_all(kind).await {
            Ok(items) if !items.is_empty() => return true,
            Ok(_) => {}
            Err(error) => tracing::warn!(%error, ?kind, "failed to query persistent backend for warm-start check"),
        }
    }
    false
}

async fn warm_store_from_persistent(store: &SharedStore, persistent: &dyn PersistentAdapter) {
    let mut snapshot = relay_core::model::empty_snapshot();
    for kind in relay_core::Kind::all() {
        match persistent.get_all(kind).await {
            Ok(items) => {
                let bucket = snapshot.get_mut(&kind).expect("empty_snapshot populates every kind");
                for item in items {
                    bucket.insert(item.key.clone(), item);
                }
            }
            Err(error) => tracing::warn!(%error, ?kind, "failed to warm store from persistent backend"),
        }
    }
    store.init(snapshot).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::PassthroughEvaluator;
    use relay_core::testing::test_config;

    #[tokio::test]
    async fn start_builds_one_handle_per_configured_environment() {
        let config = test_config();
        let supervisor = Supervisor::start(&config, Arc::new(PassthroughEvaluator)).await.unwrap();
        assert_eq!(supervisor.environments.len(), 1);
        assert!(supervisor.environments.contains_key("test"));
        supervisor.shutdown(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn fresh_environment_reports_unhealthy_stream_until_first_put() {
        let config = test_config();
        let supervisor = Supervisor::start(&config, Arc::new(PassthroughEvaluator)).await.unwrap();
        let handle = &supervisor.environments["test"];
        assert!(!handle.health().stream_initialized);
        supervisor.shutdown(Duration::from_millis(100)).await;
    }
}
