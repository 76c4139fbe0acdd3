//! The `Evaluator` seam: flag evaluation for client-side/mobile endpoints
//! is intentionally kept out of the core relay pipeline, but the
//! downstream stream and polling handlers need *something* that turns a
//! store snapshot plus a user JSON document into the user-scoped flag map
//! those SDKs expect. This trait is that external collaborator; the relay
//! ships one reference implementation that evaluates the `on`/`value`
//! shape a test double would use, matching the opaque-payload contract
//! the store itself keeps.

use async_trait::async_trait;
use relay_core::{Snapshot, VersionedItem};
use serde_json::Value;

/// Evaluates a flag/segment snapshot against a user context. Production
/// deployments would plug in the real LaunchDarkly evaluation engine here;
/// the relay core never inspects flag internals itself.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Produce the user-scoped flag map served as the initial `put`/poll
    /// body for client-side and mobile endpoints.
    async fn evaluate_all(&self, snapshot: &Snapshot, user: &Value) -> Value;
}

/// A pass-through evaluator: returns each flag's raw payload merged with
/// its `key`, ignoring prerequisites/targeting/rollout rules. Sufficient
/// for tests and for deployments happy to let downstream SDKs see the same
/// data server-side SDKs see; a real evaluator replaces this wholesale.
pub struct PassthroughEvaluator;

#[async_trait]
impl Evaluator for PassthroughEvaluator {
    async fn evaluate_all(&self, snapshot: &Snapshot, _user: &Value) -> Value {
        let mut flags = serde_json::Map::new();
        if let Some(bucket) = snapshot.get(&relay_core::Kind::Flags) {
            for (key, item) in bucket {
                flags.insert(key.clone(), item_value(item));
            }
        }
        Value::Object(flags)
    }
}

fn item_value(item: &VersionedItem) -> Value {
    let text = std::str::from_utf8(&item.payload).unwrap_or("{}");
    serde_json::from_str(text).unwrap_or(Value::Null)
}
