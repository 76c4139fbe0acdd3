//! Body parsing and schema-version dispatch shared by every ingest route
//! (`/bulk`, `/events/bulk/<env>`, `/mobile/events/bulk`). Kept free of
//! actix types so it can be unit tested without spinning up an HTTP
//! server; [`crate::handlers::events`] wraps this in the actual routes and
//! supplies the required `202`-before-processing behavior.

use crate::events::{SummarizingRelay, VerbatimRelay};
use serde_json::Value;
use std::sync::Arc;

/// Event schema version at or above which payloads are relayed verbatim
/// rather than summarized locally.
const VERBATIM_SCHEMA_THRESHOLD: u32 = 3;

/// Default schema version assumed when the header is absent.
const DEFAULT_SCHEMA_VERSION: u32 = 1;

/// What `dispatch` decided to do with a parsed batch; exposed for tests and
/// for the `/status` endpoint's "last ingest" bookkeeping, if ever added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Body was empty; caller should respond `400`.
    EmptyBody,
    /// Body failed to parse as a JSON array; dropped and logged.
    Malformed,
    /// Handed to the verbatim relay.
    Verbatim { count: usize },
    /// Handed to the summarizing relay.
    Summarized { count: usize },
}

/// Parse `X-LaunchDarkly-Event-Schema`, defaulting to 1 when absent or
/// unparseable (an unparseable header is treated the same as "absent"
/// rather than rejected, matching the lenient posture taken toward
/// malformed inputs elsewhere in the pipeline).
pub fn schema_version_from_header(header: Option<&str>) -> u32 {
    header.and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_SCHEMA_VERSION)
}

/// Parse `body` and route it to the verbatim or summarizing relay based on
/// `schema_version`. Called from the `EventIngest` background task, after
/// the `202` has already been written to the client.
pub async fn dispatch(
    body: &[u8],
    schema_version: u32,
    verbatim: &Arc<VerbatimRelay>,
    summarizing: &Arc<SummarizingRelay>,
) -> IngestOutcome {
    if body.is_empty() {
        return IngestOutcome::EmptyBody;
    }

    let events: Vec<Value> = match serde_json::from_slice(body) {
        Ok(events) => events,
        Err(error) => {
            tracing::warn!(%error, "dropping malformed event ingest body");
            return IngestOutcome::Malformed;
        }
    };
    let count = events.len();

    if schema_version >= VERBATIM_SCHEMA_THRESHOLD {
        verbatim.submit(events).await;
        IngestOutcome::Verbatim { count }
    } else {
        summarizing.submit(events).await;
        IngestOutcome::Summarized { count }
    }
}
