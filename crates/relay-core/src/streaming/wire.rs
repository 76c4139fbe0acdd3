//! Encoding and decoding of the flag-relay SSE frame format.
//!
//! Every frame is a standard `event: <name>\ndata: <json>\n\n` pair with no
//! `id:` field — reconnect state is carried by the full `put` snapshot sent
//! on every new connection, not by `Last-Event-ID` replay.

use crate::error::{RelayError, Result};
use crate::model::{Kind, Snapshot};
use bytes::Bytes;
use serde_json::Value;

/// A decoded upstream (or downstream) SSE event, after the `event:`/`data:`
/// lines have been split and the `data:` payload parsed as JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// Full snapshot of every kind's live items.
    Put(Snapshot),
    /// A single item changed; carries the namespace path (`/flags/f1`),
    /// the new version, and the raw item payload.
    Patch { path: String, version: i64, payload: Vec<u8> },
    /// A single item was removed.
    Delete { path: String, version: i64 },
    /// Upstream signals a change occurred but withholds the payload; the
    /// relay must re-poll the item via the REST API.
    IndirectPatch { path: String },
    /// Upstream signals the full snapshot changed without shipping it; the
    /// relay must re-poll the full snapshot via the REST API.
    IndirectPut,
    /// A keep-alive comment line (`:` prefix) with no semantic content.
    Heartbeat,
}

/// Parse one complete SSE frame (the text between two blank lines) into an
/// [`SseEvent`]. Returns [`RelayError::MalformedPayload`] for a frame this
/// relay doesn't understand, which the caller treats as fatal for the
/// current connection (per the upstream protocol, an unrecognized event
/// means the client's assumptions about data shape no longer hold).
pub fn parse_sse_event(event_name: &str, data: &str) -> Result<SseEvent> {
    if event_name.is_empty() && data.is_empty() {
        return Ok(SseEvent::Heartbeat);
    }

    let malformed = |message: String| RelayError::MalformedPayload { message };

    match event_name {
        "put" => {
            let value: Value = serde_json::from_str(data)
                .map_err(|e| malformed(format!("put payload is not JSON: {}", e)))?;
            Ok(SseEvent::Put(snapshot_from_put_value(value)?))
        }
        "patch" => {
            let value: Value = serde_json::from_str(data)
                .map_err(|e| malformed(format!("patch payload is not JSON: {}", e)))?;
            let path = value
                .get("path")
                .and_then(|p| p.as_str())
                .ok_or_else(|| malformed("patch missing path".to_string()))?
                .to_string();
            let version = value
                .get("data")
                .and_then(|d| d.get("version"))
                .and_then(|v| v.as_i64())
                .ok_or_else(|| malformed("patch missing data.version".to_string()))?;
            let payload = value
                .get("data")
                .map(|d| d.to_string().into_bytes())
                .unwrap_or_default();
            Ok(SseEvent::Patch { path, version, payload })
        }
        "delete" => {
            let value: Value = serde_json::from_str(data)
                .map_err(|e| malformed(format!("delete payload is not JSON: {}", e)))?;
            let path = value
                .get("path")
                .and_then(|p| p.as_str())
                .ok_or_else(|| malformed("delete missing path".to_string()))?
                .to_string();
            let version = value
                .get("version")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| malformed("delete missing version".to_string()))?;
            Ok(SseEvent::Delete { path, version })
        }
        "indirect/patch" => {
            let path = data.trim().trim_matches('"').to_string();
            Ok(SseEvent::IndirectPatch { path })
        }
        "indirect/put" => Ok(SseEvent::IndirectPut),
        other => Err(malformed(format!("unrecognized event type: {}", other))),
    }
}

fn snapshot_from_put_value(value: Value) -> Result<Snapshot> {
    let data = value
        .get("data")
        .ok_or_else(|| RelayError::MalformedPayload { message: "put missing data".to_string() })?;
    let mut snapshot = crate::model::empty_snapshot();
    for kind in Kind::all() {
        let Some(items) = data.get(kind.namespace()).and_then(|v| v.as_object()) else {
            continue;
        };
        let bucket = snapshot.get_mut(&kind).expect("empty_snapshot populates every kind");
        for (key, item_value) in items {
            let version = item_value
                .get("version")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| RelayError::MalformedPayload {
                    message: format!("{} missing version", key),
                })?;
            bucket.insert(
                key.clone(),
                crate::model::VersionedItem::live(key.clone(), version, item_value.to_string().into_bytes()),
            );
        }
    }
    Ok(snapshot)
}

/// Encode a full-snapshot `put` frame for a newly connected downstream
/// subscriber. The body is enveloped as `{path: "/", data: {flags,
/// segments}}`, distinct from the flat `{flags, segments}` shape served by
/// the `/sdk/latest-all` polling endpoint.
pub fn encode_put(snapshot: &Snapshot) -> Result<Bytes> {
    let mut data = serde_json::Map::new();
    for kind in Kind::all() {
        let mut items = serde_json::Map::new();
        if let Some(bucket) = snapshot.get(&kind) {
            for (key, item) in bucket {
                items.insert(key.clone(), item_with_version(&item.payload, item.version)?);
            }
        }
        data.insert(kind.namespace().to_string(), Value::Object(items));
    }
    let body = serde_json::json!({ "path": "/", "data": Value::Object(data) });
    sse_frame("put", &body)
}

/// Encode a `put` frame whose body is an already-evaluated flag map rather
/// than a raw [`Snapshot`], for the client-side/mobile eval stream
/// endpoints where the `Evaluator` — not the store — decides the payload
/// shape.
pub fn encode_eval_put(evaluated: &Value) -> Result<Bytes> {
    sse_frame("put", evaluated)
}

/// Encode a single-item `patch` frame.
pub fn encode_patch(kind: Kind, key: &str, version: i64, payload: &[u8]) -> Result<Bytes> {
    let body = serde_json::json!({
        "path": format!("/{}/{}", kind.namespace(), key),
        "data": item_with_version(payload, version)?,
    });
    sse_frame("patch", &body)
}

/// Merge `"version": version` into a JSON object payload, matching the
/// upstream wire shape where each item embeds its own version alongside its
/// fields.
fn item_with_version(payload: &[u8], version: i64) -> Result<Value> {
    let text = std::str::from_utf8(payload).map_err(|e| RelayError::Serialization { message: e.to_string() })?;
    let text = if text.is_empty() { "{}" } else { text };
    let mut value: Value =
        serde_json::from_str(text).map_err(|e| RelayError::Serialization { message: e.to_string() })?;
    if let Value::Object(map) = &mut value {
        map.insert("version".to_string(), Value::from(version));
    }
    Ok(value)
}

/// Encode a `delete` frame.
pub fn encode_delete(kind: Kind, key: &str, version: i64) -> Result<Bytes> {
    let body = serde_json::json!({
        "path": format!("/{}/{}", kind.namespace(), key),
        "version": version,
    });
    sse_frame("delete", &body)
}

/// Encode a heartbeat comment line. Downstream SDKs treat any line starting
/// with `:` as a no-op keep-alive.
pub fn encode_heartbeat() -> Bytes {
    Bytes::from_static(b":\n\n")
}

fn sse_frame(event: &str, body: &Value) -> Result<Bytes> {
    let data = serde_json::to_string(body).map_err(|e| RelayError::Serialization { message: e.to_string() })?;
    Ok(Bytes::from(format!("event: {}\ndata: {}\n\n", event, data)))
}

/// An in-memory line buffer that turns a raw upstream byte stream into
/// complete SSE frames (`event:`/`data:` line pairs separated by a blank
/// line).
#[derive(Debug, Default)]
pub struct SseFrameBuffer {
    buf: String,
}

impl SseFrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed newly received bytes and drain any complete frames found so
    /// far. Partial frames remain buffered for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<(String, String)> {
        self.buf.push_str(&String::from_utf8_lossy(bytes));
        let mut frames = Vec::new();

        while let Some(boundary) = self.buf.find("\n\n") {
            let frame = self.buf[..boundary].to_string();
            self.buf.drain(..boundary + 2);

            let mut event_name = String::new();
            let mut data = String::new();
            for line in frame.lines() {
                if let Some(rest) = line.strip_prefix("event:") {
                    event_name = rest.trim().to_string();
                } else if let Some(rest) = line.strip_prefix("data:") {
                    if !data.is_empty() {
                        data.push('\n');
                    }
                    data.push_str(rest.trim());
                }
            }
            frames.push((event_name, data));
        }
        frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_patch_event() {
        let data = r#"{"path":"/flags/f1","data":{"version":3,"on":true}}"#;
        let event = parse_sse_event("patch", data).unwrap();
        match event {
            SseEvent::Patch { path, version, payload } => {
                assert_eq!(path, "/flags/f1");
                assert_eq!(version, 3);
                assert!(!payload.is_empty());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn parses_delete_event() {
        let event = parse_sse_event("delete", r#"{"path":"/flags/f1","version":4}"#).unwrap();
        assert_eq!(event, SseEvent::Delete { path: "/flags/f1".to_string(), version: 4 });
    }

    #[test]
    fn parses_indirect_events() {
        assert_eq!(
            parse_sse_event("indirect/patch", "\"/flags/f1\"").unwrap(),
            SseEvent::IndirectPatch { path: "/flags/f1".to_string() }
        );
        assert_eq!(parse_sse_event("indirect/put", "").unwrap(), SseEvent::IndirectPut);
    }

    #[test]
    fn unrecognized_event_is_malformed_payload() {
        let err = parse_sse_event("bogus", "{}").unwrap_err();
        assert!(matches!(err, RelayError::MalformedPayload { .. }));
    }

    #[test]
    fn encode_then_parse_patch_round_trips_path_and_version() {
        let encoded = encode_patch(Kind::Flags, "f1", 7, br#"{"on":true}"#).unwrap();
        let text = String::from_utf8(encoded.to_vec()).unwrap();
        let data_line = text.lines().find(|l| l.starts_with("data:")).unwrap();
        let data = data_line.strip_prefix("data: ").unwrap();
        let event = parse_sse_event("patch", data).unwrap();
        match event {
            SseEvent::Patch { path, version, payload } => {
                assert_eq!(path, "/flags/f1");
                assert_eq!(version, 7);
                let payload: Value = serde_json::from_slice(&payload).unwrap();
                assert_eq!(payload["on"], Value::Bool(true));
                assert_eq!(payload["version"], Value::from(7));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn encode_eval_put_wraps_arbitrary_value_as_a_put_frame() {
        let encoded = encode_eval_put(&serde_json::json!({"f1": {"value": true, "version": 1}})).unwrap();
        let text = String::from_utf8(encoded.to_vec()).unwrap();
        assert!(text.starts_with("event: put\n"));
        assert!(text.contains("\"f1\""));
    }

    #[test]
    fn frame_buffer_splits_on_blank_line_and_buffers_partials() {
        let mut buffer = SseFrameBuffer::new();
        let frames = buffer.push(b"event: patch\ndata: {\"a\":1}\n\nevent: delete\nda");
        assert_eq!(frames, vec![("patch".to_string(), "{\"a\":1}".to_string())]);
        let more = buffer.push(b"ta: {\"b\":2}\n\n");
        assert_eq!(more, vec![("delete".to_string(), "{\"b\":2}".to_string())]);
    }
}
