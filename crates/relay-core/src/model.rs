//! Data model shared by every component that touches flag/segment data.
//!
//! The store treats `flags` and `segments` as opaque versioned blobs keyed
//! by `(kind, key)` — the JSON schema of an individual record is the
//! `Evaluator`'s concern, not the relay's.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An enumerated identifier of a data collection. Kinds are process-wide
/// constants; new kinds are not expected to be added at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Flags,
    Segments,
}

impl Kind {
    /// The namespace string used in upstream SSE `path`s (`/flags/...`,
    /// `/segments/...`) and in the JSON `put`/poll snapshot body.
    pub fn namespace(&self) -> &'static str {
        match self {
            Kind::Flags => "flags",
            Kind::Segments => "segments",
        }
    }

    /// All kinds the relay tracks, in a stable order used when building a
    /// full snapshot.
    pub fn all() -> [Kind; 2] {
        [Kind::Flags, Kind::Segments]
    }

    /// Parse a kind from an upstream SSE path such as `/flags/my-flag`.
    /// Returns `None` if the path does not begin with a known namespace.
    pub fn from_path(path: &str) -> Option<(Kind, String)> {
        let path = path.strip_prefix('/')?;
        let (namespace, key) = path.split_once('/')?;
        let kind = match namespace {
            "flags" => Kind::Flags,
            "segments" => Kind::Segments,
            _ => return None,
        };
        Some((kind, key.to_string()))
    }
}

/// A single versioned record. Tombstones (`deleted = true`) are retained so
/// that an out-of-order, lower-version patch cannot resurrect a deleted
/// item; `payload` is empty bytes for tombstones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedItem {
    pub key: String,
    pub version: i64,
    pub deleted: bool,
    /// Opaque JSON payload; the relay never inspects its fields.
    #[serde(with = "payload_as_raw_value")]
    pub payload: Vec<u8>,
}

impl VersionedItem {
    /// Build a tombstone for `(key, version)`.
    pub fn tombstone(key: impl Into<String>, version: i64) -> Self {
        Self {
            key: key.into(),
            version,
            deleted: true,
            payload: Vec::new(),
        }
    }

    /// Build a live item from an already-serialized JSON payload.
    pub fn live(key: impl Into<String>, version: i64, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            version,
            deleted: false,
            payload,
        }
    }
}

/// (De)serialize `payload` as an embedded raw JSON value rather than a byte
/// array, so a `VersionedItem` round-trips as `{"key":...,"version":...,
/// "deleted":false,"payload":{...the flag JSON...}}` the way the upstream
/// wire format expects, while the relay still treats the bytes as opaque.
mod payload_as_raw_value {
    use serde::de::Error as _;
    use serde::{Deserializer, Serializer};
    use serde_json::value::RawValue;

    pub fn serialize<S: Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        if payload.is_empty() {
            return serializer.serialize_none();
        }
        let raw = RawValue::from_string(
            String::from_utf8(payload.to_vec()).map_err(serde::ser::Error::custom)?,
        )
        .map_err(serde::ser::Error::custom)?;
        serializer.serialize_some(&raw)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value: Option<Box<RawValue>> = Option::deserialize(deserializer)?;
        Ok(value.map(|v| v.get().as_bytes().to_vec()).unwrap_or_default())
    }
}

use serde::Deserialize as _;

/// `mapping Kind -> mapping Key -> VersionedItem`, produced atomically by
/// `VersionedStore::init` or by a coherent read of the store. Tombstones are
/// excluded when building the `put` snapshot sent to downstream SDKs.
pub type Snapshot = HashMap<Kind, HashMap<String, VersionedItem>>;

/// Build an empty snapshot with every kind present (even if empty), so
/// callers can always index `snapshot[&Kind::Flags]` without an `Option`.
pub fn empty_snapshot() -> Snapshot {
    Kind::all().into_iter().map(|k| (k, HashMap::new())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_path_parses_flags_and_segments() {
        assert_eq!(Kind::from_path("/flags/f1"), Some((Kind::Flags, "f1".to_string())));
        assert_eq!(Kind::from_path("/segments/s1"), Some((Kind::Segments, "s1".to_string())));
        assert_eq!(Kind::from_path("/unknown/x"), None);
        assert_eq!(Kind::from_path("no-leading-slash"), None);
    }

    #[test]
    fn tombstone_has_no_payload() {
        let item = VersionedItem::tombstone("f1", 3);
        assert!(item.deleted);
        assert!(item.payload.is_empty());
        assert_eq!(item.version, 3);
    }
}
