//! SSE wire format shared by the `UpstreamStreamClient` (decoding) and the
//! `DownstreamStreamHandler` (encoding): `put`/`patch`/`delete`/
//! `indirect-patch`/`indirect-put` events. No `id:` field is emitted,
//! matching the upstream protocol.

pub mod wire;

pub use wire::{
    encode_delete, encode_eval_put, encode_heartbeat, encode_patch, encode_put, parse_sse_event,
    SseEvent, SseFrameBuffer,
};
