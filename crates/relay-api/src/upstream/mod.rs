//! Everything that talks to LaunchDarkly's upstream endpoints: the SSE
//! stream client that keeps the [`relay_core::VersionedStore`] live, the
//! polling requestor it falls back to on `indirect/patch`/`indirect/put`,
//! and the event poster used by the event-forwarding pipeline.

pub mod event_poster;
pub mod poller;
pub mod stream_client;

pub use event_poster::UpstreamEventPoster;
pub use poller::PollRequestor;
pub use stream_client::{StreamState, UpstreamStreamClient};
