//! The event-forwarding pipeline: ingest of SDK analytics payloads,
//! schema-version-aware dispatch, and the two relay implementations that
//! own the bounded queue + periodic flush + upstream POST behind that
//! dispatch.

pub mod ingest;
pub mod summarizing;
pub mod verbatim;

pub use ingest::{dispatch, schema_version_from_header, IngestOutcome};
pub use summarizing::SummarizingRelay;
pub use verbatim::VerbatimRelay;
