//! Capability traits at the pipeline's seams.
//!
//! The rollup only talks to the shared store and the artifact store through
//! these traits, so either side can be swapped for an in-memory fake.

pub mod publisher;
pub mod record_store;

pub use publisher::{ArtifactPublisher, PublishReceipt};
pub use record_store::{RecordSink, RecordSource};
