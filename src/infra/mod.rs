//! Adapters behind the [`crate::services`] traits.
//!
//! [`PostgresStore`] reads and replaces period tables in the shared store.
//! [`InMemoryStore`] is a process-local stand-in for tests and dry runs.
//! [`S3ArtifactStore`] publishes artifacts to an S3 bucket.

mod memory;
mod postgres;
mod s3;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use s3::S3ArtifactStore;
