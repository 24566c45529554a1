//! Trait for publishing a period's aggregate as its single current artifact.

use crate::analyzers::types::AggregateRow;
use crate::config::Period;
use crate::error::Result;

/// Where an artifact ended up and how large it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Filesystem path or object URI of the canonical artifact.
    pub location: String,
    pub bytes: usize,
    pub rows: usize,
}

#[async_trait::async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Replaces the canonical artifact for `period` with `rows`.
    ///
    /// Readers see either the previous artifact or the new one in full. On
    /// failure the previous artifact is left untouched and `PublishFailed` is
    /// returned.
    async fn publish(&self, period: Period, rows: &[AggregateRow]) -> Result<PublishReceipt>;
}
