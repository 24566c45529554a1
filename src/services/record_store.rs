//! Traits for reading and replacing a period's ratings in the shared store.

use crate::analyzers::types::RawRating;
use crate::config::Period;
use crate::error::Result;

/// Read side of the shared store.
#[async_trait::async_trait]
pub trait RecordSource: Send + Sync {
    /// Returns every stored row for `period`.
    ///
    /// Fails with `StoreUnavailable` when the store cannot be reached and
    /// `TableNotFound` when the period was never ingested. Implementations may
    /// read in chunks, but always return the consolidated set.
    async fn read(&self, period: Period) -> Result<Vec<RawRating>>;
}

/// Write side of the shared store, used by ingestion.
#[async_trait::async_trait]
pub trait RecordSink: Send + Sync {
    /// Drops any existing table for `period` and recreates it holding `rows`.
    async fn replace_period(&self, period: Period, rows: &[RawRating]) -> Result<()>;
}
