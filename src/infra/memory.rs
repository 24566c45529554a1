use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::analyzers::types::RawRating;
use crate::config::Period;
use crate::error::{PipelineError, Result};
use crate::services::record_store::{RecordSink, RecordSource};

/// Period tables held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<Period, Vec<RawRating>>>,
    unavailable: bool,
    reads: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every operation fails with `StoreUnavailable`.
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    pub fn with_period(self, period: Period, rows: Vec<RawRating>) -> Self {
        if let Ok(mut tables) = self.tables.write() {
            tables.insert(period, rows);
        }
        self
    }

    /// Number of successful reads served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable {
            return Err(PipelineError::StoreUnavailable(
                "in-memory store is marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

fn poisoned<T>(_: T) -> PipelineError {
    PipelineError::StoreUnavailable("in-memory store lock poisoned".to_string())
}

#[async_trait::async_trait]
impl RecordSource for InMemoryStore {
    async fn read(&self, period: Period) -> Result<Vec<RawRating>> {
        self.check_available()?;
        let tables = self.tables.read().map_err(poisoned)?;
        let rows = tables
            .get(&period)
            .cloned()
            .ok_or(PipelineError::TableNotFound { period })?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(rows)
    }
}

#[async_trait::async_trait]
impl RecordSink for InMemoryStore {
    async fn replace_period(&self, period: Period, rows: &[RawRating]) -> Result<()> {
        self.check_available()?;
        let mut tables = self.tables.write().map_err(poisoned)?;
        tables.insert(period, rows.to_vec());
        Ok(())
    }
}
