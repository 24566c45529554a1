//! Error taxonomy shared by every stage of a rollup run.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::Period;

/// Failure kinds surfaced by the pipeline.
///
/// A zero-row aggregate is not an error: it publishes a header-only artifact.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Connection or authentication failure against the shared store.
    #[error("ratings store is unavailable: {0}")]
    StoreUnavailable(String),

    /// The requested period was never ingested.
    #[error("no ratings table exists for period {period}")]
    TableNotFound { period: Period },

    /// Staging write, verification or atomic replace failed.
    /// The previous artifact is left untouched.
    #[error("failed to publish artifact {}: {reason}", path.display())]
    PublishFailed { path: PathBuf, reason: String },

    /// The raw ratings dataset could not be read.
    #[error("ingestion failed: {0}")]
    Ingest(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Stable, loggable classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    StoreUnavailable,
    TableNotFound,
    PublishFailed,
    Ingest,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::StoreUnavailable => "store_unavailable",
            ErrorKind::TableNotFound => "table_not_found",
            ErrorKind::PublishFailed => "publish_failed",
            ErrorKind::Ingest => "ingest_failed",
            ErrorKind::Config => "config_error",
        }
    }

    /// Process exit status reported to the invoking scheduler.
    pub fn exit_code(&self) -> u8 {
        match self {
            ErrorKind::StoreUnavailable => 2,
            ErrorKind::TableNotFound => 3,
            ErrorKind::PublishFailed => 4,
            ErrorKind::Ingest => 5,
            ErrorKind::Config => 64,
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            PipelineError::TableNotFound { .. } => ErrorKind::TableNotFound,
            PipelineError::PublishFailed { .. } => ErrorKind::PublishFailed,
            PipelineError::Ingest(_) => ErrorKind::Ingest,
            PipelineError::Config(_) => ErrorKind::Config,
        }
    }

    pub(crate) fn publish(path: impl Into<PathBuf>, reason: impl std::fmt::Display) -> Self {
        PipelineError::PublishFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_not_found_names_period() {
        let err = PipelineError::TableNotFound {
            period: Period::new(6).unwrap(),
        };
        assert_eq!(err.to_string(), "no ratings table exists for period 6");
        assert_eq!(err.kind(), ErrorKind::TableNotFound);
    }

    #[test]
    fn test_publish_failed_includes_path_and_reason() {
        let err = PipelineError::publish("/output/a.csv", "disk full");
        let msg = err.to_string();
        assert!(msg.contains("/output/a.csv"));
        assert!(msg.contains("disk full"));
        assert_eq!(err.kind(), ErrorKind::PublishFailed);
    }

    #[test]
    fn test_exit_codes_are_distinct_and_nonzero() {
        let kinds = [
            ErrorKind::StoreUnavailable,
            ErrorKind::TableNotFound,
            ErrorKind::PublishFailed,
            ErrorKind::Ingest,
            ErrorKind::Config,
        ];
        let mut codes: Vec<u8> = kinds.iter().map(ErrorKind::exit_code).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }
}
