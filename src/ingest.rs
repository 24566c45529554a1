//! Loads a raw ratings CSV into the shared store for one period.
//!
//! The input has `UserId,ProductId,Rating,Timestamp` columns (matched
//! case-insensitively) with the timestamp in UNIX seconds. Only rows whose
//! UTC calendar month equals the period are kept. Missing values in the other
//! columns are stored as nulls; the rollup's cleaner removes them later.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Datelike};
use serde::Deserialize;
use tracing::info;

use crate::analyzers::types::RawRating;
use crate::config::Period;
use crate::error::{PipelineError, Result};
use crate::services::record_store::RecordSink;

const REQUIRED_COLUMNS: [&str; 4] = ["userid", "productid", "rating", "timestamp"];

#[derive(Debug, Deserialize)]
struct CsvRating {
    userid: Option<String>,
    productid: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option")]
    rating: Option<f64>,
    #[serde(deserialize_with = "csv::invalid_option")]
    timestamp: Option<i64>,
}

/// Counts reported by an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub rows_read: usize,
    pub rows_loaded: usize,
}

/// Parses `reader` and returns the rows that fall in `period`, plus the
/// total number of rows read.
pub fn read_ratings_csv<R: Read>(reader: R, period: Period) -> Result<(Vec<RawRating>, usize)> {
    let ingest_err = |e: csv::Error| PipelineError::Ingest(e.to_string());

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: csv::StringRecord = rdr
        .headers()
        .map_err(ingest_err)?
        .iter()
        .map(|h| h.to_lowercase())
        .collect();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(PipelineError::Ingest(format!("missing column '{column}'")));
        }
    }
    rdr.set_headers(headers);

    let mut rows_read = 0usize;
    let mut records = Vec::new();
    for result in rdr.deserialize() {
        let row: CsvRating = result.map_err(ingest_err)?;
        rows_read += 1;

        let Some(timestamp) = row
            .timestamp
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
        else {
            continue;
        };
        if timestamp.month() != u32::from(period.get()) {
            continue;
        }

        records.push(RawRating {
            user_id: row.userid,
            product_id: row.productid,
            rating: row.rating,
            timestamp: Some(timestamp.naive_utc()),
        });
    }

    info!(rows_read, rows_kept = records.len(), period = %period, "Filtered raw ratings");
    Ok((records, rows_read))
}

/// Reads `path`, keeps `period`'s rows and replaces the period table in `sink`.
#[tracing::instrument(skip(sink), fields(path = %path.display(), period = %period))]
pub async fn ingest_file(path: &Path, period: Period, sink: &dyn RecordSink) -> Result<IngestReport> {
    let file = File::open(path)
        .map_err(|e| PipelineError::Ingest(format!("cannot open {}: {e}", path.display())))?;
    let (records, rows_read) = read_ratings_csv(file, period)?;

    sink.replace_period(period, &records).await?;

    info!(rows = records.len(), table = %period.table_name(), "Ingestion complete");
    Ok(IngestReport {
        rows_read,
        rows_loaded: records.len(),
    })
}
