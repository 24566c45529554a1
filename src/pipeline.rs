//! One rollup run: read, clean, aggregate, publish.

use tracing::{error, info};

use crate::analyzers::{aggregate, clean};
use crate::config::Period;
use crate::error::Result;
use crate::services::publisher::{ArtifactPublisher, PublishReceipt};
use crate::services::record_store::RecordSource;

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub period: Period,
    pub rows_read: usize,
    pub rows_clean: usize,
    pub dropped_null: usize,
    pub dropped_duplicate: usize,
    pub aggregate_rows: usize,
    pub artifact: PublishReceipt,
}

/// Runs every stage for `period` and publishes the result.
///
/// The first failing stage aborts the run and its error is returned
/// unchanged. Nothing is published unless every earlier stage succeeded, and
/// re-running with the same period replaces the previous artifact.
#[tracing::instrument(skip(source, publisher), fields(period = %period))]
pub async fn run(
    period: Period,
    source: &dyn RecordSource,
    publisher: &dyn ArtifactPublisher,
) -> Result<RunReport> {
    let result = run_stages(period, source, publisher).await;
    match &result {
        Ok(report) => info!(
            rows_read = report.rows_read,
            aggregate_rows = report.aggregate_rows,
            artifact = %report.artifact.location,
            "Rollup complete"
        ),
        Err(e) => error!(kind = e.kind().as_str(), error = %e, "Rollup failed"),
    }
    result
}

async fn run_stages(
    period: Period,
    source: &dyn RecordSource,
    publisher: &dyn ArtifactPublisher,
) -> Result<RunReport> {
    info!(table = %period.table_name(), "Reading period table");
    let raw = source.read(period).await?;
    let rows_read = raw.len();
    info!(rows_read, "Rows read");

    let cleaned = clean(raw);
    info!(
        rows_clean = cleaned.records.len(),
        dropped_null = cleaned.dropped_null,
        dropped_duplicate = cleaned.dropped_duplicate,
        "Cleaning complete"
    );

    info!("Performing aggregation");
    let rows = aggregate(&cleaned.records);
    if rows.is_empty() {
        info!("No products with complete ratings; publishing header-only artifact");
    }

    let artifact = publisher.publish(period, &rows).await?;

    Ok(RunReport {
        period,
        rows_read,
        rows_clean: cleaned.records.len(),
        dropped_null: cleaned.dropped_null,
        dropped_duplicate: cleaned.dropped_duplicate,
        aggregate_rows: rows.len(),
        artifact,
    })
}
