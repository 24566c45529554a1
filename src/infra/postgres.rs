use std::time::Duration;

use futures::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use crate::analyzers::types::RawRating;
use crate::config::{Period, StoreConfig};
use crate::error::{PipelineError, Result};
use crate::services::record_store::{RecordSink, RecordSource};

/// SQLSTATE for `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

/// Rows per multi-row INSERT during ingestion.
const INSERT_BATCH: usize = 1_000;

/// Rows between progress logs while streaming a period table.
const READ_PROGRESS_EVERY: usize = 100_000;

/// Shared ratings store backed by PostgreSQL.
///
/// Reads stream rows from the server instead of buffering the whole result
/// set in the driver, so only the decoded records are held in memory.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Opens a connection pool. Any connect or auth failure is `StoreUnavailable`.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(connect_options(config))
            .await
            .map_err(|e| {
                PipelineError::StoreUnavailable(format!(
                    "cannot connect to {}:{}/{}: {e}",
                    config.host, config.port, config.database
                ))
            })?;

        info!(host = %config.host, port = config.port, database = %config.database, "Connected to ratings store");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn connect_options(config: &StoreConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.database)
        .username(&config.user)
        .password(&config.password)
}

fn select_sql(period: Period) -> String {
    format!(
        "SELECT userid, productid, rating, \"timestamp\" FROM {}",
        period.table_name()
    )
}

fn create_table_sql(period: Period) -> String {
    format!(
        "CREATE TABLE {} (userid TEXT, productid TEXT, rating FLOAT, \"timestamp\" TIMESTAMP)",
        period.table_name()
    )
}

fn is_undefined_table(code: Option<&str>) -> bool {
    code == Some(UNDEFINED_TABLE)
}

fn classify(err: sqlx::Error, period: Period) -> PipelineError {
    if let sqlx::Error::Database(db) = &err {
        if is_undefined_table(db.code().as_deref()) {
            return PipelineError::TableNotFound { period };
        }
    }
    PipelineError::StoreUnavailable(err.to_string())
}

fn decode(row: &PgRow) -> std::result::Result<RawRating, sqlx::Error> {
    Ok(RawRating {
        user_id: row.try_get("userid")?,
        product_id: row.try_get("productid")?,
        rating: row.try_get("rating")?,
        timestamp: row.try_get("timestamp")?,
    })
}

#[async_trait::async_trait]
impl RecordSource for PostgresStore {
    #[tracing::instrument(skip(self), fields(table = %period.table_name()))]
    async fn read(&self, period: Period) -> Result<Vec<RawRating>> {
        let sql = select_sql(period);
        let mut stream = sqlx::query(&sql).fetch(&self.pool);
        let mut records = Vec::new();

        while let Some(row) = stream.try_next().await.map_err(|e| classify(e, period))? {
            records.push(decode(&row).map_err(|e| classify(e, period))?);
            if records.len() % READ_PROGRESS_EVERY == 0 {
                debug!(rows = records.len(), "Reading period table");
            }
        }

        info!(rows = records.len(), "Period table read");
        Ok(records)
    }
}

#[async_trait::async_trait]
impl RecordSink for PostgresStore {
    #[tracing::instrument(skip(self, rows), fields(table = %period.table_name(), rows = rows.len()))]
    async fn replace_period(&self, period: Period, rows: &[RawRating]) -> Result<()> {
        let table = period.table_name();
        let fail = |e: sqlx::Error| classify(e, period);

        let mut tx = self.pool.begin().await.map_err(fail)?;

        info!("Dropping and recreating table");
        sqlx::query(&format!("DROP TABLE IF EXISTS {table}"))
            .execute(&mut *tx)
            .await
            .map_err(fail)?;
        sqlx::query(&create_table_sql(period))
            .execute(&mut *tx)
            .await
            .map_err(fail)?;

        for chunk in rows.chunks(INSERT_BATCH) {
            let mut insert: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {table} (userid, productid, rating, \"timestamp\") "
            ));
            insert.push_values(chunk, |mut b, r| {
                b.push_bind(r.user_id.as_deref())
                    .push_bind(r.product_id.as_deref())
                    .push_bind(r.rating)
                    .push_bind(r.timestamp);
            });
            insert.build().execute(&mut *tx).await.map_err(fail)?;
        }

        tx.commit().await.map_err(fail)?;
        info!("Period table replaced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_sql_targets_period_table() {
        let sql = select_sql(Period::new(6).unwrap());
        assert_eq!(
            sql,
            "SELECT userid, productid, rating, \"timestamp\" FROM ratings_month_6"
        );
    }

    #[test]
    fn test_create_table_sql() {
        let sql = create_table_sql(Period::new(11).unwrap());
        assert!(sql.starts_with("CREATE TABLE ratings_month_11 ("));
        assert!(sql.contains("rating FLOAT"));
    }

    #[test]
    fn test_undefined_table_code() {
        assert!(is_undefined_table(Some("42P01")));
        assert!(!is_undefined_table(Some("28P01")));
        assert!(!is_undefined_table(None));
    }

    #[test]
    fn test_non_database_errors_are_store_unavailable() {
        let err = classify(sqlx::Error::PoolTimedOut, Period::new(6).unwrap());
        assert!(matches!(err, PipelineError::StoreUnavailable(_)));
    }
}
