//! Database operations for `ingest_runs`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::upsert::IngestSummary;
use crate::DbError;

const RUN_COLUMNS: &str = "id, public_id, trigger_source, source_path, status, started_at, \
     completed_at, records_processed, providers_inserted, providers_updated, \
     products_inserted, products_updated, skipped_unresolved_provider, \
     skipped_missing_product_id, error_message, created_at";

/// A row from the `ingest_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngestRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub trigger_source: String,
    /// Master dataset the run read from.
    pub source_path: Option<String>,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_processed: i32,
    pub providers_inserted: i32,
    pub providers_updated: i32,
    pub products_inserted: i32,
    pub products_updated: i32,
    pub skipped_unresolved_provider: i32,
    pub skipped_missing_product_id: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn as_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Creates a new ingest run in `queued` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_ingest_run(
    pool: &PgPool,
    trigger_source: &str,
    source_path: Option<&str>,
) -> Result<IngestRunRow, DbError> {
    let row = sqlx::query_as::<_, IngestRunRow>(&format!(
        "INSERT INTO ingest_runs (public_id, trigger_source, source_path, status) \
         VALUES ($1, $2, $3, 'queued') \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(trigger_source)
    .bind(source_path)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidIngestRunTransition`] if the run is not
/// `queued`, or [`DbError::Sqlx`] if the update fails.
pub async fn start_ingest_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE ingest_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidIngestRunTransition {
            id,
            expected_status: "queued",
        });
    }

    Ok(())
}

/// Marks a run as `succeeded` and records its summary counts.
///
/// # Errors
///
/// Returns [`DbError::InvalidIngestRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn complete_ingest_run(
    pool: &PgPool,
    id: i64,
    summary: &IngestSummary,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE ingest_runs \
         SET status = 'succeeded', completed_at = NOW(), \
             records_processed = $2, providers_inserted = $3, providers_updated = $4, \
             products_inserted = $5, products_updated = $6, \
             skipped_unresolved_provider = $7, skipped_missing_product_id = $8 \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(as_i32(summary.records))
    .bind(as_i32(summary.providers_inserted))
    .bind(as_i32(summary.providers_updated))
    .bind(as_i32(summary.products_inserted))
    .bind(as_i32(summary.products_updated))
    .bind(as_i32(summary.skipped_unresolved_provider))
    .bind(as_i32(summary.skipped_missing_product_id))
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidIngestRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Marks a run as `failed`, sets `completed_at = NOW()` and `error_message`,
/// and records the counts reached before the failure.
///
/// # Errors
///
/// Returns [`DbError::InvalidIngestRunTransition`] if the run is not
/// `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn fail_ingest_run(
    pool: &PgPool,
    id: i64,
    error_message: &str,
    partial: &IngestSummary,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE ingest_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $2, \
             records_processed = $3, providers_inserted = $4, providers_updated = $5, \
             products_inserted = $6, products_updated = $7, \
             skipped_unresolved_provider = $8, skipped_missing_product_id = $9 \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(error_message)
    .bind(as_i32(partial.records))
    .bind(as_i32(partial.providers_inserted))
    .bind(as_i32(partial.providers_updated))
    .bind(as_i32(partial.products_inserted))
    .bind(as_i32(partial.products_updated))
    .bind(as_i32(partial.skipped_unresolved_provider))
    .bind(as_i32(partial.skipped_missing_product_id))
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidIngestRunTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetches a single run by its internal `id`.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_ingest_run(pool: &PgPool, id: i64) -> Result<IngestRunRow, DbError> {
    sqlx::query_as::<_, IngestRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM ingest_runs WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}

/// Returns the most recent `limit` runs, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_ingest_runs(pool: &PgPool, limit: i64) -> Result<Vec<IngestRunRow>, DbError> {
    let rows = sqlx::query_as::<_, IngestRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM ingest_runs ORDER BY created_at DESC, id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
