//! Database operations for `import_runs`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `import_runs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ImportRunRow {
    pub id: i64,
    pub public_id: Uuid,
    pub trigger_source: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub items_processed: i32,
    pub items_inserted: i32,
    pub items_skipped: i32,
    pub items_failed: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Final counters written when a run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportRunCounts {
    pub processed: u64,
    pub inserted: u64,
    pub skipped: u64,
    pub failed: u64,
}

const RUN_COLUMNS: &str = "id, public_id, trigger_source, status, started_at, completed_at, \
     items_processed, items_inserted, items_skipped, items_failed, error_message, created_at";

/// Creates a new import run in `queued` status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_import_run(
    pool: &PgPool,
    trigger_source: &str,
) -> Result<ImportRunRow, DbError> {
    let row = sqlx::query_as::<_, ImportRunRow>(&format!(
        "INSERT INTO import_runs (public_id, trigger_source, status) \
         VALUES ($1, $2, 'queued') \
         RETURNING {RUN_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(trigger_source)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Marks a run as `running` and sets `started_at = NOW()`.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `queued`.
pub async fn start_import_run(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE import_runs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "queued",
        });
    }
    Ok(())
}

/// Marks a run as `succeeded` and records its counters.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `running`,
/// or [`DbError::CounterOverflow`] if a counter does not fit the column.
pub async fn complete_import_run(
    pool: &PgPool,
    id: i64,
    counts: ImportRunCounts,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE import_runs \
         SET status = 'succeeded', completed_at = NOW(), \
             items_processed = $1, items_inserted = $2, items_skipped = $3, items_failed = $4 \
         WHERE id = $5 AND status = 'running'",
    )
    .bind(to_i32("items_processed", counts.processed)?)
    .bind(to_i32("items_inserted", counts.inserted)?)
    .bind(to_i32("items_skipped", counts.skipped)?)
    .bind(to_i32("items_failed", counts.failed)?)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
            id,
            expected_status: "running",
        });
    }
    Ok(())
}

/// Marks a run as `failed` with an error message and the counters so far.
///
/// # Errors
///
/// Returns [`DbError::InvalidRunTransition`] if the run is not `running`.
pub async fn fail_import_run(
    pool: &PgPool,
    id: i64,
    error_message: &str,
    counts: ImportRunCounts,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE import_runs \
         SET status = 'failed', completed_at = NOW(), error_message = $1, \
             items_processed = $2, items_inserted = $3, items_skipped = $4, items_failed = $5 \
         WHERE id = $6 AND status = 'running'",
    )
    .bind(error_message)
    .bind(to_i32("items_processed", counts.processed)?)
    .bind(to_i32("items_inserted", counts.inserted)?)
    .bind(to_i32("items_skipped", counts.skipped)?)
    .bind(to_i32("items_failed", counts.failed)?)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidRunTransition {
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
/// Returns [`DbError::NotFound`] if no row exists with the given `id`.
pub async fn get_import_run(pool: &PgPool, id: i64) -> Result<ImportRunRow, DbError> {
    sqlx::query_as::<_, ImportRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM import_runs WHERE id = $1"
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
pub async fn list_import_runs(pool: &PgPool, limit: i64) -> Result<Vec<ImportRunRow>, DbError> {
    let rows = sqlx::query_as::<_, ImportRunRow>(&format!(
        "SELECT {RUN_COLUMNS} FROM import_runs ORDER BY created_at DESC, id DESC LIMIT $1"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

fn to_i32(field: &'static str, value: u64) -> Result<i32, DbError> {
    i32::try_from(value).map_err(|_| DbError::CounterOverflow { field, value })
}
