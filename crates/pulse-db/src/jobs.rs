//! Database operations for `batch_jobs`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use pulse_core::{JobConfig, JobError, JobStatus};

use crate::DbError;

/// A row from the `batch_jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BatchJobRow {
    pub id: Uuid,
    pub job_type: String,
    pub status: String,
    pub total_records: i32,
    pub processed_records: i32,
    pub failed_records: i32,
    pub error_log: serde_json::Value,
    pub config: serde_json::Value,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl BatchJobRow {
    /// Decode the jsonb error log into typed entries.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Decode`] if the stored log does not match the
    /// [`JobError`] shape.
    pub fn errors(&self) -> Result<Vec<JobError>, DbError> {
        serde_json::from_value(self.error_log.clone()).map_err(|e| DbError::Decode(e.to_string()))
    }
}

/// Create a new batch job in `pending` status with its config snapshot.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_batch_job(
    pool: &PgPool,
    id: Uuid,
    job_type: &str,
    total_records: i32,
    config: &JobConfig,
) -> Result<BatchJobRow, DbError> {
    let config_snapshot =
        serde_json::to_value(config).map_err(|e| DbError::Decode(e.to_string()))?;

    let row = sqlx::query_as::<_, BatchJobRow>(
        "INSERT INTO batch_jobs (id, job_type, status, total_records, config) \
         VALUES ($1, $2, 'pending', $3, $4) \
         RETURNING id, job_type, status, total_records, processed_records, \
                   failed_records, error_log, config, started_at, completed_at, created_at",
    )
    .bind(id)
    .bind(job_type)
    .bind(total_records)
    .bind(config_snapshot)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// `pending → running`, stamping `started_at`.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job was not `pending`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn start_batch_job(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE batch_jobs \
         SET status = 'running', started_at = NOW() \
         WHERE id = $1 AND status = 'pending'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "pending",
        });
    }

    Ok(())
}

/// `running → terminal`, writing the final counters and error log. Once a
/// job reaches a terminal status its row is never mutated again.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if `status` is not terminal or
/// the job was not `running`, or [`DbError::Sqlx`] if the update fails.
pub async fn finish_batch_job(
    pool: &PgPool,
    id: Uuid,
    status: JobStatus,
    processed_records: i32,
    failed_records: i32,
    errors: &[JobError],
) -> Result<(), DbError> {
    if !status.is_terminal() {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "terminal",
        });
    }
    let error_log = serde_json::to_value(errors).map_err(|e| DbError::Decode(e.to_string()))?;

    let result = sqlx::query(
        "UPDATE batch_jobs \
         SET status = $2, processed_records = $3, failed_records = $4, \
             error_log = $5, completed_at = NOW() \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .bind(status.as_str())
    .bind(processed_records)
    .bind(failed_records)
    .bind(error_log)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Fetch a single job by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given id, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_batch_job(pool: &PgPool, id: Uuid) -> Result<BatchJobRow, DbError> {
    let row = sqlx::query_as::<_, BatchJobRow>(
        "SELECT id, job_type, status, total_records, processed_records, \
                failed_records, error_log, config, started_at, completed_at, created_at \
         FROM batch_jobs \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}

/// Returns the most recent `limit` jobs, ordered by `created_at DESC`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_batch_jobs(pool: &PgPool, limit: i64) -> Result<Vec<BatchJobRow>, DbError> {
    let rows = sqlx::query_as::<_, BatchJobRow>(
        "SELECT id, job_type, status, total_records, processed_records, \
                failed_records, error_log, config, started_at, completed_at, created_at \
         FROM batch_jobs \
         ORDER BY created_at DESC, id DESC \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
