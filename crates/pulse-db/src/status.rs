//! Database operations for `processing_status`.
//!
//! Transitions are guarded conditional UPDATEs: the claim is an atomic
//! compare-and-set on the status column (`WHERE status = 'pending'`), so
//! concurrent claimants for the same (record, stage) pair resolve to
//! exactly one winner without any advisory locking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use pulse_core::{
    ClaimOutcome, ProcessingStatus, Stage, StageStatus, StatusLedger, StoreError,
};

use crate::DbError;

/// A row from the `processing_status` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProcessingStatusRow {
    pub record_id: Uuid,
    pub stage: String,
    pub status: String,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProcessingStatusRow> for ProcessingStatus {
    type Error = DbError;

    fn try_from(row: ProcessingStatusRow) -> Result<Self, Self::Error> {
        let stage: Stage = row
            .stage
            .parse()
            .map_err(|e| DbError::Decode(format!("{e}")))?;
        let status: StageStatus = row
            .status
            .parse()
            .map_err(|e| DbError::Decode(format!("{e}")))?;
        Ok(ProcessingStatus {
            record_id: row.record_id,
            stage,
            status,
            error_message: row.error_message,
            retry_count: u32::try_from(row.retry_count.max(0)).unwrap_or(0),
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// Atomically claim one (record, stage) pair for execution.
///
/// Seeds the `pending` row if the pair has never been seen, then attempts
/// the `pending → in_progress` compare-and-set. Exactly one concurrent
/// caller observes [`ClaimOutcome::Claimed`].
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if either statement fails.
pub async fn try_claim(
    pool: &PgPool,
    record_id: Uuid,
    stage: Stage,
) -> Result<ClaimOutcome, DbError> {
    sqlx::query(
        "INSERT INTO processing_status (record_id, stage, status) \
         VALUES ($1, $2, 'pending') \
         ON CONFLICT (record_id, stage) DO NOTHING",
    )
    .bind(record_id)
    .bind(stage.as_str())
    .execute(pool)
    .await?;

    let result = sqlx::query(
        "UPDATE processing_status \
         SET status = 'in_progress', started_at = NOW() \
         WHERE record_id = $1 AND stage = $2 AND status = 'pending'",
    )
    .bind(record_id)
    .bind(stage.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(ClaimOutcome::Claimed);
    }

    // Lost the CAS; report which state beat us.
    let status: Option<String> = sqlx::query_scalar(
        "SELECT status FROM processing_status WHERE record_id = $1 AND stage = $2",
    )
    .bind(record_id)
    .bind(stage.as_str())
    .fetch_optional(pool)
    .await?;

    match status.as_deref() {
        Some("completed") => Ok(ClaimOutcome::AlreadyCompleted),
        _ => Ok(ClaimOutcome::AlreadyInProgress),
    }
}

/// `in_progress → completed`; clears the error message and stamps
/// `completed_at`.
///
/// # Errors
///
/// Returns [`DbError::InvalidStatusTransition`] if the pair was not
/// `in_progress`, or [`DbError::Sqlx`] if the update fails.
pub async fn mark_completed(pool: &PgPool, record_id: Uuid, stage: Stage) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE processing_status \
         SET status = 'completed', error_message = NULL, completed_at = NOW() \
         WHERE record_id = $1 AND stage = $2 AND status = 'in_progress'",
    )
    .bind(record_id)
    .bind(stage.as_str())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidStatusTransition {
            record_id,
            stage,
            expected: "in_progress",
        });
    }

    Ok(())
}

/// `in_progress → failed`; records the error message and stamps
/// `completed_at`.
///
/// # Errors
///
/// Returns [`DbError::InvalidStatusTransition`] if the pair was not
/// `in_progress`, or [`DbError::Sqlx`] if the update fails.
pub async fn mark_failed(
    pool: &PgPool,
    record_id: Uuid,
    stage: Stage,
    error_message: &str,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE processing_status \
         SET status = 'failed', error_message = $3, completed_at = NOW() \
         WHERE record_id = $1 AND stage = $2 AND status = 'in_progress'",
    )
    .bind(record_id)
    .bind(stage.as_str())
    .bind(error_message)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidStatusTransition {
            record_id,
            stage,
            expected: "in_progress",
        });
    }

    Ok(())
}

/// `failed → pending`, incrementing the retry count. Returns `false` if
/// the pair was not in `failed`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn rearm(pool: &PgPool, record_id: Uuid, stage: Stage) -> Result<bool, DbError> {
    let result = sqlx::query(
        "UPDATE processing_status \
         SET status = 'pending', retry_count = retry_count + 1, completed_at = NULL \
         WHERE record_id = $1 AND stage = $2 AND status = 'failed'",
    )
    .bind(record_id)
    .bind(stage.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Snapshot of one (record, stage) pair. `None` for an unseen pair.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Decode`] if
/// a stored stage/status string is unknown.
pub async fn get_status(
    pool: &PgPool,
    record_id: Uuid,
    stage: Stage,
) -> Result<Option<ProcessingStatus>, DbError> {
    let row = sqlx::query_as::<_, ProcessingStatusRow>(
        "SELECT record_id, stage, status, error_message, retry_count, \
                started_at, completed_at \
         FROM processing_status \
         WHERE record_id = $1 AND stage = $2",
    )
    .bind(record_id)
    .bind(stage.as_str())
    .fetch_optional(pool)
    .await?;

    row.map(TryInto::try_into).transpose()
}

/// Postgres-backed [`StatusLedger`] used when the supervisor runs against
/// durable state.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusLedger for PgLedger {
    async fn try_claim(&self, record_id: Uuid, stage: Stage) -> Result<ClaimOutcome, StoreError> {
        try_claim(&self.pool, record_id, stage)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn mark_completed(&self, record_id: Uuid, stage: Stage) -> Result<(), StoreError> {
        match mark_completed(&self.pool, record_id, stage).await {
            Ok(()) => Ok(()),
            Err(DbError::InvalidStatusTransition {
                record_id,
                stage,
                expected,
            }) => Err(StoreError::InvalidTransition {
                record_id,
                stage,
                expected,
            }),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn mark_failed(
        &self,
        record_id: Uuid,
        stage: Stage,
        error: &str,
    ) -> Result<(), StoreError> {
        match mark_failed(&self.pool, record_id, stage, error).await {
            Ok(()) => Ok(()),
            Err(DbError::InvalidStatusTransition {
                record_id,
                stage,
                expected,
            }) => Err(StoreError::InvalidTransition {
                record_id,
                stage,
                expected,
            }),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    async fn rearm(&self, record_id: Uuid, stage: Stage) -> Result<bool, StoreError> {
        rearm(&self.pool, record_id, stage)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn status_of(
        &self,
        record_id: Uuid,
        stage: Stage,
    ) -> Result<Option<ProcessingStatus>, StoreError> {
        get_status(&self.pool, record_id, stage)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_decodes_to_domain_status() {
        let row = ProcessingStatusRow {
            record_id: Uuid::new_v4(),
            stage: "entity".to_string(),
            status: "failed".to_string(),
            error_message: Some("inference service returned 503".to_string()),
            retry_count: 2,
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
        };
        let status: ProcessingStatus = row.try_into().expect("row should decode");

        assert_eq!(status.stage, Stage::Entity);
        assert_eq!(status.status, StageStatus::Failed);
        assert_eq!(status.retry_count, 2);
    }

    #[test]
    fn unknown_status_string_fails_to_decode() {
        let row = ProcessingStatusRow {
            record_id: Uuid::new_v4(),
            stage: "entity".to_string(),
            status: "paused".to_string(),
            error_message: None,
            retry_count: 0,
            started_at: None,
            completed_at: None,
        };
        let result: Result<ProcessingStatus, _> = row.try_into();
        assert!(matches!(result, Err(DbError::Decode(_))));
    }
}
