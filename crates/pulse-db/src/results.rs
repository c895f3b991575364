//! Database operations for `analysis_results`.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use pulse_core::{AnalysisResult, ResultStore, Stage, StoreError};

use crate::DbError;

/// Idempotent upsert keyed by (record, stage).
///
/// A completed result is immutable: the conflict branch only applies when
/// `reprocess` is set, so without it the statement affects zero rows and
/// the stored result stays untouched. Returns whether a write happened.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn save_result(
    pool: &PgPool,
    record_id: Uuid,
    stage: Stage,
    result: &AnalysisResult,
    reprocess: bool,
) -> Result<bool, DbError> {
    let payload = serde_json::to_value(result).map_err(|e| DbError::Decode(e.to_string()))?;

    let outcome = sqlx::query(
        "INSERT INTO analysis_results (record_id, stage, result) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (record_id, stage) DO UPDATE SET \
             result = EXCLUDED.result \
         WHERE $4",
    )
    .bind(record_id)
    .bind(stage.as_str())
    .bind(payload)
    .bind(reprocess)
    .execute(pool)
    .await?;

    Ok(outcome.rows_affected() == 1)
}

/// Fetch the stored result for one (record, stage), if any.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::Decode`] if
/// the stored payload does not match any known result variant.
pub async fn get_result(
    pool: &PgPool,
    record_id: Uuid,
    stage: Stage,
) -> Result<Option<AnalysisResult>, DbError> {
    let payload: Option<serde_json::Value> = sqlx::query_scalar(
        "SELECT result FROM analysis_results WHERE record_id = $1 AND stage = $2",
    )
    .bind(record_id)
    .bind(stage.as_str())
    .fetch_optional(pool)
    .await?;

    payload
        .map(|value| serde_json::from_value(value).map_err(|e| DbError::Decode(e.to_string())))
        .transpose()
}

/// Postgres-backed [`ResultStore`].
#[derive(Clone)]
pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn save(
        &self,
        record_id: Uuid,
        stage: Stage,
        result: &AnalysisResult,
        reprocess: bool,
    ) -> Result<bool, StoreError> {
        save_result(&self.pool, record_id, stage, result, reprocess)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    async fn get(
        &self,
        record_id: Uuid,
        stage: Stage,
    ) -> Result<Option<AnalysisResult>, StoreError> {
        get_result(&self.pool, record_id, stage)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}
