//! Database operations for `scraped_records`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use pulse_core::{ScrapedRecord, SourcePlatform, Stage};

use crate::DbError;

/// A row from the `scraped_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScrapedRecordRow {
    pub id: Uuid,
    pub platform: String,
    pub content: String,
    pub posted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<ScrapedRecordRow> for ScrapedRecord {
    fn from(row: ScrapedRecordRow) -> Self {
        ScrapedRecord {
            id: row.id,
            platform: SourcePlatform::parse(&row.platform),
            text: row.content,
            posted_at: row.posted_at,
        }
    }
}

/// Persist one record delivered by the ingestion collaborator. Re-inserting
/// an existing id is a no-op.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_scraped_record(pool: &PgPool, record: &ScrapedRecord) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO scraped_records (id, platform, content, posted_at) \
         VALUES ($1, $2, $3, $4) \
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(record.id)
    .bind(record.platform.as_str())
    .bind(&record.text)
    .bind(record.posted_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetch a single record by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given id, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_scraped_record(pool: &PgPool, id: Uuid) -> Result<ScrapedRecord, DbError> {
    let row = sqlx::query_as::<_, ScrapedRecordRow>(
        "SELECT id, platform, content, posted_at, created_at \
         FROM scraped_records \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row.into())
}

/// Fetch the records with the given ids, in no guaranteed order. Missing
/// ids are silently absent from the result.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_records_by_ids(
    pool: &PgPool,
    ids: &[Uuid],
) -> Result<Vec<ScrapedRecord>, DbError> {
    let rows = sqlx::query_as::<_, ScrapedRecordRow>(
        "SELECT id, platform, content, posted_at, created_at \
         FROM scraped_records \
         WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

/// Load a cohort for enrichment: the oldest records whose given stage has
/// not reached a terminal ledger state.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_enrichment_cohort(
    pool: &PgPool,
    stage: Stage,
    limit: i64,
) -> Result<Vec<ScrapedRecord>, DbError> {
    let rows = sqlx::query_as::<_, ScrapedRecordRow>(
        "SELECT r.id, r.platform, r.content, r.posted_at, r.created_at \
         FROM scraped_records r \
         LEFT JOIN processing_status ps \
           ON ps.record_id = r.id AND ps.stage = $1 \
         WHERE ps.status IS NULL OR ps.status NOT IN ('completed', 'failed') \
         ORDER BY r.created_at ASC, r.id ASC \
         LIMIT $2",
    )
    .bind(stage.as_str())
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Into::into).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_converts_to_domain_record() {
        let row = ScrapedRecordRow {
            id: Uuid::new_v4(),
            platform: "reddit".to_string(),
            content: "service is down again".to_string(),
            posted_at: Utc::now(),
            created_at: Utc::now(),
        };
        let record: ScrapedRecord = row.clone().into();

        assert_eq!(record.id, row.id);
        assert_eq!(record.platform, SourcePlatform::Reddit);
        assert_eq!(record.text, "service is down again");
    }

    #[test]
    fn unknown_platform_column_maps_to_other() {
        let row = ScrapedRecordRow {
            id: Uuid::new_v4(),
            platform: "usenet".to_string(),
            content: String::new(),
            posted_at: Utc::now(),
            created_at: Utc::now(),
        };
        let record: ScrapedRecord = row.into();
        assert_eq!(record.platform, SourcePlatform::Other);
    }
}
