//! Storage contracts shared by the in-memory and Postgres backends.
//!
//! The ledger is the single synchronization point of the pipeline: its
//! claim operation admits exactly one worker per (record, stage) pair.
//! Backends implement the claim as a compare-and-set on the status value,
//! never as a coarse lock over unrelated pairs.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::{AnalysisResult, ClaimOutcome, ProcessingStatus, Stage};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A transition was attempted from a state that does not permit it,
    /// e.g. `mark_completed` on a pair that is not `in_progress`.
    #[error("invalid status transition for record {record_id} stage {stage}: expected {expected}")]
    InvalidTransition {
        record_id: Uuid,
        stage: Stage,
        expected: &'static str,
    },
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Durable per-(record, stage) state machine. Single source of truth for
/// pipeline progress.
#[async_trait]
pub trait StatusLedger: Send + Sync {
    /// Atomically transition `pending → in_progress`, creating the pending
    /// row if the pair has never been seen. The sole admission path into
    /// stage execution: under any number of concurrent claimants exactly
    /// one observes [`ClaimOutcome::Claimed`].
    ///
    /// Re-claiming a completed pair is a no-op returning `AlreadyCompleted`.
    /// A failed pair awaiting re-arm reports `AlreadyInProgress`.
    async fn try_claim(&self, record_id: Uuid, stage: Stage) -> Result<ClaimOutcome, StoreError>;

    /// `in_progress → completed`; sets `completed_at`. Result payloads are
    /// the [`ResultStore`]'s responsibility, not the ledger's.
    async fn mark_completed(&self, record_id: Uuid, stage: Stage) -> Result<(), StoreError>;

    /// `in_progress → failed`; records the error message and sets
    /// `completed_at`. Does not touch the retry count; that belongs to
    /// [`StatusLedger::rearm`].
    async fn mark_failed(
        &self,
        record_id: Uuid,
        stage: Stage,
        error: &str,
    ) -> Result<(), StoreError>;

    /// `failed → pending`, incrementing `retry_count`. The only path back
    /// to `pending`; invoked by the retry scheduler, never by workers.
    /// Returns `false` if the pair was not in `failed`.
    async fn rearm(&self, record_id: Uuid, stage: Stage) -> Result<bool, StoreError>;

    /// Snapshot read; never blocks a writer. `None` for a pair the ledger
    /// has never seen.
    async fn status_of(
        &self,
        record_id: Uuid,
        stage: Stage,
    ) -> Result<Option<ProcessingStatus>, StoreError>;
}

/// Persisted typed results, keyed by (record, stage).
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Idempotent upsert. Returns `false`, leaving the stored result
    /// untouched, when a result already exists and `reprocess` is not set.
    async fn save(
        &self,
        record_id: Uuid,
        stage: Stage,
        result: &AnalysisResult,
        reprocess: bool,
    ) -> Result<bool, StoreError>;

    async fn get(
        &self,
        record_id: Uuid,
        stage: Stage,
    ) -> Result<Option<AnalysisResult>, StoreError>;
}
