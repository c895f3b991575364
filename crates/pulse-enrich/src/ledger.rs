//! In-memory status ledger.
//!
//! Claims are a compare-and-set on a per-entry atomic status byte, so
//! unrelated (record, stage) pairs never contend: the map lock is only
//! taken to look up or insert entries, never across a state transition.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use pulse_core::{ClaimOutcome, ProcessingStatus, Stage, StageStatus, StatusLedger, StoreError};

const PENDING: u8 = 0;
const IN_PROGRESS: u8 = 1;
const COMPLETED: u8 = 2;
const FAILED: u8 = 3;

fn decode(status: u8) -> StageStatus {
    match status {
        IN_PROGRESS => StageStatus::InProgress,
        COMPLETED => StageStatus::Completed,
        FAILED => StageStatus::Failed,
        _ => StageStatus::Pending,
    }
}

#[derive(Default)]
struct EntryDetail {
    error_message: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

struct StatusEntry {
    status: AtomicU8,
    retry_count: AtomicU32,
    detail: Mutex<EntryDetail>,
}

impl StatusEntry {
    fn new() -> Self {
        Self {
            status: AtomicU8::new(PENDING),
            retry_count: AtomicU32::new(0),
            detail: Mutex::new(EntryDetail::default()),
        }
    }

    fn detail(&self) -> std::sync::MutexGuard<'_, EntryDetail> {
        self.detail.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Default)]
pub struct MemoryLedger {
    entries: RwLock<HashMap<(Uuid, Stage), Arc<StatusEntry>>>,
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, record_id: Uuid, stage: Stage) -> Arc<StatusEntry> {
        let key = (record_id, stage);
        if let Some(entry) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(entry);
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(entries.entry(key).or_insert_with(|| Arc::new(StatusEntry::new())))
    }

    fn existing(&self, record_id: Uuid, stage: Stage) -> Option<Arc<StatusEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(record_id, stage))
            .map(Arc::clone)
    }
}

#[async_trait]
impl StatusLedger for MemoryLedger {
    async fn try_claim(&self, record_id: Uuid, stage: Stage) -> Result<ClaimOutcome, StoreError> {
        let entry = self.entry(record_id, stage);
        match entry
            .status
            .compare_exchange(PENDING, IN_PROGRESS, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                entry.detail().started_at = Some(Utc::now());
                Ok(ClaimOutcome::Claimed)
            }
            Err(COMPLETED) => Ok(ClaimOutcome::AlreadyCompleted),
            Err(_) => Ok(ClaimOutcome::AlreadyInProgress),
        }
    }

    async fn mark_completed(&self, record_id: Uuid, stage: Stage) -> Result<(), StoreError> {
        let entry = self.entry(record_id, stage);
        entry
            .status
            .compare_exchange(IN_PROGRESS, COMPLETED, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| StoreError::InvalidTransition {
                record_id,
                stage,
                expected: "in_progress",
            })?;
        let mut detail = entry.detail();
        detail.error_message = None;
        detail.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_failed(
        &self,
        record_id: Uuid,
        stage: Stage,
        error: &str,
    ) -> Result<(), StoreError> {
        let entry = self.entry(record_id, stage);
        entry
            .status
            .compare_exchange(IN_PROGRESS, FAILED, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| StoreError::InvalidTransition {
                record_id,
                stage,
                expected: "in_progress",
            })?;
        let mut detail = entry.detail();
        detail.error_message = Some(error.to_string());
        detail.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn rearm(&self, record_id: Uuid, stage: Stage) -> Result<bool, StoreError> {
        let Some(entry) = self.existing(record_id, stage) else {
            return Ok(false);
        };
        let rearmed = entry
            .status
            .compare_exchange(FAILED, PENDING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if rearmed {
            entry.retry_count.fetch_add(1, Ordering::AcqRel);
            entry.detail().completed_at = None;
        }
        Ok(rearmed)
    }

    async fn status_of(
        &self,
        record_id: Uuid,
        stage: Stage,
    ) -> Result<Option<ProcessingStatus>, StoreError> {
        let Some(entry) = self.existing(record_id, stage) else {
            return Ok(None);
        };
        let status = decode(entry.status.load(Ordering::Acquire));
        let retry_count = entry.retry_count.load(Ordering::Acquire);
        let detail = entry.detail();
        Ok(Some(ProcessingStatus {
            record_id,
            stage,
            status,
            error_message: detail.error_message.clone(),
            retry_count,
            started_at: detail.started_at,
            completed_at: detail.completed_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn claim_then_complete_is_terminal_and_idempotent() {
        let ledger = MemoryLedger::new();
        let id = Uuid::new_v4();

        assert_eq!(
            ledger.try_claim(id, Stage::Sentiment).await.unwrap(),
            ClaimOutcome::Claimed
        );
        ledger.mark_completed(id, Stage::Sentiment).await.unwrap();

        // Re-claiming a completed pair is a no-op.
        assert_eq!(
            ledger.try_claim(id, Stage::Sentiment).await.unwrap(),
            ClaimOutcome::AlreadyCompleted
        );
        let status = ledger
            .status_of(id, Stage::Sentiment)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(status.status, StageStatus::Completed);
        assert!(status.completed_at.is_some());
        assert_eq!(status.retry_count, 0);
    }

    #[tokio::test]
    async fn failed_pair_is_not_claimable_until_rearmed() {
        let ledger = MemoryLedger::new();
        let id = Uuid::new_v4();

        ledger.try_claim(id, Stage::Entity).await.unwrap();
        ledger.mark_failed(id, Stage::Entity, "boom").await.unwrap();

        assert_eq!(
            ledger.try_claim(id, Stage::Entity).await.unwrap(),
            ClaimOutcome::AlreadyInProgress
        );

        assert!(ledger.rearm(id, Stage::Entity).await.unwrap());
        assert_eq!(
            ledger.try_claim(id, Stage::Entity).await.unwrap(),
            ClaimOutcome::Claimed
        );
        let status = ledger.status_of(id, Stage::Entity).await.unwrap().unwrap();
        assert_eq!(status.retry_count, 1);
    }

    #[tokio::test]
    async fn rearm_requires_failed_state() {
        let ledger = MemoryLedger::new();
        let id = Uuid::new_v4();

        assert!(!ledger.rearm(id, Stage::Keyword).await.unwrap());
        ledger.try_claim(id, Stage::Keyword).await.unwrap();
        assert!(!ledger.rearm(id, Stage::Keyword).await.unwrap());
    }

    #[tokio::test]
    async fn complete_without_claim_is_an_invalid_transition() {
        let ledger = MemoryLedger::new();
        let err = ledger
            .mark_completed(Uuid::new_v4(), Stage::Location)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn racing_claimants_exactly_one_wins() {
        use std::sync::atomic::AtomicU32;

        let ledger = Arc::new(MemoryLedger::new());
        let id = Uuid::new_v4();
        let wins = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = Arc::clone(&ledger);
            let wins = Arc::clone(&wins);
            handles.push(tokio::spawn(async move {
                if ledger.try_claim(id, Stage::Sentiment).await.unwrap() == ClaimOutcome::Claimed {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1, "exactly one claim must win");
    }

    #[tokio::test]
    async fn unrelated_pairs_do_not_interfere() {
        let ledger = MemoryLedger::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert_eq!(
            ledger.try_claim(a, Stage::Sentiment).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert_eq!(
            ledger.try_claim(b, Stage::Sentiment).await.unwrap(),
            ClaimOutcome::Claimed
        );
        assert_eq!(
            ledger.try_claim(a, Stage::Keyword).await.unwrap(),
            ClaimOutcome::Claimed
        );
    }
}
