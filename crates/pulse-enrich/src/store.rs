//! In-memory result store.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use uuid::Uuid;

use pulse_core::{AnalysisResult, ResultStore, Stage, StoreError};

/// Results keyed by (record, stage). A stored result is immutable unless
/// the caller explicitly opts into reprocessing.
#[derive(Default)]
pub struct MemoryResultStore {
    results: RwLock<HashMap<(Uuid, Stage), AnalysisResult>>,
}

impl MemoryResultStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn save(
        &self,
        record_id: Uuid,
        stage: Stage,
        result: &AnalysisResult,
        reprocess: bool,
    ) -> Result<bool, StoreError> {
        let mut results = self.results.write().unwrap_or_else(PoisonError::into_inner);
        let key = (record_id, stage);
        if results.contains_key(&key) && !reprocess {
            return Ok(false);
        }
        results.insert(key, result.clone());
        Ok(true)
    }

    async fn get(
        &self,
        record_id: Uuid,
        stage: Stage,
    ) -> Result<Option<AnalysisResult>, StoreError> {
        Ok(self
            .results
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(record_id, stage))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyword(term: &str) -> AnalysisResult {
        AnalysisResult::Keyword {
            term: term.to_string(),
            score: 0.5,
            frequency: 1,
        }
    }

    #[tokio::test]
    async fn save_then_get_round_trips() {
        let store = MemoryResultStore::new();
        let id = Uuid::new_v4();

        assert!(store
            .save(id, Stage::Keyword, &keyword("outage"), false)
            .await
            .unwrap());
        assert_eq!(
            store.get(id, Stage::Keyword).await.unwrap(),
            Some(keyword("outage"))
        );
    }

    #[tokio::test]
    async fn overwrite_without_reprocess_is_rejected_and_stored_value_unchanged() {
        let store = MemoryResultStore::new();
        let id = Uuid::new_v4();

        store
            .save(id, Stage::Keyword, &keyword("first"), false)
            .await
            .unwrap();
        let saved = store
            .save(id, Stage::Keyword, &keyword("second"), false)
            .await
            .unwrap();

        assert!(!saved);
        assert_eq!(
            store.get(id, Stage::Keyword).await.unwrap(),
            Some(keyword("first"))
        );
    }

    #[tokio::test]
    async fn reprocess_flag_allows_overwrite() {
        let store = MemoryResultStore::new();
        let id = Uuid::new_v4();

        store
            .save(id, Stage::Keyword, &keyword("first"), false)
            .await
            .unwrap();
        assert!(store
            .save(id, Stage::Keyword, &keyword("second"), true)
            .await
            .unwrap());
        assert_eq!(
            store.get(id, Stage::Keyword).await.unwrap(),
            Some(keyword("second"))
        );
    }

    #[tokio::test]
    async fn absent_result_is_none() {
        let store = MemoryResultStore::new();
        assert_eq!(store.get(Uuid::new_v4(), Stage::Entity).await.unwrap(), None);
    }
}
