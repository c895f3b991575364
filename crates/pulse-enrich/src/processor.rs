//! The stage-processor capability and its registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use pulse_core::{AnalysisResult, LatencyClass, ScrapedRecord, Stage};

/// How a failed stage execution should be treated by the retry scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying after a back-off delay: network failures, timeouts,
    /// model cold starts, 5xx responses.
    Transient,
    /// Retrying won't fix it: malformed input, unsupported language, 4xx
    /// responses.
    Permanent,
}

/// Error from one stage execution. The classification is the only signal
/// the retry scheduler uses; processors carry no retry logic themselves.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("permanent: {0}")]
    Permanent(String),
}

impl StageError {
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            StageError::Transient(_) => ErrorClass::Transient,
            StageError::Permanent(_) => ErrorClass::Permanent,
        }
    }
}

/// One analysis capability: given a record, produce a typed result or fail.
///
/// Implementations are pure with respect to the ledger: they know nothing
/// about claims, retries, or batching.
#[async_trait]
pub trait StageProcessor: Send + Sync {
    /// The stage this processor implements.
    fn stage(&self) -> Stage;

    /// Expected latency of the backing capability; informs pool sizing.
    fn latency_class(&self) -> LatencyClass;

    async fn process(&self, record: &ScrapedRecord) -> Result<AnalysisResult, StageError>;
}

/// Lookup of stage processors keyed by stage. Adding a stage means adding
/// an implementation here, not branching on strings in the orchestrator.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<Stage, Arc<dyn StageProcessor>>,
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("stages", &self.stages())
            .finish()
    }
}

impl ProcessorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a processor under its declared stage, replacing any
    /// previous registration for that stage.
    pub fn register(&mut self, processor: Arc<dyn StageProcessor>) {
        self.processors.insert(processor.stage(), processor);
    }

    #[must_use]
    pub fn get(&self, stage: Stage) -> Option<Arc<dyn StageProcessor>> {
        self.processors.get(&stage).cloned()
    }

    /// Stages with a registered processor, in no particular order.
    #[must_use]
    pub fn stages(&self) -> Vec<Stage> {
        self.processors.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulse_core::SourcePlatform;

    struct NoopProcessor(Stage);

    #[async_trait]
    impl StageProcessor for NoopProcessor {
        fn stage(&self) -> Stage {
            self.0
        }

        fn latency_class(&self) -> LatencyClass {
            LatencyClass::Fast
        }

        async fn process(&self, _record: &ScrapedRecord) -> Result<AnalysisResult, StageError> {
            Err(StageError::Permanent("noop".to_string()))
        }
    }

    #[test]
    fn registry_resolves_by_declared_stage() {
        let mut registry = ProcessorRegistry::new();
        registry.register(Arc::new(NoopProcessor(Stage::Entity)));

        assert!(registry.get(Stage::Entity).is_some());
        assert!(registry.get(Stage::Sentiment).is_none());
        assert_eq!(registry.stages(), vec![Stage::Entity]);
    }

    #[tokio::test]
    async fn processor_error_carries_its_class() {
        let processor = NoopProcessor(Stage::Keyword);
        let record = ScrapedRecord::new(SourcePlatform::Reddit, "text", Utc::now());
        let err = processor.process(&record).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Permanent);
    }
}
