//! Enrichment pipeline core: stage processors, status ledger, retry
//! scheduling, result storage, and the batch supervisor that ties them
//! together.

pub mod error;
pub mod ledger;
pub mod processor;
pub mod processors;
pub mod retry;
pub mod store;
pub mod supervisor;

pub use error::EnrichError;
pub use ledger::MemoryLedger;
pub use processor::{ErrorClass, ProcessorRegistry, StageError, StageProcessor};
pub use processors::{
    InferenceClient, LexiconSentimentProcessor, RemoteEntityProcessor, RemoteKeywordProcessor,
    RemoteLocationProcessor,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use store::MemoryResultStore;
pub use supervisor::BatchSupervisor;
