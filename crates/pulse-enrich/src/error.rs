use thiserror::Error;
use uuid::Uuid;

use pulse_core::{Stage, StoreError};

#[derive(Debug, Error)]
pub enum EnrichError {
    /// The job could not start; no record was touched.
    #[error("invalid job: {0}")]
    JobConfig(String),

    /// A requested stage has no registered processor.
    #[error("no processor registered for stage: {0}")]
    UnknownStage(Stage),

    #[error("no such job: {0}")]
    JobNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}
