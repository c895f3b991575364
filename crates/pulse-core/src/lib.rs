//! Shared domain types and storage contracts for the pulse enrichment
//! pipeline.

use thiserror::Error;

pub mod app_config;
pub mod config;
pub mod job;
pub mod record;
pub mod result;
pub mod stage;
pub mod status;
pub mod store;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use job::{JobConfig, JobError, JobSnapshot, JobStatus};
pub use record::{ScrapedRecord, SourcePlatform};
pub use result::AnalysisResult;
pub use stage::{LatencyClass, Stage};
pub use status::{ClaimOutcome, ProcessingStatus, StageStatus};
pub use store::{ResultStore, StatusLedger, StoreError};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown stage: {0}")]
    UnknownStage(String),
    #[error("unknown status: {0}")]
    UnknownStatus(String),
    #[error("invalid job config: {0}")]
    InvalidJobConfig(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
