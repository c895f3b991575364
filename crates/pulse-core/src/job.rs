//! Batch-job types: configuration, error log entries, and snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, Stage};

/// Lifecycle status of a batch job.
///
/// `Completed`, `CompletedWithErrors`, and `Failed` are terminal; a job
/// never leaves a terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithErrors => "completed_with_errors",
            JobStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::CompletedWithErrors | JobStatus::Failed
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "completed_with_errors" => Ok(JobStatus::CompletedWithErrors),
            "failed" => Ok(JobStatus::Failed),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// One entry in a job's append-only error log: a (record, stage) pair that
/// failed terminally, with the last error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub record_id: Uuid,
    pub stage: Stage,
    pub message: String,
}

/// Configuration snapshot for one batch job. Frozen at submit time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Stages to run, in dispatch order.
    pub stages: Vec<Stage>,
    /// Maximum re-arms per (record, stage) before the stage fails terminally.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retry passes.
    pub backoff_base_ms: u64,
    /// Cap on any single backoff delay.
    pub max_backoff_ms: u64,
    /// Per-call timeout for one stage execution; a timeout counts as a
    /// transient error.
    pub stage_timeout_secs: u64,
    /// Worker-pool width for fast stages.
    pub fast_workers: usize,
    /// Worker-pool width for slow stages (bounds external-capability load).
    pub slow_workers: usize,
    /// When `true`, a stage runs for a record only if the previous stage in
    /// `stages` completed for that record. Default is independent stages.
    pub chained: bool,
    /// When `true`, completed results may be overwritten (deliberate
    /// re-analysis); otherwise completed results are immutable.
    pub reprocess: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            stages: Stage::ALL.to_vec(),
            max_retries: 5,
            backoff_base_ms: 1_000,
            max_backoff_ms: 60_000,
            stage_timeout_secs: 30,
            fast_workers: 8,
            slow_workers: 2,
            chained: false,
            reprocess: false,
        }
    }
}

impl JobConfig {
    /// Validate the configuration before any record is touched.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidJobConfig`] if the stage list is empty or
    /// contains duplicates, or if either worker pool has zero width.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.stages.is_empty() {
            return Err(CoreError::InvalidJobConfig(
                "stage list is empty".to_string(),
            ));
        }
        let mut seen = self.stages.clone();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != self.stages.len() {
            return Err(CoreError::InvalidJobConfig(
                "duplicate stage in stage list".to_string(),
            ));
        }
        if self.fast_workers == 0 || self.slow_workers == 0 {
            return Err(CoreError::InvalidJobConfig(
                "worker pool width must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Consistent point-in-time view of a batch job. Safe to read mid-run; the
/// counters obey `processed + failed <= total` at every observed instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub job_type: String,
    pub status: JobStatus,
    pub total_records: u32,
    pub processed_records: u32,
    pub failed_records: u32,
    pub errors: Vec<JobError>,
    pub config: JobConfig,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
