//! Per-(record, stage) processing state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, Stage};

/// State of one (record, stage) pair.
///
/// Legal transitions: `pending → in_progress → {completed | failed}`, plus
/// `failed → pending` through an explicit retry re-arm. `Completed` and a
/// failed stage whose retry budget is exhausted are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StageStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::InProgress => "in_progress",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        }
    }

    /// `true` once no automatic transition can occur without a re-arm.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StageStatus::Pending),
            "in_progress" => Ok(StageStatus::InProgress),
            "completed" => Ok(StageStatus::Completed),
            "failed" => Ok(StageStatus::Failed),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// Outcome of a claim attempt on one (record, stage) pair.
///
/// Exactly one concurrent claimant observes [`ClaimOutcome::Claimed`]; the
/// rest see which terminal/busy state beat them to it. `AlreadyInProgress`
/// doubles as the answer for a failed stage awaiting re-arm: the pair is
/// not claimable until the retry scheduler re-arms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyCompleted,
    AlreadyInProgress,
}

/// Snapshot of one (record, stage) ledger row. Reads never block writers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStatus {
    pub record_id: Uuid,
    pub stage: Stage,
    pub status: StageStatus,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
