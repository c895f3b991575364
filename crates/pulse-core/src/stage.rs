//! Analysis stages and their latency classes.

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// One independent analysis operation applied to a record.
///
/// Adding a stage means adding a variant here plus a processor
/// implementation; the orchestrator never branches on stage names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Sentiment,
    Location,
    Entity,
    Keyword,
}

/// Expected latency of a stage's external capability. Slow stages get
/// smaller worker pools to bound load on the capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyClass {
    Fast,
    Slow,
}

impl Stage {
    /// All known stages in their default dispatch order.
    pub const ALL: [Stage; 4] = [
        Stage::Sentiment,
        Stage::Location,
        Stage::Entity,
        Stage::Keyword,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Sentiment => "sentiment",
            Stage::Location => "location",
            Stage::Entity => "entity",
            Stage::Keyword => "keyword",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sentiment" => Ok(Stage::Sentiment),
            "location" => Ok(Stage::Location),
            "entity" => Ok(Stage::Entity),
            "keyword" => Ok(Stage::Keyword),
            other => Err(CoreError::UnknownStage(other.to_string())),
        }
    }
}
