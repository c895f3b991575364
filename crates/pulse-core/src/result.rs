//! Typed per-stage analysis results.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::Stage;

/// Result of one successful stage execution for one record.
///
/// A tagged union rather than a generic JSON blob: each variant's shape is
/// statically checkable, and the serde tag doubles as the stage column when
/// the result is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum AnalysisResult {
    Sentiment {
        /// Winning label: `positive`, `negative`, or `neutral`.
        label: String,
        /// Confidence of the winning label in `[0.0, 1.0]`.
        confidence: f32,
        /// Per-class scores keyed by label.
        scores: BTreeMap<String, f32>,
    },
    Location {
        /// The location mention as it appears in the text.
        text: String,
        /// `city`, `region`, `country`, or `poi`.
        location_type: String,
        confidence: f32,
        /// Canonical place name if the geocoder resolved one.
        resolved_place: Option<String>,
    },
    Entity {
        text: String,
        /// `person`, `org`, `product`, etc.
        entity_type: String,
        confidence: f32,
        /// Byte offsets of the mention within the record text.
        span: (usize, usize),
    },
    Keyword {
        term: String,
        /// Relevance score in `[0.0, 1.0]`.
        score: f32,
        /// Occurrences of the term in the record text.
        frequency: u32,
    },
}

impl AnalysisResult {
    /// The stage that produced this result.
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            AnalysisResult::Sentiment { .. } => Stage::Sentiment,
            AnalysisResult::Location { .. } => Stage::Location,
            AnalysisResult::Entity { .. } => Stage::Entity,
            AnalysisResult::Keyword { .. } => Stage::Keyword,
        }
    }
}
