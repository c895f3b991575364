//! Scraped-record input types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Platform a record was scraped from.
///
/// Unrecognized platform strings parse to [`SourcePlatform::Other`] so
/// ingestion of a new platform never fails the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourcePlatform {
    Twitter,
    Reddit,
    Facebook,
    Instagram,
    News,
    Other,
}

impl SourcePlatform {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SourcePlatform::Twitter => "twitter",
            SourcePlatform::Reddit => "reddit",
            SourcePlatform::Facebook => "facebook",
            SourcePlatform::Instagram => "instagram",
            SourcePlatform::News => "news",
            SourcePlatform::Other => "other",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "twitter" => SourcePlatform::Twitter,
            "reddit" => SourcePlatform::Reddit,
            "facebook" => SourcePlatform::Facebook,
            "instagram" => SourcePlatform::Instagram,
            "news" => SourcePlatform::News,
            _ => SourcePlatform::Other,
        }
    }
}

impl std::fmt::Display for SourcePlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One ingested social-media record. Immutable input to the pipeline:
/// created by the ingestion collaborator, read-only to the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedRecord {
    pub id: Uuid,
    pub platform: SourcePlatform,
    pub text: String,
    pub posted_at: DateTime<Utc>,
}

impl ScrapedRecord {
    /// Convenience constructor used by ingestion and tests.
    #[must_use]
    pub fn new(platform: SourcePlatform, text: impl Into<String>, posted_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            platform,
            text: text.into(),
            posted_at,
        }
    }
}
