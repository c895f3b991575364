//! Remote inference adapters.
//!
//! Each adapter wraps one endpoint of an external analysis service with the
//! fixed stage-processor contract: record text in, typed result or a
//! classified error out. No retry or back-off lives here; that is the
//! supervisor's job.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use pulse_core::{AnalysisResult, LatencyClass, ScrapedRecord, Stage};

use crate::processor::{StageError, StageProcessor};

/// HTTP client for the inference service shared by the remote processors.
pub struct InferenceClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
    platform: &'a str,
}

#[derive(Deserialize)]
struct LocationResponse {
    text: String,
    location_type: String,
    confidence: f32,
    resolved_place: Option<String>,
}

#[derive(Deserialize)]
struct EntityResponse {
    text: String,
    entity_type: String,
    confidence: f32,
    span_start: usize,
    span_end: usize,
}

#[derive(Deserialize)]
struct KeywordResponse {
    term: String,
    score: f32,
    frequency: u32,
}

impl InferenceClient {
    /// Create a client for the service at `base_url` with a per-request
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`reqwest::Error`] if the underlying client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// POST a record to one analysis endpoint and decode the typed response.
    ///
    /// Classification: connect failures, timeouts, and 5xx responses are
    /// transient; 4xx responses (malformed input, unsupported language) and
    /// undecodable bodies are permanent.
    async fn analyze<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        record: &ScrapedRecord,
    ) -> Result<T, StageError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let request = AnalyzeRequest {
            text: &record.text,
            platform: record.platform.as_str(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    StageError::Transient(format!("inference request failed: {e}"))
                } else {
                    StageError::Permanent(format!("inference request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status.is_server_error() {
            return Err(StageError::Transient(format!(
                "inference service returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(StageError::Permanent(format!(
                "inference service rejected input with {status}"
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| StageError::Permanent(format!("inference response parse error: {e}")))
    }
}

pub struct RemoteLocationProcessor {
    client: Arc<InferenceClient>,
}

impl RemoteLocationProcessor {
    #[must_use]
    pub fn new(client: Arc<InferenceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StageProcessor for RemoteLocationProcessor {
    fn stage(&self) -> Stage {
        Stage::Location
    }

    fn latency_class(&self) -> LatencyClass {
        // Geocoding resolution is the slowest capability we call.
        LatencyClass::Slow
    }

    async fn process(&self, record: &ScrapedRecord) -> Result<AnalysisResult, StageError> {
        let response: LocationResponse = self.client.analyze("v1/location", record).await?;
        Ok(AnalysisResult::Location {
            text: response.text,
            location_type: response.location_type,
            confidence: response.confidence,
            resolved_place: response.resolved_place,
        })
    }
}

pub struct RemoteEntityProcessor {
    client: Arc<InferenceClient>,
}

impl RemoteEntityProcessor {
    #[must_use]
    pub fn new(client: Arc<InferenceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StageProcessor for RemoteEntityProcessor {
    fn stage(&self) -> Stage {
        Stage::Entity
    }

    fn latency_class(&self) -> LatencyClass {
        LatencyClass::Slow
    }

    async fn process(&self, record: &ScrapedRecord) -> Result<AnalysisResult, StageError> {
        let response: EntityResponse = self.client.analyze("v1/entity", record).await?;
        Ok(AnalysisResult::Entity {
            text: response.text,
            entity_type: response.entity_type,
            confidence: response.confidence,
            span: (response.span_start, response.span_end),
        })
    }
}

pub struct RemoteKeywordProcessor {
    client: Arc<InferenceClient>,
}

impl RemoteKeywordProcessor {
    #[must_use]
    pub fn new(client: Arc<InferenceClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StageProcessor for RemoteKeywordProcessor {
    fn stage(&self) -> Stage {
        Stage::Keyword
    }

    fn latency_class(&self) -> LatencyClass {
        LatencyClass::Fast
    }

    async fn process(&self, record: &ScrapedRecord) -> Result<AnalysisResult, StageError> {
        let response: KeywordResponse = self.client.analyze("v1/keyword", record).await?;
        Ok(AnalysisResult::Keyword {
            term: response.term,
            score: response.score,
            frequency: response.frequency,
        })
    }
}
