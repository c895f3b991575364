//! Integration tests for the remote inference adapters using wiremock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use pulse_core::{AnalysisResult, ScrapedRecord, SourcePlatform};
use pulse_enrich::{
    InferenceClient, RemoteEntityProcessor, RemoteKeywordProcessor, RemoteLocationProcessor,
    StageError, StageProcessor,
};

fn test_client(base_url: &str) -> Arc<InferenceClient> {
    Arc::new(
        InferenceClient::new(base_url, Duration::from_secs(5))
            .expect("client construction should not fail"),
    )
}

fn record(text: &str) -> ScrapedRecord {
    ScrapedRecord::new(SourcePlatform::Reddit, text, Utc::now())
}

#[tokio::test]
async fn location_endpoint_returns_typed_result() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "text": "Portland",
        "location_type": "city",
        "confidence": 0.92,
        "resolved_place": "Portland, Oregon, US"
    });

    Mock::given(method("POST"))
        .and(path("/v1/location"))
        .and(body_partial_json(serde_json::json!({
            "text": "meetup in Portland tonight",
            "platform": "reddit"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let processor = RemoteLocationProcessor::new(test_client(&server.uri()));
    let result = processor
        .process(&record("meetup in Portland tonight"))
        .await
        .expect("should parse location");

    match result {
        AnalysisResult::Location {
            text,
            location_type,
            confidence,
            resolved_place,
        } => {
            assert_eq!(text, "Portland");
            assert_eq!(location_type, "city");
            assert!((confidence - 0.92).abs() < f32::EPSILON);
            assert_eq!(resolved_place.as_deref(), Some("Portland, Oregon, US"));
        }
        other => panic!("expected location result, got {other:?}"),
    }
}

#[tokio::test]
async fn entity_endpoint_returns_typed_result() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "text": "Acme",
        "entity_type": "org",
        "confidence": 0.88,
        "span_start": 0,
        "span_end": 4
    });

    Mock::given(method("POST"))
        .and(path("/v1/entity"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let processor = RemoteEntityProcessor::new(test_client(&server.uri()));
    let result = processor
        .process(&record("Acme shipped a new widget"))
        .await
        .expect("should parse entity");

    match result {
        AnalysisResult::Entity {
            text,
            entity_type,
            span,
            ..
        } => {
            assert_eq!(text, "Acme");
            assert_eq!(entity_type, "org");
            assert_eq!(span, (0, 4));
        }
        other => panic!("expected entity result, got {other:?}"),
    }
}

#[tokio::test]
async fn keyword_endpoint_returns_typed_result() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "term": "outage",
        "score": 0.81,
        "frequency": 4
    });

    Mock::given(method("POST"))
        .and(path("/v1/keyword"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let processor = RemoteKeywordProcessor::new(test_client(&server.uri()));
    let result = processor
        .process(&record("outage again, outage outage outage"))
        .await
        .expect("should parse keyword");

    match result {
        AnalysisResult::Keyword {
            term, frequency, ..
        } => {
            assert_eq!(term, "outage");
            assert_eq!(frequency, 4);
        }
        other => panic!("expected keyword result, got {other:?}"),
    }
}

#[tokio::test]
async fn server_errors_are_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/entity"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let processor = RemoteEntityProcessor::new(test_client(&server.uri()));
    let err = processor.process(&record("text")).await.unwrap_err();

    assert!(matches!(err, StageError::Transient(_)), "got {err:?}");
}

#[tokio::test]
async fn client_errors_are_permanent() {
    let server = MockServer::start().await;

    // Unsupported language / malformed input style rejection.
    Mock::given(method("POST"))
        .and(path("/v1/keyword"))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;

    let processor = RemoteKeywordProcessor::new(test_client(&server.uri()));
    let err = processor.process(&record("text")).await.unwrap_err();

    assert!(matches!(err, StageError::Permanent(_)), "got {err:?}");
}

#[tokio::test]
async fn undecodable_body_is_permanent() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/location"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let processor = RemoteLocationProcessor::new(test_client(&server.uri()));
    let err = processor.process(&record("text")).await.unwrap_err();

    assert!(matches!(err, StageError::Permanent(_)), "got {err:?}");
}

#[tokio::test]
async fn connection_failure_is_transient() {
    // Nothing listens on this port.
    let client = Arc::new(
        InferenceClient::new("http://127.0.0.1:1", Duration::from_secs(1))
            .expect("client construction should not fail"),
    );
    let processor = RemoteLocationProcessor::new(client);
    let err = processor.process(&record("text")).await.unwrap_err();

    assert!(matches!(err, StageError::Transient(_)), "got {err:?}");
}
