//! Integration tests for retry behavior and failure classification.
//!
//! Verifies that transient failures are retried with backoff, terminal
//! failures stop immediately, and exhaustion is reported as its own category.

mod common;

use std::time::Duration;

use common::*;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clubify_webhooks::{DeliveryStatus, FailureCategory, WebhookEndpoint};

/// Test: Transient 500s are retried until the endpoint recovers.
#[tokio::test]
async fn test_recovers_after_transient_failures() {
    let mock_server = MockServer::start().await;
    let receiver = MockEndpoint::fail_then_ok(2);

    Mock::given(method("POST"))
        .and(path("/webhook"))
        .respond_with(receiver.clone())
        .mount(&mock_server)
        .await;

    let engine = test_engine(5);
    let endpoint = WebhookEndpoint::new(TENANT_A, format!("{}/webhook", mock_server.uri()))
        .with_secret(SECRET_1);

    let attempt = engine.deliver(&endpoint, &order_paid_event(TENANT_A)).await;

    assert!(attempt.is_success());
    assert_eq!(attempt.attempt_number, 3);
    assert_eq!(receiver.hits(), 3);
}

/// Test: 4xx client errors are terminal and never retried.
#[tokio::test]
async fn test_client_error_not_retried() {
    let mock_server = MockServer::start().await;
    let receiver = MockEndpoint::status(400);

    Mock::given(method("POST"))
        .respond_with(receiver.clone())
        .mount(&mock_server)
        .await;

    let engine = test_engine(5);
    let endpoint = WebhookEndpoint::new(TENANT_A, format!("{}/webhook", mock_server.uri()))
        .with_secret(SECRET_1);

    let attempt = engine.deliver(&endpoint, &order_paid_event(TENANT_A)).await;

    assert_eq!(attempt.status, DeliveryStatus::Failure);
    assert_eq!(attempt.category, Some(FailureCategory::ClientError));
    assert!(!attempt.retryable);
    assert_eq!(
        attempt.error.as_deref(),
        Some("HTTP 400 response from endpoint")
    );
    assert_eq!(receiver.hits(), 1);
}

/// Test: 413 is terminal; a too-large payload will never fit on retry.
#[tokio::test]
async fn test_payload_too_large_terminal() {
    let mock_server = MockServer::start().await;
    let receiver = MockEndpoint::status(413);

    Mock::given(method("POST"))
        .respond_with(receiver.clone())
        .mount(&mock_server)
        .await;

    let engine = test_engine(5);
    let endpoint = WebhookEndpoint::new(TENANT_A, format!("{}/webhook", mock_server.uri()))
        .with_secret(SECRET_1);

    let attempt = engine.deliver(&endpoint, &order_paid_event(TENANT_A)).await;

    assert_eq!(attempt.category, Some(FailureCategory::PayloadTooLarge));
    assert!(!attempt.retryable);
    assert_eq!(receiver.hits(), 1);
}

/// Test: A persistently failing endpoint exhausts the attempt budget.
#[tokio::test]
async fn test_exhaustion_reported_as_max_retries() {
    let mock_server = MockServer::start().await;
    let receiver = MockEndpoint::status(500);

    Mock::given(method("POST"))
        .respond_with(receiver.clone())
        .mount(&mock_server)
        .await;

    let engine = test_engine(3);
    let endpoint = WebhookEndpoint::new(TENANT_A, format!("{}/webhook", mock_server.uri()))
        .with_secret(SECRET_1);

    let attempt = engine.deliver(&endpoint, &order_paid_event(TENANT_A)).await;

    assert_eq!(attempt.status, DeliveryStatus::Failure);
    assert_eq!(attempt.attempt_number, 3);
    assert_eq!(attempt.category, Some(FailureCategory::MaxRetriesReached));
    assert!(!attempt.retryable);
    assert_eq!(receiver.hits(), 3);
}

/// Test: Intermediate attempts keep their own category; only the final one
/// is re-tagged as exhaustion.
#[tokio::test]
async fn test_intermediate_attempts_keep_category() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let sink = RecordingSink::new();
    let engine = test_engine(2).with_metrics_sink(sink.clone());
    let endpoint = WebhookEndpoint::new(TENANT_A, format!("{}/webhook", mock_server.uri()))
        .with_secret(SECRET_1);

    engine.deliver(&endpoint, &order_paid_event(TENANT_A)).await;

    let recorded = sink.attempts();
    assert_eq!(recorded.len(), 2);
    assert_eq!(
        recorded[0].category,
        Some(FailureCategory::ServiceUnavailable)
    );
    assert!(recorded[0].retryable);
    assert_eq!(recorded[1].category, Some(FailureCategory::MaxRetriesReached));
    assert!(!recorded[1].retryable);
}

/// Test: Request timeouts classify as Timeout and stay retryable.
#[tokio::test]
async fn test_timeout_classified_retryable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(MockEndpoint::ok().with_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let engine = test_engine(5);
    let endpoint = WebhookEndpoint::new(TENANT_A, format!("{}/webhook", mock_server.uri()))
        .with_secret(SECRET_1)
        .with_timeout(Duration::from_millis(200));

    let attempt = engine
        .attempt_once(&endpoint, &order_paid_event(TENANT_A), 1)
        .await;

    assert_eq!(attempt.status, DeliveryStatus::Failure);
    assert_eq!(attempt.category, Some(FailureCategory::Timeout));
    assert!(attempt.retryable);
    assert!(attempt.response_code.is_none());
    assert!(attempt
        .error
        .as_deref()
        .unwrap()
        .starts_with("Network error"));
}

/// Test: Connection refusal classifies as ConnectionError.
#[tokio::test]
async fn test_connection_refused_classified() {
    let engine = test_engine(5);
    // Nothing listens on port 1
    let endpoint =
        WebhookEndpoint::new(TENANT_A, "http://127.0.0.1:1/webhook").with_secret(SECRET_1);

    let attempt = engine
        .attempt_once(&endpoint, &order_paid_event(TENANT_A), 1)
        .await;

    assert_eq!(attempt.status, DeliveryStatus::Failure);
    assert_eq!(attempt.category, Some(FailureCategory::ConnectionError));
    assert!(attempt.retryable);
}

/// Test: 429 classifies as RateLimited and stays retryable.
#[tokio::test]
async fn test_upstream_429_classified_rate_limited() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .mount(&mock_server)
        .await;

    let engine = test_engine(5);
    let endpoint = WebhookEndpoint::new(TENANT_A, format!("{}/webhook", mock_server.uri()))
        .with_secret(SECRET_1);

    let attempt = engine
        .attempt_once(&endpoint, &order_paid_event(TENANT_A), 1)
        .await;

    assert_eq!(attempt.category, Some(FailureCategory::RateLimited));
    assert!(attempt.retryable);
    assert_eq!(attempt.response_code, Some(429));
}

/// Test: A multi-megabyte error body does not break delivery; only a bounded
/// prefix is read and the attempt still fails with the response status.
#[tokio::test]
async fn test_oversized_error_body_read_bounded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_bytes(vec![b'x'; 4 * 1024 * 1024]))
        .mount(&mock_server)
        .await;

    let engine = test_engine(5);
    let endpoint = WebhookEndpoint::new(TENANT_A, format!("{}/webhook", mock_server.uri()))
        .with_secret(SECRET_1);

    let attempt = engine.deliver(&endpoint, &order_paid_event(TENANT_A)).await;

    assert_eq!(attempt.status, DeliveryStatus::Failure);
    assert_eq!(attempt.response_code, Some(400));
    assert_eq!(
        attempt.error.as_deref(),
        Some("HTTP 400 response from endpoint")
    );
    assert!(!attempt.retryable);
}
