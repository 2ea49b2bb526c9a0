//! Shared fixtures for the integration suite: a scriptable mock endpoint
//! that records what it was sent, engine builders wired for loopback
//! targets, and canned checkout events.

// Each test binary compiles this module and uses its own subset.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use uuid::Uuid;
use wiremock::{Request, Respond, ResponseTemplate};

use clubify_webhooks::{
    DeliveryAttempt, DeliveryConfig, DeliveryEngine, MetricsSink, RetryPolicy, WebhookEvent,
    WebhookPayload,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Standard test tenant IDs
pub const TENANT_A: Uuid = Uuid::from_bytes([
    0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x11,
]);

pub const TENANT_B: Uuid = Uuid::from_bytes([
    0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22, 0x22,
]);

/// Standard test secrets
pub const SECRET_1: &str = "whsec_test_secret_key_12345";
pub const SECRET_2: &str = "whsec_another_secret_67890";

/// Engine config suitable for wiremock targets: plain HTTP on loopback.
pub fn test_config() -> DeliveryConfig {
    DeliveryConfig::default()
        .with_allow_http(true)
        .with_block_internal_hosts(false)
}

/// Retry policy with millisecond delays so retry loops finish quickly.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::default()
        .with_base_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(50))
        .with_max_attempts(max_attempts)
}

/// Engine wired for local delivery with fast retries.
pub fn test_engine(max_attempts: u32) -> DeliveryEngine {
    DeliveryEngine::new(test_config()).with_retry_policy(fast_retry(max_attempts))
}

/// Checkout event used across the suite.
pub fn order_paid_event(tenant_id: Uuid) -> WebhookEvent {
    WebhookEvent::new(
        tenant_id,
        "order.paid",
        serde_json::json!({
            "order_id": "ord_123",
            "amount_cents": 12900,
            "currency": "BRL"
        }),
    )
}

// ---------------------------------------------------------------------------
// MockEndpoint - a scriptable receiving endpoint
// ---------------------------------------------------------------------------

/// One POST as a mock endpoint saw it.
#[derive(Debug, Clone)]
pub struct ReceivedHook {
    pub body: Vec<u8>,
    /// Header names lowercased at capture time.
    headers: HashMap<String, String>,
}

impl ReceivedHook {
    /// The body parsed as the delivery envelope.
    pub fn envelope(&self) -> WebhookPayload {
        serde_json::from_slice(&self.body).expect("body is not a delivery envelope")
    }

    /// The body parsed as arbitrary JSON.
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("body is not JSON")
    }

    /// Header value by name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// A wiremock responder standing in for a tenant's webhook receiver.
///
/// Answers a scripted sequence of status codes, then settles on a fallback,
/// recording every request it serves. Clones share state, so keep one handle
/// for assertions after mounting another.
#[derive(Clone)]
pub struct MockEndpoint {
    received: Arc<Mutex<Vec<ReceivedHook>>>,
    script: Arc<Mutex<VecDeque<u16>>>,
    fallback: u16,
    delay: Option<Duration>,
}

impl MockEndpoint {
    /// Endpoint that always answers 200.
    pub fn ok() -> Self {
        Self::status(200)
    }

    /// Endpoint that always answers the given status.
    pub fn status(code: u16) -> Self {
        Self {
            received: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: code,
            delay: None,
        }
    }

    /// Endpoint that answers 500 for the first `n` requests, then 200.
    pub fn fail_then_ok(n: usize) -> Self {
        let endpoint = Self::ok();
        endpoint.script.lock().unwrap().extend(std::iter::repeat(500).take(n));
        endpoint
    }

    /// Delay every response, e.g. to provoke client timeouts.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of requests answered so far.
    pub fn hits(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    /// Everything received, in arrival order.
    pub fn received(&self) -> Vec<ReceivedHook> {
        self.received.lock().unwrap().clone()
    }

    /// The single request this endpoint is expected to have seen.
    pub fn only_request(&self) -> ReceivedHook {
        let received = self.received.lock().unwrap();
        assert_eq!(received.len(), 1, "expected exactly one request");
        received[0].clone()
    }
}

impl Respond for MockEndpoint {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        self.received.lock().unwrap().push(ReceivedHook {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| {
                    (
                        k.as_str().to_ascii_lowercase(),
                        v.to_str().unwrap_or_default().to_string(),
                    )
                })
                .collect(),
        });

        let code = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.fallback);
        let template = ResponseTemplate::new(code);
        match self.delay {
            Some(delay) => template.set_delay(delay),
            None => template,
        }
    }
}

// ---------------------------------------------------------------------------
// RecordingSink - observes every emitted attempt record
// ---------------------------------------------------------------------------

/// A metrics sink that records every delivery attempt it sees.
#[derive(Default)]
pub struct RecordingSink {
    attempts: Mutex<Vec<DeliveryAttempt>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All recorded attempts, in emission order.
    pub fn attempts(&self) -> Vec<DeliveryAttempt> {
        self.attempts.lock().unwrap().clone()
    }
}

impl MetricsSink for RecordingSink {
    fn record_attempt(&self, attempt: &DeliveryAttempt) {
        self.attempts.lock().unwrap().push(attempt.clone());
    }
}
