//! Core data types: endpoints, events, the wire envelope, and attempt records.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classifier::FailureCategory;

/// Default total request timeout per delivery.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connect timeout per delivery.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A tenant-configured destination for event notifications.
///
/// Owned by the tenant directory collaborator; treated as immutable for the
/// duration of a delivery attempt.
#[derive(Debug, Clone)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub url: String,
    /// Signing secret. When absent the engine falls back to its
    /// [`crate::secret::SecretResolver`].
    pub secret: Option<String>,
    /// Custom headers merged into every request; these win over defaults.
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub verify_tls: bool,
    pub enabled: bool,
}

impl WebhookEndpoint {
    /// Create an endpoint with default timeouts, TLS verification on.
    pub fn new(tenant_id: Uuid, url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            url: url.into(),
            secret: None,
            headers: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            verify_tls: true,
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// An event produced by the platform, to be fanned out to endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub tenant_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl WebhookEvent {
    pub fn new(tenant_id: Uuid, event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            tenant_id,
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Optional metadata block carried in the wire envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadMetadata {
    pub user_agent: String,
    pub source: String,
    pub version: String,
}

/// The JSON body POSTed to an endpoint.
///
/// Field names and shapes are a wire contract; receivers dedupe on `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PayloadMetadata>,
}

/// Outcome of a delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Success,
    Failure,
}

/// Record of one physical send of one event to one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    /// Unique per physical attempt; also the `id` inside the wire envelope.
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    /// 1-based attempt counter for the logical delivery.
    pub attempt_number: u32,
    pub status: DeliveryStatus,
    pub response_code: Option<u16>,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
    /// Failure classification; `None` on success or local configuration errors.
    pub category: Option<FailureCategory>,
    /// Whether another attempt may be scheduled for this delivery.
    pub retryable: bool,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryAttempt {
    pub fn is_success(&self) -> bool {
        self.status == DeliveryStatus::Success
    }

    pub fn is_terminal(&self) -> bool {
        self.status == DeliveryStatus::Success || !self.retryable
    }
}
