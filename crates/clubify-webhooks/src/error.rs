//! Error types for the webhook delivery core.

use std::time::Duration;

/// Webhook system error variants.
///
/// The delivery engine never lets one of these escape an attempt boundary;
/// they surface either inside a [`crate::models::DeliveryAttempt`] record or
/// from configuration-time APIs.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("TLS error: {0}")]
    Ssl(String),

    #[error("HTTP {status} response from endpoint")]
    Protocol { status: u16 },

    #[error("Payload error: {0}")]
    Payload(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded { retry_after: Duration },

    #[error("Circuit breaker open, retry after {retry_after:?}")]
    CircuitOpen { retry_after: Duration },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("SSRF protection: {0}")]
    SsrfDetected(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
