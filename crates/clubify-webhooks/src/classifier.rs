//! Pure classification of delivery outcomes into retry policy.
//!
//! The engine branches on the returned tag, never on error types. Same
//! outcome always yields the same classification.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Why a delivery attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Request timed out, locally or with HTTP 408.
    Timeout,
    /// Endpoint answered 429, or the local per-endpoint budget was hit.
    RateLimited,
    /// Connection refused, DNS failure, connection reset.
    ConnectionError,
    /// HTTP 504.
    GatewayTimeout,
    /// HTTP 502 or 503.
    ServiceUnavailable,
    /// TLS handshake or certificate failure.
    SslError,
    /// HTTP 413.
    PayloadTooLarge,
    /// Local signature computation failure.
    InvalidSignature,
    /// Any other non-retryable HTTP status below 500.
    ClientError,
    /// Any other 5xx.
    ServerError,
    /// Short-circuited by the per-endpoint circuit breaker.
    CircuitOpen,
    /// Attempt budget exhausted; the delivery is terminal.
    MaxRetriesReached,
}

/// Raw result of one send, before classification.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The endpoint answered with a non-2xx status. `retry_after` carries the
    /// parsed `Retry-After` header in seconds when present.
    Status { code: u16, retry_after: Option<u64> },
    /// The request timed out before a response arrived.
    Timeout,
    /// The connection could not be established.
    ConnectionFailed(String),
    /// TLS negotiation failed.
    TlsFailure(String),
    /// The payload could not be signed.
    SigningFailed(String),
    /// The circuit breaker rejected the attempt without a network call.
    CircuitOpen { retry_after: Duration },
    /// The local rate limiter rejected the attempt without a network call.
    RateLimited { retry_after: Duration },
}

/// Classification verdict: whether to retry and how long to wait.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub category: FailureCategory,
    pub retryable: bool,
    /// Suggested delay before the next attempt; `None` for terminal failures.
    pub retry_delay: Option<Duration>,
}

impl Classification {
    fn retryable(category: FailureCategory, delay_secs: u64) -> Self {
        Self {
            category,
            retryable: true,
            retry_delay: Some(Duration::from_secs(delay_secs)),
        }
    }

    fn terminal(category: FailureCategory) -> Self {
        Self {
            category,
            retryable: false,
            retry_delay: None,
        }
    }

    /// Terminal verdict applied when the attempt budget is exhausted.
    pub fn max_retries() -> Self {
        Self::terminal(FailureCategory::MaxRetriesReached)
    }
}

/// Map a send outcome to retryability and a suggested delay.
pub fn classify(outcome: &SendOutcome) -> Classification {
    match outcome {
        SendOutcome::Status { code, retry_after } => classify_status(*code, *retry_after),
        SendOutcome::Timeout => Classification::retryable(FailureCategory::Timeout, 30),
        SendOutcome::ConnectionFailed(_) => {
            Classification::retryable(FailureCategory::ConnectionError, 30)
        }
        SendOutcome::TlsFailure(_) => Classification::terminal(FailureCategory::SslError),
        SendOutcome::SigningFailed(_) => {
            Classification::terminal(FailureCategory::InvalidSignature)
        }
        SendOutcome::CircuitOpen { retry_after } => Classification {
            category: FailureCategory::CircuitOpen,
            retryable: true,
            retry_delay: Some(*retry_after),
        },
        SendOutcome::RateLimited { retry_after } => Classification {
            category: FailureCategory::RateLimited,
            retryable: true,
            retry_delay: Some(*retry_after),
        },
    }
}

fn classify_status(code: u16, retry_after: Option<u64>) -> Classification {
    match code {
        408 => Classification::retryable(FailureCategory::Timeout, 30),
        429 => Classification::retryable(FailureCategory::RateLimited, retry_after.unwrap_or(60)),
        413 => Classification::terminal(FailureCategory::PayloadTooLarge),
        502 => Classification::retryable(FailureCategory::ServiceUnavailable, 30),
        503 => Classification::retryable(FailureCategory::ServiceUnavailable, 60),
        504 => Classification::retryable(FailureCategory::GatewayTimeout, 45),
        500.. => Classification::retryable(FailureCategory::ServerError, 300),
        // 3xx (redirects are disabled) and remaining 4xx are terminal.
        _ => Classification::terminal(FailureCategory::ClientError),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
