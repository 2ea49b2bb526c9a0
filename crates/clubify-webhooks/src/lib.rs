//! Webhook delivery core for the Clubify checkout platform.
//!
//! HMAC-SHA256-signed outbound delivery with per-endpoint circuit breaking,
//! fixed-window rate limiting, retry classification with exponential backoff,
//! multi-tenant secret resolution, and the mirrored inbound validation path.

pub mod circuit_breaker;
pub mod classifier;
pub mod config;
pub mod crypto;
pub mod delivery;
pub mod error;
pub mod events;
pub mod headers;
pub mod inbound;
pub mod metrics;
pub mod models;
pub mod rate_limiter;
pub mod retry;
pub mod secret;
pub mod validation;
pub mod worker;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitBreakerStatus,
    CircuitState, FailureRecord,
};
pub use classifier::{classify, Classification, FailureCategory, SendOutcome};
pub use config::DeliveryConfig;
pub use delivery::DeliveryEngine;
pub use error::WebhookError;
pub use events::{EndpointStore, EventPublisher, InMemoryEndpointStore};
pub use inbound::{validate_webhook, InboundState, VerifiedWebhook};
pub use metrics::{DeliveryMetrics, MetricsSink, MetricsSnapshot};
pub use models::{
    DeliveryAttempt, DeliveryStatus, PayloadMetadata, WebhookEndpoint, WebhookEvent,
    WebhookPayload,
};
pub use rate_limiter::{RateLimitConfig, RateLimiter, RateLimiterRegistry};
pub use retry::RetryPolicy;
pub use secret::{
    CallbackResolver, DirectoryResolver, FallbackResolver, SecretContext, SecretResolver,
    SigningPolicy, StaticTenantDirectory, TenantDirectory,
};
pub use worker::WebhookWorker;
