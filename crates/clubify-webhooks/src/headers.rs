//! Wire header names shared by outbound delivery and inbound validation.
//!
//! The platform historically used `X-Webhook-Signature` on the outbound side
//! and `X-Clubify-Signature` on the inbound side. Both directions now use the
//! Clubify convention so that a receiver can verify with a single rule.

/// HMAC-SHA256 signature of the request body, `sha256=<hex>`.
pub const SIGNATURE: &str = "X-Clubify-Signature";

/// Unix-seconds timestamp at which the signature was produced.
pub const TIMESTAMP: &str = "X-Clubify-Timestamp";

/// Event type string, e.g. `order.paid`.
pub const EVENT_TYPE: &str = "X-Event-Type";

/// Unique id of this physical delivery attempt.
pub const EVENT_ID: &str = "X-Event-ID";

/// Tenant hint for inbound secret resolution.
pub const TENANT: &str = "X-Clubify-Tenant";
