//! Inbound webhook validation middleware.
//!
//! The mirrored verification path for webhooks this platform receives:
//! required signature/timestamp headers, a replay-protection tolerance
//! window, JSON body shape checks, and constant-time signature verification.
//! Every failure produces the same structured 400 body; signature failures
//! carry a generic message so the response cannot be used as an oracle.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::crypto;
use crate::headers;
use crate::secret::{SecretContext, SecretResolver};

/// Replay-protection window applied to the timestamp header, both directions.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

/// Upper bound on accepted request bodies.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Fields every inbound webhook body must carry at the top level.
const REQUIRED_FIELDS: [&str; 3] = ["event", "data", "timestamp"];

/// Shared state for the validation middleware.
#[derive(Clone)]
pub struct InboundState {
    resolver: Arc<dyn SecretResolver>,
    tolerance: Duration,
}

impl InboundState {
    pub fn new(resolver: Arc<dyn SecretResolver>) -> Self {
        Self {
            resolver,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Verified webhook details inserted into request extensions on success.
#[derive(Debug, Clone)]
pub struct VerifiedWebhook {
    pub event_type: String,
    pub tenant_id: Option<Uuid>,
    pub payload: serde_json::Value,
}

/// Structured 400 rejection for invalid inbound webhooks.
#[derive(Debug)]
pub struct InboundRejection {
    message: String,
}

impl InboundRejection {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl IntoResponse for InboundRejection {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": "Invalid Webhook",
            "message": self.message,
            "code": 400,
            "timestamp": Utc::now().to_rfc3339(),
        });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

/// Middleware validating inbound webhook requests.
///
/// Mount with `axum::middleware::from_fn_with_state(state, validate_webhook)`.
/// Valid requests pass through enriched with a [`VerifiedWebhook`] extension;
/// everything else is answered with the structured 400 body.
pub async fn validate_webhook(
    State(state): State<InboundState>,
    request: Request,
    next: Next,
) -> Response {
    match verify_request(&state, request).await {
        Ok(request) => next.run(request).await,
        Err(rejection) => {
            tracing::warn!(
                target: "webhook_validation",
                reason = %rejection.message,
                "Rejected inbound webhook"
            );
            rejection.into_response()
        }
    }
}

async fn verify_request(
    state: &InboundState,
    request: Request,
) -> Result<Request, InboundRejection> {
    let (parts, body) = request.into_parts();

    let signature = header_str(&parts.headers, headers::SIGNATURE)
        .ok_or_else(|| InboundRejection::new("Missing webhook signature header"))?
        .to_string();
    let timestamp = header_str(&parts.headers, headers::TIMESTAMP)
        .ok_or_else(|| InboundRejection::new("Missing webhook timestamp header"))?
        .parse::<i64>()
        .map_err(|_| InboundRejection::new("Invalid webhook timestamp"))?;

    // Replay protection, both directions.
    let skew = (Utc::now().timestamp() - timestamp).unsigned_abs();
    if skew > state.tolerance.as_secs() {
        return Err(InboundRejection::new("Webhook timestamp expired"));
    }

    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| InboundRejection::new("Unable to read request body"))?;
    let payload: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|_| InboundRejection::new("Request body is not valid JSON"))?;
    let object = payload
        .as_object()
        .ok_or_else(|| InboundRejection::new("Request body must be a JSON object"))?;
    for field in REQUIRED_FIELDS {
        if !object.contains_key(field) {
            return Err(InboundRejection::new(format!(
                "Missing required field: {field}"
            )));
        }
    }

    let tenant_id = tenant_hint(&parts.headers, object);
    let ctx = SecretContext {
        tenant_id,
        endpoint_id: None,
    };

    // Any secret-resolution problem reads as a signature failure; a more
    // detailed answer would leak which tenants exist.
    let secret = state
        .resolver
        .resolve(&ctx)
        .await
        .ok()
        .flatten()
        .ok_or_else(|| InboundRejection::new("Invalid webhook signature"))?;

    if !crypto::verify_signature(&signature, &secret, &bytes) {
        return Err(InboundRejection::new("Invalid webhook signature"));
    }

    let event_type = object
        .get("event")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut request = Request::from_parts(parts, Body::from(bytes));
    request.extensions_mut().insert(VerifiedWebhook {
        event_type,
        tenant_id,
        payload,
    });
    Ok(request)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Tenant hint from the dedicated header, else the body's `tenant_id` field.
fn tenant_hint(headers: &HeaderMap, body: &serde_json::Map<String, serde_json::Value>) -> Option<Uuid> {
    if let Some(raw) = header_str(headers, headers::TENANT) {
        if let Ok(id) = raw.parse::<Uuid>() {
            return Some(id);
        }
    }
    body.get("tenant_id")
        .and_then(serde_json::Value::as_str)
        .and_then(|s| s.parse::<Uuid>().ok())
}
