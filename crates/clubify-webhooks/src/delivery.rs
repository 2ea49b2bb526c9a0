//! Webhook delivery engine.
//!
//! Orchestrates a single delivery attempt: circuit breaker gate, rate limit
//! gate, envelope + header construction, HMAC signing, the HTTP POST, outcome
//! classification, and breaker/metrics bookkeeping. The retry loop in
//! [`DeliveryEngine::deliver`] re-attempts retryable failures with exponential
//! backoff until success, a terminal classification, or attempt exhaustion.
//!
//! No raw error ever escapes an attempt boundary: every attempt produces
//! exactly one [`DeliveryAttempt`] record and one sink emission.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use reqwest::Client;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakerRegistry, FailureRecord};
use crate::classifier::{classify, FailureCategory, SendOutcome};
use crate::config::DeliveryConfig;
use crate::crypto;
use crate::error::WebhookError;
use crate::headers;
use crate::metrics::{DeliveryMetrics, MetricsSink};
use crate::models::{
    DeliveryAttempt, DeliveryStatus, WebhookEndpoint, WebhookEvent, WebhookPayload,
};
use crate::rate_limiter::{RateLimitConfig, RateLimiterRegistry};
use crate::retry::RetryPolicy;
use crate::secret::{NullResolver, SecretContext, SecretResolver, SigningPolicy};
use crate::validation::validate_endpoint_url;

/// Maximum response body bytes read and retained for logging.
const RESPONSE_BODY_LIMIT: usize = 4096;

/// Engine executing webhook deliveries against remote endpoints.
#[derive(Clone)]
pub struct DeliveryEngine {
    config: DeliveryConfig,
    clients: Arc<RwLock<HashMap<Uuid, Client>>>,
    resolver: Arc<dyn SecretResolver>,
    retry_policy: RetryPolicy,
    breakers: Arc<CircuitBreakerRegistry>,
    rate_limiters: Arc<RateLimiterRegistry>,
    metrics: Arc<DeliveryMetrics>,
    sink: Option<Arc<dyn MetricsSink>>,
    shutdown: CancellationToken,
}

impl DeliveryEngine {
    /// Create an engine with default breaker, rate-limit and retry settings.
    #[must_use]
    pub fn new(config: DeliveryConfig) -> Self {
        Self {
            config,
            clients: Arc::new(RwLock::new(HashMap::new())),
            resolver: Arc::new(NullResolver),
            retry_policy: RetryPolicy::default(),
            breakers: Arc::new(CircuitBreakerRegistry::new(CircuitBreakerConfig::default())),
            rate_limiters: Arc::new(RateLimiterRegistry::new(RateLimitConfig::default())),
            metrics: Arc::new(DeliveryMetrics::new()),
            sink: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Set the secret resolver consulted when an endpoint has no secret.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn SecretResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    #[must_use]
    pub fn with_circuit_breakers(mut self, registry: Arc<CircuitBreakerRegistry>) -> Self {
        self.breakers = registry;
        self
    }

    #[must_use]
    pub fn with_rate_limiters(mut self, registry: Arc<RateLimiterRegistry>) -> Self {
        self.rate_limiters = registry;
        self
    }

    #[must_use]
    pub fn with_metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Install a token that aborts in-flight deliveries and pending retries.
    #[must_use]
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Shared aggregate counters.
    #[must_use]
    pub fn metrics(&self) -> Arc<DeliveryMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Circuit breaker registry, for status surfaces.
    #[must_use]
    pub fn circuit_breakers(&self) -> Arc<CircuitBreakerRegistry> {
        Arc::clone(&self.breakers)
    }

    /// Deliver an event to one endpoint, retrying until terminal.
    ///
    /// Returns the final attempt record; intermediate attempts are emitted to
    /// the metrics sink as they happen.
    pub async fn deliver(&self, endpoint: &WebhookEndpoint, event: &WebhookEvent) -> DeliveryAttempt {
        let mut attempt_number: u32 = 1;
        loop {
            let (attempt, suggested_delay) = self.execute(endpoint, event, attempt_number).await;
            if attempt.is_terminal() {
                if attempt.status == DeliveryStatus::Failure {
                    tracing::error!(
                        target: "webhook_delivery",
                        endpoint_id = %endpoint.id,
                        tenant_id = %endpoint.tenant_id,
                        event_id = %event.event_id,
                        event_type = %event.event_type,
                        attempts = attempt.attempt_number,
                        error = attempt.error.as_deref().unwrap_or("unknown"),
                        "Webhook delivery failed terminally"
                    );
                }
                return attempt;
            }

            let wait = self.retry_wait(&attempt, suggested_delay, attempt_number);
            tracing::debug!(
                target: "webhook_delivery",
                endpoint_id = %endpoint.id,
                event_id = %event.event_id,
                attempt_number,
                wait_ms = wait.as_millis(),
                "Scheduling retry"
            );

            tokio::select! {
                () = self.shutdown.cancelled() => {
                    tracing::info!(
                        target: "webhook_delivery",
                        endpoint_id = %endpoint.id,
                        event_id = %event.event_id,
                        "Shutdown requested; abandoning pending retry"
                    );
                    return attempt;
                }
                () = tokio::time::sleep(wait) => {}
            }

            attempt_number += 1;
        }
    }

    /// Deliver an event to many endpoints with bounded concurrency.
    ///
    /// Endpoints are independent: no ordering is guaranteed between them, and
    /// disabled endpoints are skipped.
    pub async fn deliver_all(
        &self,
        endpoints: Vec<WebhookEndpoint>,
        event: &WebhookEvent,
    ) -> Vec<DeliveryAttempt> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut tasks = JoinSet::new();

        for endpoint in endpoints.into_iter().filter(|e| e.enabled) {
            let engine = self.clone();
            let event = event.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                engine.deliver(&endpoint, &event).await
            });
        }

        let mut attempts = Vec::new();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(attempt) => attempts.push(attempt),
                Err(e) => {
                    tracing::error!(
                        target: "webhook_delivery",
                        error = %e,
                        "Delivery task panicked or was cancelled"
                    );
                }
            }
        }
        attempts
    }

    /// Execute exactly one delivery attempt, without retrying.
    pub async fn attempt_once(
        &self,
        endpoint: &WebhookEndpoint,
        event: &WebhookEvent,
        attempt_number: u32,
    ) -> DeliveryAttempt {
        self.execute(endpoint, event, attempt_number).await.0
    }

    /// One attempt: gates, signing, send, classification, bookkeeping.
    ///
    /// Returns the attempt record plus the classifier's suggested delay.
    async fn execute(
        &self,
        endpoint: &WebhookEndpoint,
        event: &WebhookEvent,
        attempt_number: u32,
    ) -> (DeliveryAttempt, Option<Duration>) {
        let attempt_id = Uuid::new_v4();

        if !endpoint.enabled {
            return self
                .fail_config(
                    endpoint,
                    event,
                    attempt_id,
                    attempt_number,
                    WebhookError::Configuration("Endpoint is disabled".to_string()),
                )
                .await;
        }

        if let Err(e) = validate_endpoint_url(
            &endpoint.url,
            self.config.allow_http,
            self.config.block_internal_hosts,
        ) {
            return self
                .fail_config(endpoint, event, attempt_id, attempt_number, e)
                .await;
        }

        // Circuit breaker gate; short-circuits are not new breaker failures.
        if let Err(retry_after) = self.breakers.check(endpoint.tenant_id, endpoint.id).await {
            tracing::warn!(
                target: "webhook_delivery",
                endpoint_id = %endpoint.id,
                event_id = %event.event_id,
                retry_after_secs = retry_after.as_secs(),
                "Delivery rejected; circuit breaker is open"
            );
            return self
                .fail(
                    endpoint,
                    event,
                    attempt_id,
                    attempt_number,
                    SendOutcome::CircuitOpen { retry_after },
                    WebhookError::CircuitOpen { retry_after }.to_string(),
                    None,
                    None,
                    false,
                )
                .await;
        }

        // Rate limit gate; rejections never count against the breaker.
        if let Err(retry_after) = self.rate_limiters.try_acquire(endpoint.id).await {
            self.metrics.record_rate_limit_hit();
            tracing::debug!(
                target: "webhook_delivery",
                endpoint_id = %endpoint.id,
                event_id = %event.event_id,
                retry_after_secs = retry_after.as_secs(),
                "Delivery rejected; rate limit window exhausted"
            );
            return self
                .fail(
                    endpoint,
                    event,
                    attempt_id,
                    attempt_number,
                    SendOutcome::RateLimited { retry_after },
                    WebhookError::RateLimitExceeded { retry_after }.to_string(),
                    None,
                    None,
                    false,
                )
                .await;
        }

        // Envelope; these exact bytes are signed and transmitted.
        let payload = WebhookPayload {
            event: event.event_type.clone(),
            data: event.data.clone(),
            timestamp: Utc::now(),
            id: attempt_id,
            metadata: self.config.metadata(),
        };
        let body = match serde_json::to_vec(&payload) {
            Ok(b) => b,
            Err(e) => {
                return self
                    .fail_config(
                        endpoint,
                        event,
                        attempt_id,
                        attempt_number,
                        WebhookError::Payload(format!("Failed to serialize payload: {e}")),
                    )
                    .await;
            }
        };

        let secret = match self.resolve_secret(endpoint).await {
            Ok(s) => s,
            Err(e) => {
                return self
                    .fail_config(endpoint, event, attempt_id, attempt_number, e)
                    .await;
            }
        };
        if secret.is_none() && self.config.signing_policy == SigningPolicy::Required {
            let error = WebhookError::Configuration(
                "No signing secret resolved and unsigned sends are not allowed".to_string(),
            );
            return self
                .fail(
                    endpoint,
                    event,
                    attempt_id,
                    attempt_number,
                    SendOutcome::SigningFailed("no signing secret resolved".to_string()),
                    error.to_string(),
                    None,
                    None,
                    false,
                )
                .await;
        }

        let header_map = self.build_headers(endpoint, event, attempt_id, secret.as_deref(), &body);

        let client = match self.client_for(endpoint).await {
            Ok(c) => c,
            Err(e) => {
                return self
                    .fail_config(endpoint, event, attempt_id, attempt_number, e)
                    .await;
            }
        };

        let start = Instant::now();
        let result = client
            .post(&endpoint.url)
            .headers(header_map)
            .body(body)
            .send()
            .await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok());
                let response_body = read_body_truncated(response).await;

                if (200..300).contains(&status) {
                    self.succeed(endpoint, event, attempt_id, attempt_number, status, latency_ms)
                        .await
                } else {
                    tracing::debug!(
                        target: "webhook_delivery",
                        endpoint_id = %endpoint.id,
                        status,
                        response_body = %response_body,
                        "Endpoint returned non-2xx response"
                    );
                    self.fail(
                        endpoint,
                        event,
                        attempt_id,
                        attempt_number,
                        SendOutcome::Status {
                            code: status,
                            retry_after,
                        },
                        WebhookError::Protocol { status }.to_string(),
                        Some(status),
                        Some(latency_ms),
                        true,
                    )
                    .await
                }
            }
            Err(e) => {
                let (outcome, error) = map_send_error(&e);
                self.fail(
                    endpoint,
                    event,
                    attempt_id,
                    attempt_number,
                    outcome,
                    error,
                    None,
                    Some(latency_ms),
                    true,
                )
                .await
            }
        }
    }

    /// Delay before the next attempt.
    ///
    /// The scheduler's exponential backoff paces retries; structural waits
    /// (breaker cool-down, rate window reset, `Retry-After`) override it
    /// because retrying earlier cannot succeed.
    fn retry_wait(
        &self,
        attempt: &DeliveryAttempt,
        suggested: Option<Duration>,
        attempt_number: u32,
    ) -> Duration {
        match attempt.category {
            Some(FailureCategory::CircuitOpen | FailureCategory::RateLimited) => {
                suggested.unwrap_or_else(|| self.retry_policy.delay_for(attempt_number))
            }
            _ => self.retry_policy.delay_for(attempt_number),
        }
    }

    async fn resolve_secret(
        &self,
        endpoint: &WebhookEndpoint,
    ) -> Result<Option<String>, WebhookError> {
        if endpoint.secret.is_some() {
            return Ok(endpoint.secret.clone());
        }
        let ctx = SecretContext {
            tenant_id: Some(endpoint.tenant_id),
            endpoint_id: Some(endpoint.id),
        };
        self.resolver.resolve(&ctx).await
    }

    fn build_headers(
        &self,
        endpoint: &WebhookEndpoint,
        event: &WebhookEvent,
        attempt_id: Uuid,
        secret: Option<&str>,
        body: &[u8],
    ) -> HeaderMap {
        // Header values come from validated UUIDs and config strings; parse
        // failures are skipped rather than failing the delivery.
        let mut map = HeaderMap::new();
        if let Ok(v) = HeaderValue::from_str("application/json") {
            map.insert(CONTENT_TYPE, v);
        }
        if let Ok(v) = HeaderValue::from_str(&event.event_type) {
            if let Ok(n) = headers::EVENT_TYPE.parse::<HeaderName>() {
                map.insert(n, v);
            }
        }
        if let Ok(v) = HeaderValue::from_str(&attempt_id.to_string()) {
            if let Ok(n) = headers::EVENT_ID.parse::<HeaderName>() {
                map.insert(n, v);
            }
        }
        let timestamp = Utc::now().timestamp().to_string();
        if let Ok(v) = HeaderValue::from_str(&timestamp) {
            if let Ok(n) = headers::TIMESTAMP.parse::<HeaderName>() {
                map.insert(n, v);
            }
        }
        if let Some(secret) = secret {
            let signature = crypto::sign_payload(secret, body);
            if let Ok(v) = HeaderValue::from_str(&signature) {
                if let Ok(n) = headers::SIGNATURE.parse::<HeaderName>() {
                    map.insert(n, v);
                }
            }
        } else {
            tracing::warn!(
                target: "webhook_delivery",
                endpoint_id = %endpoint.id,
                "Delivering without signature; no secret configured"
            );
        }

        // Endpoint-specified headers win over defaults.
        for (name, value) in &endpoint.headers {
            if let (Ok(n), Ok(v)) = (name.parse::<HeaderName>(), HeaderValue::from_str(value)) {
                map.insert(n, v);
            }
        }
        map
    }

    /// Get or build the per-endpoint HTTP client.
    ///
    /// Timeouts and TLS verification are client-level settings in reqwest, so
    /// clients are cached per endpoint.
    async fn client_for(&self, endpoint: &WebhookEndpoint) -> Result<Client, WebhookError> {
        {
            let clients = self.clients.read().await;
            if let Some(client) = clients.get(&endpoint.id) {
                return Ok(client.clone());
            }
        }

        let client = Client::builder()
            .timeout(endpoint.timeout)
            .connect_timeout(endpoint.connect_timeout)
            .user_agent(&self.config.user_agent)
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(!endpoint.verify_tls)
            .build()
            .map_err(|e| WebhookError::Internal(format!("Failed to build HTTP client: {e}")))?;

        let mut clients = self.clients.write().await;
        Ok(clients.entry(endpoint.id).or_insert(client).clone())
    }

    async fn succeed(
        &self,
        endpoint: &WebhookEndpoint,
        event: &WebhookEvent,
        attempt_id: Uuid,
        attempt_number: u32,
        status: u16,
        latency_ms: u64,
    ) -> (DeliveryAttempt, Option<Duration>) {
        self.breakers
            .record_success(endpoint.tenant_id, endpoint.id)
            .await;
        self.metrics.record_success(latency_ms);

        tracing::info!(
            target: "webhook_delivery",
            endpoint_id = %endpoint.id,
            tenant_id = %endpoint.tenant_id,
            event_id = %event.event_id,
            event_type = %event.event_type,
            response_code = status,
            latency_ms,
            attempt_number,
            "Webhook delivery succeeded"
        );

        let attempt = DeliveryAttempt {
            id: attempt_id,
            endpoint_id: endpoint.id,
            event_id: event.event_id,
            event_type: event.event_type.clone(),
            attempt_number,
            status: DeliveryStatus::Success,
            response_code: Some(status),
            latency_ms: Some(latency_ms),
            error: None,
            category: None,
            retryable: false,
            timestamp: Utc::now(),
        };
        self.emit(&attempt);
        (attempt, None)
    }

    /// Local configuration failure: terminal, no classification, no breaker.
    async fn fail_config(
        &self,
        endpoint: &WebhookEndpoint,
        event: &WebhookEvent,
        attempt_id: Uuid,
        attempt_number: u32,
        error: WebhookError,
    ) -> (DeliveryAttempt, Option<Duration>) {
        self.metrics.record_failure(None);
        let error = error.to_string();

        tracing::warn!(
            target: "webhook_delivery",
            endpoint_id = %endpoint.id,
            event_id = %event.event_id,
            error = %error,
            "Webhook delivery failed before send"
        );

        let attempt = DeliveryAttempt {
            id: attempt_id,
            endpoint_id: endpoint.id,
            event_id: event.event_id,
            event_type: event.event_type.clone(),
            attempt_number,
            status: DeliveryStatus::Failure,
            response_code: None,
            latency_ms: None,
            error: Some(error),
            category: None,
            retryable: false,
            timestamp: Utc::now(),
        };
        self.emit(&attempt);
        (attempt, None)
    }

    #[allow(clippy::too_many_arguments)]
    async fn fail(
        &self,
        endpoint: &WebhookEndpoint,
        event: &WebhookEvent,
        attempt_id: Uuid,
        attempt_number: u32,
        outcome: SendOutcome,
        error: String,
        response_code: Option<u16>,
        latency_ms: Option<u64>,
        count_breaker_failure: bool,
    ) -> (DeliveryAttempt, Option<Duration>) {
        let mut classification = classify(&outcome);

        // Attempt budget exhausted: the classification becomes terminal.
        if classification.retryable && !self.retry_policy.attempts_remaining(attempt_number) {
            classification = crate::classifier::Classification::max_retries();
        }

        if count_breaker_failure {
            let record = FailureRecord::new(error.clone(), response_code, latency_ms);
            let tripped = self
                .breakers
                .record_failure(endpoint.tenant_id, endpoint.id, record)
                .await;
            if tripped {
                self.metrics.record_breaker_trip();
            }
        }
        self.metrics.record_failure(latency_ms);

        tracing::warn!(
            target: "webhook_delivery",
            endpoint_id = %endpoint.id,
            tenant_id = %endpoint.tenant_id,
            event_id = %event.event_id,
            event_type = %event.event_type,
            error = %error,
            category = ?classification.category,
            attempt_number,
            retryable = classification.retryable,
            "Webhook delivery attempt failed"
        );

        let attempt = DeliveryAttempt {
            id: attempt_id,
            endpoint_id: endpoint.id,
            event_id: event.event_id,
            event_type: event.event_type.clone(),
            attempt_number,
            status: DeliveryStatus::Failure,
            response_code,
            latency_ms,
            error: Some(error),
            category: Some(classification.category),
            retryable: classification.retryable,
            timestamp: Utc::now(),
        };
        self.emit(&attempt);
        (attempt, classification.retry_delay)
    }

    fn emit(&self, attempt: &DeliveryAttempt) {
        if let Some(sink) = &self.sink {
            sink.record_attempt(attempt);
        }
    }
}

/// Read at most [`RESPONSE_BODY_LIMIT`] bytes of the response body.
///
/// The rest of the stream is dropped without buffering, so an endpoint
/// answering with an arbitrarily large body cannot balloon memory.
async fn read_body_truncated(mut response: reqwest::Response) -> String {
    let mut buf: Vec<u8> = Vec::new();
    while buf.len() < RESPONSE_BODY_LIMIT {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let take = (RESPONSE_BODY_LIMIT - buf.len()).min(chunk.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Ok(None) | Err(_) => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Map a reqwest error to a classifiable outcome and a description.
fn map_send_error(e: &reqwest::Error) -> (SendOutcome, String) {
    let mut description = e.to_string();
    let mut source = std::error::Error::source(e);
    while let Some(cause) = source {
        description.push_str(": ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }

    let lower = description.to_ascii_lowercase();
    if e.is_timeout() {
        (SendOutcome::Timeout, WebhookError::Network(description).to_string())
    } else if lower.contains("certificate") || lower.contains("tls") || lower.contains("ssl") {
        (
            SendOutcome::TlsFailure(description.clone()),
            WebhookError::Ssl(description).to_string(),
        )
    } else {
        (
            SendOutcome::ConnectionFailed(description.clone()),
            WebhookError::Network(description).to_string(),
        )
    }
}
