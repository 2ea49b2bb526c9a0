//! Per-endpoint circuit breaking for webhook delivery.
//!
//! Tracks consecutive failures per endpoint and short-circuits sends once a
//! threshold is crossed. The circuit reopens by timeout alone: past the
//! cool-down instant the breaker is considered closed again without a
//! half-open trial request. Any recorded success clears the state entirely.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, deliveries proceed.
    #[default]
    Closed,
    /// Circuit tripped, deliveries rejected until the cool-down elapses.
    Open,
}

impl CircuitState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
        }
    }
}

/// Configuration for circuit breaker behavior.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long an open circuit rejects deliveries.
    pub cooldown: Duration,
    /// Failures older than this no longer count as consecutive.
    pub failure_window: Duration,
    /// Recent failures retained for diagnostics.
    pub max_failure_history: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(300),
            failure_window: Duration::from_secs(300),
            max_failure_history: 10,
        }
    }
}

impl CircuitBreakerConfig {
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    #[must_use]
    pub fn with_failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }

    #[must_use]
    pub fn with_max_failure_history(mut self, size: usize) -> Self {
        self.max_failure_history = size;
        self
    }
}

/// Record of a single delivery failure, kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub timestamp: DateTime<Utc>,
    pub error: String,
    pub response_code: Option<u16>,
    pub latency_ms: Option<u64>,
}

impl FailureRecord {
    #[must_use]
    pub fn new(error: String, response_code: Option<u16>, latency_ms: Option<u64>) -> Self {
        Self {
            timestamp: Utc::now(),
            error,
            response_code,
            latency_ms,
        }
    }
}

/// Circuit breaker for a single webhook endpoint.
#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint_id: Uuid,
    tenant_id: Uuid,
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    recent_failures: Vec<FailureRecord>,
    last_failure_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    opened_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(endpoint_id: Uuid, tenant_id: Uuid, config: CircuitBreakerConfig) -> Self {
        Self {
            endpoint_id,
            tenant_id,
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            recent_failures: Vec::new(),
            last_failure_at: None,
            last_success_at: None,
            opened_at: None,
        }
    }

    #[must_use]
    pub fn endpoint_id(&self) -> Uuid {
        self.endpoint_id
    }

    #[must_use]
    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.state
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    #[must_use]
    pub fn recent_failures(&self) -> &[FailureRecord] {
        &self.recent_failures
    }

    #[must_use]
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    /// Whether deliveries are currently short-circuited.
    ///
    /// Transitions open→closed once the cool-down elapses.
    pub fn is_open(&mut self) -> bool {
        self.is_open_at(Utc::now())
    }

    pub(crate) fn is_open_at(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != CircuitState::Open {
            return false;
        }
        if let Some(opened_at) = self.opened_at {
            let elapsed = now.signed_duration_since(opened_at);
            if elapsed.num_seconds() >= self.config.cooldown.as_secs() as i64 {
                // Cool-down elapsed; naturally closed, no trial request needed.
                self.state = CircuitState::Closed;
                self.opened_at = None;
                tracing::info!(
                    target: "circuit_breaker",
                    endpoint_id = %self.endpoint_id,
                    "Circuit breaker closed after cool-down"
                );
                return false;
            }
        }
        true
    }

    /// Remaining cool-down while the circuit is open.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_at(Utc::now())
    }

    pub(crate) fn retry_after_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.state != CircuitState::Open {
            return None;
        }
        let opened_at = self.opened_at?;
        let opens_until = opened_at + chrono::Duration::from_std(self.config.cooldown).ok()?;
        let remaining = opens_until.signed_duration_since(now);
        remaining.to_std().ok()
    }

    /// Record a successful delivery, clearing breaker state entirely.
    pub fn record_success(&mut self) {
        self.last_success_at = Some(Utc::now());
        if self.state == CircuitState::Open {
            tracing::info!(
                target: "circuit_breaker",
                endpoint_id = %self.endpoint_id,
                "Circuit breaker closed after successful delivery"
            );
        }
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.recent_failures.clear();
        self.opened_at = None;
    }

    /// Record a delivery failure.
    ///
    /// Returns `true` when this failure tripped the circuit open.
    pub fn record_failure(&mut self, failure: FailureRecord) -> bool {
        self.record_failure_at(failure, Utc::now())
    }

    pub(crate) fn record_failure_at(&mut self, failure: FailureRecord, now: DateTime<Utc>) -> bool {
        // Stale failures are not consecutive.
        if let Some(last) = self.last_failure_at {
            let gap = now.signed_duration_since(last);
            if gap.num_seconds() >= self.config.failure_window.as_secs() as i64 {
                self.failure_count = 0;
            }
        }

        self.last_failure_at = Some(now);
        self.failure_count += 1;

        self.recent_failures.push(failure);
        while self.recent_failures.len() > self.config.max_failure_history {
            self.recent_failures.remove(0);
        }

        if self.state == CircuitState::Closed
            && self.failure_count >= self.config.failure_threshold
        {
            self.state = CircuitState::Open;
            self.opened_at = Some(now);
            self.failure_count = 0;
            tracing::warn!(
                target: "circuit_breaker",
                endpoint_id = %self.endpoint_id,
                threshold = self.config.failure_threshold,
                cooldown_secs = self.config.cooldown.as_secs(),
                "Circuit breaker opened due to consecutive failures"
            );
            return true;
        }
        false
    }
}

/// Snapshot of a circuit breaker, for operational surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub endpoint_id: Uuid,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub recent_failures: Vec<FailureRecord>,
}

impl From<&CircuitBreaker> for CircuitBreakerStatus {
    fn from(cb: &CircuitBreaker) -> Self {
        Self {
            endpoint_id: cb.endpoint_id,
            state: cb.state,
            failure_count: cb.failure_count,
            last_failure_at: cb.last_failure_at,
            last_success_at: cb.last_success_at,
            opened_at: cb.opened_at,
            recent_failures: cb.recent_failures.clone(),
        }
    }
}

/// Registry of circuit breakers across all endpoints.
#[derive(Clone)]
pub struct CircuitBreakerRegistry {
    breakers: Arc<RwLock<HashMap<Uuid, CircuitBreaker>>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerRegistry {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Check whether a delivery may proceed.
    ///
    /// Returns `Err(retry_after)` while the circuit is open.
    pub async fn check(&self, tenant_id: Uuid, endpoint_id: Uuid) -> Result<(), Duration> {
        let mut breakers = self.breakers.write().await;
        let cb = breakers
            .entry(endpoint_id)
            .or_insert_with(|| CircuitBreaker::new(endpoint_id, tenant_id, self.config.clone()));

        if cb.is_open() {
            Err(cb.retry_after().unwrap_or(self.config.cooldown))
        } else {
            Ok(())
        }
    }

    /// Record a successful delivery.
    pub async fn record_success(&self, tenant_id: Uuid, endpoint_id: Uuid) {
        let mut breakers = self.breakers.write().await;
        let cb = breakers
            .entry(endpoint_id)
            .or_insert_with(|| CircuitBreaker::new(endpoint_id, tenant_id, self.config.clone()));
        cb.record_success();
    }

    /// Record a delivery failure. Returns `true` when the circuit tripped.
    pub async fn record_failure(
        &self,
        tenant_id: Uuid,
        endpoint_id: Uuid,
        failure: FailureRecord,
    ) -> bool {
        let mut breakers = self.breakers.write().await;
        let cb = breakers
            .entry(endpoint_id)
            .or_insert_with(|| CircuitBreaker::new(endpoint_id, tenant_id, self.config.clone()));
        cb.record_failure(failure)
    }

    /// Snapshot one endpoint's breaker, if any state exists.
    pub async fn status(&self, endpoint_id: Uuid) -> Option<CircuitBreakerStatus> {
        let breakers = self.breakers.read().await;
        breakers.get(&endpoint_id).map(CircuitBreakerStatus::from)
    }

    /// Snapshot all breakers belonging to a tenant.
    pub async fn all_status(&self, tenant_id: Uuid) -> Vec<CircuitBreakerStatus> {
        let breakers = self.breakers.read().await;
        breakers
            .values()
            .filter(|cb| cb.tenant_id() == tenant_id)
            .map(CircuitBreakerStatus::from)
            .collect()
    }

    /// Forget an endpoint's breaker (endpoint deleted).
    pub async fn remove(&self, endpoint_id: Uuid) {
        self.breakers.write().await.remove(&endpoint_id);
    }

    /// Clear all breaker state.
    pub async fn clear(&self) {
        self.breakers.write().await.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
