//! Per-endpoint fixed-window rate limiting.
//!
//! Each endpoint gets a counter keyed by the current UTC window (one minute
//! by default). Once the budget is spent the remaining calls in the window
//! are rejected without incrementing; rejection is reported with the time
//! until the next window and is never counted as a circuit-breaker failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Configuration for per-endpoint rate limiting.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Allowed requests per window.
    pub budget: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            budget: 60,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new(budget: u32, window: Duration) -> Self {
        Self { budget, window }
    }

    #[must_use]
    pub fn with_budget(mut self, budget: u32) -> Self {
        self.budget = budget;
        self
    }

    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

/// Fixed-window counter for a single endpoint.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Index of the window the counter belongs to.
    bucket: i64,
    count: u32,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            bucket: -1,
            count: 0,
        }
    }

    /// Admit one request, incrementing the window counter.
    ///
    /// Returns `false` without incrementing once the budget is spent.
    pub fn try_acquire(&mut self) -> bool {
        self.try_acquire_at(Utc::now())
    }

    pub(crate) fn try_acquire_at(&mut self, now: DateTime<Utc>) -> bool {
        let bucket = self.bucket_for(now);
        if bucket != self.bucket {
            self.bucket = bucket;
            self.count = 0;
        }

        if self.count >= self.config.budget {
            return false;
        }
        self.count += 1;
        true
    }

    /// Time until the next window opens.
    pub fn retry_after(&self) -> Duration {
        self.retry_after_at(Utc::now())
    }

    pub(crate) fn retry_after_at(&self, now: DateTime<Utc>) -> Duration {
        let window_secs = self.config.window.as_secs().max(1) as i64;
        let elapsed = now.timestamp().rem_euclid(window_secs);
        Duration::from_secs((window_secs - elapsed) as u64)
    }

    /// Requests admitted in the current window.
    #[must_use]
    pub fn current_count(&self) -> u32 {
        self.count
    }

    fn bucket_for(&self, now: DateTime<Utc>) -> i64 {
        let window_secs = self.config.window.as_secs().max(1) as i64;
        now.timestamp().div_euclid(window_secs)
    }
}

/// Registry of rate limiters across all endpoints.
#[derive(Clone)]
pub struct RateLimiterRegistry {
    limiters: Arc<RwLock<HashMap<Uuid, RateLimiter>>>,
    config: RateLimitConfig,
}

impl RateLimiterRegistry {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiters: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Admit one request for the endpoint.
    ///
    /// Returns `Err(retry_after)` when the window budget is spent.
    pub async fn try_acquire(&self, endpoint_id: Uuid) -> Result<(), Duration> {
        let mut limiters = self.limiters.write().await;
        let limiter = limiters
            .entry(endpoint_id)
            .or_insert_with(|| RateLimiter::new(self.config.clone()));

        if limiter.try_acquire() {
            Ok(())
        } else {
            Err(limiter.retry_after())
        }
    }

    /// Drop the window state for an endpoint.
    pub async fn remove(&self, endpoint_id: Uuid) {
        self.limiters.write().await.remove(&endpoint_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_budget_enforced_within_window() {
        let config = RateLimitConfig::default().with_budget(60);
        let mut limiter = RateLimiter::new(config);
        let now = at(1_700_000_040);

        for i in 0..60 {
            assert!(limiter.try_acquire_at(now), "request {i} should be admitted");
        }
        // 61st call in the same window is rejected
        assert!(!limiter.try_acquire_at(now));
        // Rejection does not consume budget state
        assert_eq!(limiter.current_count(), 60);
    }

    #[test]
    fn test_window_rollover_resets_counter() {
        let config = RateLimitConfig::new(2, Duration::from_secs(60));
        let mut limiter = RateLimiter::new(config);

        assert!(limiter.try_acquire_at(at(120)));
        assert!(limiter.try_acquire_at(at(150)));
        assert!(!limiter.try_acquire_at(at(179)));

        // Next minute bucket
        assert!(limiter.try_acquire_at(at(180)));
        assert_eq!(limiter.current_count(), 1);
    }

    #[test]
    fn test_retry_after_points_at_next_window() {
        let config = RateLimitConfig::new(1, Duration::from_secs(60));
        let limiter = RateLimiter::new(config);

        assert_eq!(limiter.retry_after_at(at(120)), Duration::from_secs(60));
        assert_eq!(limiter.retry_after_at(at(150)), Duration::from_secs(30));
        assert_eq!(limiter.retry_after_at(at(179)), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_registry_isolates_endpoints() {
        let registry = RateLimiterRegistry::new(RateLimitConfig::new(1, Duration::from_secs(3600)));
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(registry.try_acquire(a).await.is_ok());
        assert!(registry.try_acquire(a).await.is_err());
        // Endpoint B has its own budget
        assert!(registry.try_acquire(b).await.is_ok());
    }

    #[tokio::test]
    async fn test_registry_reports_retry_after() {
        let registry = RateLimiterRegistry::new(RateLimitConfig::new(1, Duration::from_secs(3600)));
        let endpoint = Uuid::new_v4();

        registry.try_acquire(endpoint).await.unwrap();
        let retry_after = registry.try_acquire(endpoint).await.unwrap_err();
        assert!(retry_after <= Duration::from_secs(3600));
        assert!(retry_after > Duration::ZERO);
    }
}
