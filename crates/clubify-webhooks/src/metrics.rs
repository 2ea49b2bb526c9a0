//! Process-wide delivery metrics and the external sink seam.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::models::DeliveryAttempt;

/// Aggregate delivery counters, shared across concurrent senders.
///
/// In-memory only; multi-process deployments aggregate through a
/// [`MetricsSink`] instead.
#[derive(Debug, Default)]
pub struct DeliveryMetrics {
    total_deliveries: AtomicU64,
    successful_deliveries: AtomicU64,
    failed_deliveries: AtomicU64,
    breaker_trips: AtomicU64,
    rate_limit_hits: AtomicU64,
    latency_ms_total: AtomicU64,
    latency_samples: AtomicU64,
}

impl DeliveryMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, latency_ms: u64) {
        self.total_deliveries.fetch_add(1, Ordering::Relaxed);
        self.successful_deliveries.fetch_add(1, Ordering::Relaxed);
        self.record_latency(latency_ms);
    }

    pub fn record_failure(&self, latency_ms: Option<u64>) {
        self.total_deliveries.fetch_add(1, Ordering::Relaxed);
        self.failed_deliveries.fetch_add(1, Ordering::Relaxed);
        if let Some(ms) = latency_ms {
            self.record_latency(ms);
        }
    }

    pub fn record_breaker_trip(&self) {
        self.breaker_trips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_hit(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, latency_ms: u64) {
        self.latency_ms_total.fetch_add(latency_ms, Ordering::Relaxed);
        self.latency_samples.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.latency_samples.load(Ordering::Relaxed);
        let avg_latency_ms = if samples == 0 {
            0.0
        } else {
            self.latency_ms_total.load(Ordering::Relaxed) as f64 / samples as f64
        };

        MetricsSnapshot {
            total_deliveries: self.total_deliveries.load(Ordering::Relaxed),
            successful_deliveries: self.successful_deliveries.load(Ordering::Relaxed),
            failed_deliveries: self.failed_deliveries.load(Ordering::Relaxed),
            breaker_trips: self.breaker_trips.load(Ordering::Relaxed),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
            avg_latency_ms,
        }
    }
}

/// Point-in-time view of [`DeliveryMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub total_deliveries: u64,
    pub successful_deliveries: u64,
    pub failed_deliveries: u64,
    pub breaker_trips: u64,
    pub rate_limit_hits: u64,
    pub avg_latency_ms: f64,
}

/// Collaborator receiving one record per delivery attempt, for external
/// aggregation and alerting.
pub trait MetricsSink: Send + Sync {
    fn record_attempt(&self, attempt: &DeliveryAttempt);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
