//! Observability metrics for throttling and admission.
//!
//! Exporters read these as plain snapshots; nothing here talks to a backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Metrics tracking throttling and admission statistics.
///
/// All metrics use atomic operations for thread-safe updates and reads.
/// Clones share the same counters, so one instance can be handed to several
/// throttles and queues.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    /// Requests passed by a threshold throttle
    requests_allowed: AtomicU64,
    /// Requests blocked by a threshold throttle
    requests_throttled: AtomicU64,
    /// Queue admissions without waiting
    admitted_immediately: AtomicU64,
    /// Queue admissions after waiting for a window roll-over
    admitted_from_queue: AtomicU64,
    /// Queued requests whose TTL ran out
    requests_expired: AtomicU64,
    /// Requests refused because the queue was full
    requests_dropped: AtomicU64,
}

impl Metrics {
    /// Create a new metrics tracker.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner::default()),
        }
    }

    pub(crate) fn record_allowed(&self) {
        self.inner.requests_allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_throttled(&self) {
        self.inner.requests_throttled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_admitted_immediately(&self) {
        self.inner
            .admitted_immediately
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_admitted_from_queue(&self) {
        self.inner.admitted_from_queue.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_expired(&self) {
        self.inner.requests_expired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.inner.requests_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Requests passed by threshold throttling.
    pub fn requests_allowed(&self) -> u64 {
        self.inner.requests_allowed.load(Ordering::Relaxed)
    }

    /// Requests blocked by threshold throttling.
    pub fn requests_throttled(&self) -> u64 {
        self.inner.requests_throttled.load(Ordering::Relaxed)
    }

    /// Queue admissions that did not wait.
    pub fn admitted_immediately(&self) -> u64 {
        self.inner.admitted_immediately.load(Ordering::Relaxed)
    }

    /// Queue admissions that waited for a window roll-over.
    pub fn admitted_from_queue(&self) -> u64 {
        self.inner.admitted_from_queue.load(Ordering::Relaxed)
    }

    /// Queued requests that expired.
    pub fn requests_expired(&self) -> u64 {
        self.inner.requests_expired.load(Ordering::Relaxed)
    }

    /// Requests dropped by a full queue.
    pub fn requests_dropped(&self) -> u64 {
        self.inner.requests_dropped.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_allowed: self.requests_allowed(),
            requests_throttled: self.requests_throttled(),
            admitted_immediately: self.admitted_immediately(),
            admitted_from_queue: self.admitted_from_queue(),
            requests_expired: self.requests_expired(),
            requests_dropped: self.requests_dropped(),
        }
    }

    /// Reset all metrics to zero.
    pub fn reset(&self) {
        let inner = &self.inner;
        for counter in [
            &inner.requests_allowed,
            &inner.requests_throttled,
            &inner.admitted_immediately,
            &inner.admitted_from_queue,
            &inner.requests_expired,
            &inner.requests_dropped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub requests_allowed: u64,
    pub requests_throttled: u64,
    pub admitted_immediately: u64,
    pub admitted_from_queue: u64,
    pub requests_expired: u64,
    pub requests_dropped: u64,
}

impl MetricsSnapshot {
    /// Share of threshold-throttled requests that were blocked (0.0 to 1.0).
    ///
    /// Returns 0.0 if no requests have been processed.
    pub fn throttle_rate(&self) -> f64 {
        let total = self.requests_allowed.saturating_add(self.requests_throttled);
        if total == 0 {
            0.0
        } else {
            self.requests_throttled as f64 / total as f64
        }
    }

    /// Total queue admissions, immediate or delayed.
    pub fn total_admitted(&self) -> u64 {
        self.admitted_immediately
            .saturating_add(self.admitted_from_queue)
    }

    /// Total queue refusals, expired or dropped.
    pub fn total_refused(&self) -> u64 {
        self.requests_expired.saturating_add(self.requests_dropped)
    }
}
