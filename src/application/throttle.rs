//! Threshold throttling.
//!
//! Counts each request against its remedy (and optionally its group) and
//! blocks it once the window count passes the group's share of the quota.

use crate::application::limiter::{CounterSnapshot, LimiterIdRateLimiter};
use crate::application::metrics::Metrics;
use crate::application::ports::Clock;
use crate::domain::scope::{Grouping, LimiterArguments};
use crate::domain::strategy::{DefaultGroupBehavior, ThrottlingConfig};
use crate::error::ThrottleError;
use std::collections::HashMap;
use std::sync::Arc;

/// What to do with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Let the request through
    Allow,
    /// Answer early with this status code
    Block { status_code: u16 },
}

impl ThrottleDecision {
    /// Whether the request may continue upstream.
    pub fn is_allowed(&self) -> bool {
        matches!(self, ThrottleDecision::Allow)
    }
}

/// Strategy-based throttling over a limiter keyed by remedy name.
///
/// # Example
/// ```
/// use gateway_throttle::application::throttle::{StrategyThrottle, ThrottleDecision};
/// use gateway_throttle::domain::strategy::ThrottlingConfig;
/// use gateway_throttle::infrastructure::clock::SystemClock;
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// let throttle = StrategyThrottle::new(Arc::new(SystemClock::new()));
/// let config: ThrottlingConfig = serde_json::from_str(
///     r#"{ "window_size_in_seconds": 3600, "allowed_request_count": 1 }"#,
/// ).unwrap();
///
/// let first = throttle.check("remedy", &config, &HashMap::new()).unwrap();
/// assert_eq!(first, ThrottleDecision::Allow);
/// ```
#[derive(Debug)]
pub struct StrategyThrottle {
    limiter: LimiterIdRateLimiter,
    metrics: Metrics,
}

impl StrategyThrottle {
    /// Create a throttle with fresh metrics.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_metrics(clock, Metrics::new())
    }

    /// Create a throttle recording into `metrics`.
    pub fn with_metrics(clock: Arc<dyn Clock>, metrics: Metrics) -> Self {
        Self {
            limiter: LimiterIdRateLimiter::new(clock),
            metrics,
        }
    }

    /// Count a request for `remedy_name` and decide whether it may pass.
    ///
    /// With group quota allocation configured, the request is counted in its
    /// header group and limited to that group's share of the quota. A group
    /// without an allocation follows the configured default behavior.
    ///
    /// # Errors
    /// Invalid configuration or an empty remedy name.
    pub fn check(
        &self,
        remedy_name: &str,
        config: &ThrottlingConfig,
        headers: &HashMap<String, String>,
    ) -> Result<ThrottleDecision, ThrottleError> {
        let strategy = config.strategy()?;
        let block = ThrottleDecision::Block {
            status_code: config.block_status_code(),
        };

        let mut grouping = Grouping::Ungrouped;
        let mut ratio = 1.0;
        if let Some(allocation) = &config.group_quota_allocation {
            grouping = allocation.grouping(headers);
            match allocation.allocation_ratio(headers) {
                Some(found) => ratio = found,
                None => {
                    tracing::trace!(
                        group = ?grouping.group_id(),
                        behavior = ?allocation.default,
                        "quota allocation not found, using default behavior"
                    );
                    match allocation.default {
                        DefaultGroupBehavior::Allow | DefaultGroupBehavior::Undefined => {
                            return Ok(self.record(ThrottleDecision::Allow));
                        }
                        DefaultGroupBehavior::Block => return Ok(self.record(block)),
                        DefaultGroupBehavior::UseDefaultAllocation => {
                            ratio = allocation.default_allocation_percentage / 100.0;
                        }
                    }
                }
            }
        }

        let args = LimiterArguments::new(remedy_name, grouping);
        let count = self.limiter.increment(&args, strategy.window_size())?;
        let limit = (strategy.window_quota() as f64 * ratio).floor() as i64;

        let decision = if count > limit {
            block
        } else {
            ThrottleDecision::Allow
        };
        tracing::trace!(remedy = remedy_name, count, limit, ?decision, "throttle decision");
        Ok(self.record(decision))
    }

    fn record(&self, decision: ThrottleDecision) -> ThrottleDecision {
        match decision {
            ThrottleDecision::Allow => self.metrics.record_allowed(),
            ThrottleDecision::Block { .. } => self.metrics.record_throttled(),
        }
        decision
    }

    /// Current counters of every remedy and group.
    pub fn counters(&self) -> Vec<CounterSnapshot> {
        self.limiter.counters()
    }

    /// Metrics this throttle records into.
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}
