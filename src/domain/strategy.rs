//! Window strategies and remedy configuration.
//!
//! Configuration structs deserialize with serde from the remedy section of a
//! policy document and convert into a validated [`WindowStrategy`].

use crate::domain::priority::Priority;
use crate::domain::scope::{GroupId, Grouping};
use crate::error::ThrottleError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Status returned to throttled clients unless configured otherwise.
pub const DEFAULT_RESPONSE_STATUS_CODE: u16 = 429;

/// Quota per fixed window.
///
/// Hashable so queues can be keyed by the strategy they enforce: a changed
/// quota or window size yields a fresh queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowStrategy {
    window_quota: i64,
    window_size: Duration,
}

impl WindowStrategy {
    /// Create a validated strategy.
    ///
    /// # Errors
    /// Returns `ZeroWindowSize` or `NegativeQuota` for unusable values.
    ///
    /// # Example
    /// ```
    /// use gateway_throttle::domain::strategy::WindowStrategy;
    /// use std::time::Duration;
    ///
    /// let strategy = WindowStrategy::new(10, Duration::from_secs(1)).unwrap();
    /// assert_eq!(strategy.window_quota(), 10);
    /// assert!(WindowStrategy::new(10, Duration::ZERO).is_err());
    /// ```
    pub fn new(window_quota: i64, window_size: Duration) -> Result<Self, ThrottleError> {
        if window_size.is_zero() {
            return Err(ThrottleError::ZeroWindowSize);
        }
        if window_quota < 0 {
            return Err(ThrottleError::NegativeQuota(window_quota));
        }
        Ok(Self {
            window_quota,
            window_size,
        })
    }

    /// Admissions allowed per window.
    pub fn window_quota(&self) -> i64 {
        self.window_quota
    }

    /// Window length.
    pub fn window_size(&self) -> Duration {
        self.window_size
    }
}

/// Case-insensitive header lookup.
pub fn header_value<'a>(headers: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

/// Header whose value splits traffic into groups.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupBy {
    /// Header name, matched case-insensitively
    pub header_name: String,
}

/// What to do with a request whose group has no configured allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultGroupBehavior {
    /// Pass without counting
    Allow,
    /// Reject without counting
    Block,
    /// Count against `default_allocation_percentage`
    UseDefaultAllocation,
    /// Missing or unknown value, treated like `Allow`
    #[default]
    #[serde(other)]
    Undefined,
}

/// Share of the window quota given to one group.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuotaAllocation {
    /// Header value that selects this group, matched exactly
    pub group_header_value: String,
    /// Share of the window quota, `0..=100`
    pub allocation_percentage: f64,
}

/// Per-group split of a throttling quota.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupQuotaAllocation {
    pub group_by: GroupBy,
    #[serde(default)]
    pub groups: Vec<QuotaAllocation>,
    #[serde(default)]
    pub default: DefaultGroupBehavior,
    #[serde(default)]
    pub default_allocation_percentage: f64,
}

impl GroupQuotaAllocation {
    /// Counter group for a request: `lowercase(header_name):trim(value)`.
    pub fn grouping(&self, headers: &HashMap<String, String>) -> Grouping {
        let name = &self.group_by.header_name;
        let value = header_value(headers, name).unwrap_or_default();
        Grouping::Grouped(GroupId::new(format!(
            "{}:{}",
            name.to_lowercase(),
            value.trim()
        )))
    }

    /// Quota ratio of the group matching the request's header value, if any.
    pub fn allocation_ratio(&self, headers: &HashMap<String, String>) -> Option<f64> {
        let value = header_value(headers, &self.group_by.header_name).unwrap_or_default();
        self.groups
            .iter()
            .find(|allocation| allocation.group_header_value == value)
            .map(|allocation| allocation.allocation_percentage / 100.0)
    }

    /// Reject percentages outside `0..=100`.
    pub fn validate(&self) -> Result<(), ThrottleError> {
        let percentages = self
            .groups
            .iter()
            .map(|allocation| allocation.allocation_percentage)
            .chain(std::iter::once(self.default_allocation_percentage));

        for percentage in percentages {
            if !(0.0..=100.0).contains(&percentage) {
                return Err(ThrottleError::InvalidAllocation(percentage));
            }
        }
        Ok(())
    }
}

/// Threshold-style throttling remedy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ThrottlingConfig {
    pub window_size_in_seconds: u64,
    pub allowed_request_count: i64,
    #[serde(default)]
    pub group_quota_allocation: Option<GroupQuotaAllocation>,
    #[serde(default = "default_status_code")]
    pub response_status_code: u16,
}

impl ThrottlingConfig {
    /// Status code for blocked requests. Zero means unset.
    pub fn block_status_code(&self) -> u16 {
        match self.response_status_code {
            0 => DEFAULT_RESPONSE_STATUS_CODE,
            code => code,
        }
    }

    /// Validated window strategy for this remedy.
    pub fn strategy(&self) -> Result<WindowStrategy, ThrottleError> {
        if let Some(allocation) = &self.group_quota_allocation {
            allocation.validate()?;
        }
        WindowStrategy::new(
            self.allowed_request_count,
            Duration::from_secs(self.window_size_in_seconds),
        )
    }
}

/// Configured priority of one group.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Prioritization {
    /// Queue priority, lower is served first
    pub priority: f64,
}

/// Mapping from group-by header value to queue priority.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GroupPrioritization {
    pub group_by: GroupBy,
    #[serde(default)]
    pub groups: HashMap<String, Prioritization>,
}

/// Delay-then-admit queueing remedy.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueueConfig {
    pub window_size_in_seconds: u64,
    pub allowed_request_count: i64,
    pub ttl_seconds: f64,
    #[serde(default)]
    pub queue_size: Option<usize>,
    #[serde(default)]
    pub prioritization: Option<GroupPrioritization>,
    #[serde(default = "default_status_code")]
    pub response_status_code: u16,
}

impl QueueConfig {
    /// Validated window strategy for this remedy.
    pub fn strategy(&self) -> Result<WindowStrategy, ThrottleError> {
        WindowStrategy::new(
            self.allowed_request_count,
            Duration::from_secs(self.window_size_in_seconds),
        )
    }

    /// Maximum time a request may wait. Negative or non-finite values mean no wait.
    pub fn ttl(&self) -> Duration {
        Duration::try_from_secs_f64(self.ttl_seconds).unwrap_or(Duration::ZERO)
    }

    /// Priority of a request. Unknown groups and unconfigured
    /// prioritization get the most urgent priority.
    pub fn priority(&self, headers: &HashMap<String, String>) -> Priority {
        let Some(prioritization) = &self.prioritization else {
            return Priority::HIGHEST;
        };
        let value = header_value(headers, &prioritization.group_by.header_name).unwrap_or_default();
        prioritization
            .groups
            .get(value)
            .map(|group| Priority::new(group.priority))
            .unwrap_or(Priority::HIGHEST)
    }
}

fn default_status_code() -> u16 {
    DEFAULT_RESPONSE_STATUS_CODE
}
