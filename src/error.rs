//! Error type shared by every layer of the crate.
//!
//! Only caller or configuration mistakes are errors. A request that is
//! throttled, expires in a queue, or is dropped because the queue is full
//! is reported as a regular decision value instead.

use thiserror::Error;

/// Errors returned by rate limiters, queues and strategy configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThrottleError {
    /// A limiter-scoped increment was requested without a limiter id.
    #[error("limiter id is required")]
    MissingLimiterId,

    /// Grouping was requested but the group id is empty.
    #[error("group id is required when grouping is requested")]
    MissingGroupId,

    /// An endpoint-scoped increment was requested without method or URL.
    #[error("method and normalized URL are required for endpoint scope")]
    MissingEndpoint,

    /// Windows must have a positive length.
    #[error("window size must be greater than 0")]
    ZeroWindowSize,

    /// Window quotas cannot be negative.
    #[error("window quota must not be negative, got {0}")]
    NegativeQuota(i64),

    /// Allocation percentages must lie within `0..=100`.
    #[error("allocation percentage must be within 0..=100, got {0}")]
    InvalidAllocation(f64),

    /// Admission queues spawn a background task and need a Tokio runtime.
    #[error("admission queue must be created inside a Tokio runtime")]
    NoRuntime,
}

impl ThrottleError {
    /// Whether this error was caused by the caller's arguments or configuration.
    ///
    /// Only `NoRuntime` points at the environment instead of the call site.
    pub fn is_validation(&self) -> bool {
        !matches!(self, ThrottleError::NoRuntime)
    }
}
