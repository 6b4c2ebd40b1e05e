//! # gateway-throttle
//!
//! Traffic shaping for an API gateway: windowed quota counting, keyed and
//! grouped limiters, and a delayed priority admission queue.
//!
//! Every decision is made against fixed windows aligned to the Unix epoch.
//! Two counters with the same window size always agree on where a window
//! starts, so throttles chained on one request path stay in phase.
//!
//! ## Quick Start
//!
//! Threshold throttling: count a request and reject it once the window quota
//! is used up.
//!
//! ```rust
//! use gateway_throttle::{Grouping, LimiterArguments, LimiterIdRateLimiter, SystemClock};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let limiter = LimiterIdRateLimiter::new(Arc::new(SystemClock::new()));
//! let args = LimiterArguments::new("checkout", Grouping::grouped("tenant-a"));
//!
//! let count = limiter.increment(&args, Duration::from_secs(60)).unwrap();
//! let quota = 100;
//! if count > quota {
//!     // respond with 429
//! }
//! ```
//!
//! Queueing: admit within quota, otherwise wait for a later window until the
//! TTL runs out.
//!
//! ```rust,no_run
//! use gateway_throttle::{DelayedAdmissionQueue, SystemClock, WindowStrategy};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), gateway_throttle::ThrottleError> {
//! let strategy = WindowStrategy::new(10, Duration::from_secs(1))?;
//! let queue = DelayedAdmissionQueue::new(strategy, Arc::new(SystemClock::new()))?;
//!
//! let request = queue.new_request("req-42", 2.0);
//! let admission = queue.enqueue(request, Duration::from_secs(5), Some(1_000)).await;
//! if !admission.is_admitted() {
//!     // respond with 429
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Components
//!
//! - [`WindowedCounter`]: one epoch-aligned fixed-window counter. It resets
//!   lazily when it is next read or written after its window has ended.
//! - [`GroupedCounterState`]: a default counter plus lazily created counters
//!   per group id.
//! - [`KeyedRateLimiter`]: one grouped state per scope key, either global,
//!   per endpoint ([`EndpointRateLimiter`]) or per limiter id
//!   ([`LimiterIdRateLimiter`]).
//! - [`PriorityHeap`]: waiting requests, lowest priority value first and FIFO
//!   within a priority.
//! - [`DelayedAdmissionQueue`]: window quota plus priority wait queue, with a
//!   background task that admits waiters at every window roll-over.
//! - [`QueueRegistry`] and [`StrategyThrottle`]: remedy-level entry points
//!   driven by serde configuration.
//!
//! ## Admission Outcomes
//!
//! Only configuration and argument mistakes are errors ([`ThrottleError`]).
//! A throttled, expired or dropped request is a regular value:
//!
//! | Outcome | Meaning |
//! |---------|---------|
//! | `Admission::AdmittedImmediately` | the current window had room |
//! | `Admission::AdmittedFromQueue` | admitted at a later window roll-over |
//! | `Admission::Expired` | the TTL ran out first |
//! | `Admission::Dropped` | the queue was already full |
//! | `ThrottleDecision::Block` | the threshold was passed |
//!
//! ## Known Limitations
//!
//! Scope keys, group ids and queues are never evicted. Limiting on a
//! high-cardinality value such as a client IP grows memory without bound.
//!
//! A queued request whose TTL fires stays in the heap until a window
//! roll-over pops it. Popping it is harmless and does not use quota.
//!
//! ## Observability
//!
//! Decisions are logged through `tracing` (`trace` per request, `debug` for
//! lifecycle events). Install any subscriber to see them. Counters for
//! exporters are available through [`Metrics`], `KeyedRateLimiter::counters`
//! and `DelayedAdmissionQueue::counts`.
//!
//! ## Testing
//!
//! Enable the `test-helpers` feature to get
//! [`MockClock`](infrastructure::mocks::MockClock), which drives window
//! roll-over and TTL expiry without real delays.

pub mod error;

// Domain layer - pure traffic-shaping logic
pub mod domain;

// Application layer - orchestration
pub mod application;

// Infrastructure layer - external adapters
pub mod infrastructure;

// Re-export commonly used types for convenience
pub use domain::{
    priority::{PendingRequest, Priority, PriorityHeap},
    scope::{
        EndpointArguments, GroupId, Grouping, LimiterArguments, RequestScope, ScopeArguments,
        ScopeKey,
    },
    strategy::{
        DefaultGroupBehavior, GroupPrioritization, GroupQuotaAllocation, QueueConfig,
        ThrottlingConfig, WindowStrategy,
    },
    window::{current_window, WindowBounds},
};

pub use application::{
    counter::{GroupedCounterState, WindowedCounter},
    limiter::{CounterSnapshot, EndpointRateLimiter, KeyedRateLimiter, LimiterIdRateLimiter},
    metrics::{Metrics, MetricsSnapshot},
    ports::{Clock, Storage},
    queue::{Admission, DelayedAdmissionQueue},
    registry::{QueueCount, QueueKey, QueueRegistry},
    throttle::{StrategyThrottle, ThrottleDecision},
};

pub use error::ThrottleError;

pub use infrastructure::{clock::SystemClock, storage::ShardedStorage};
