//! Keyed rate limiting.
//!
//! A [`KeyedRateLimiter`] maps each scope key to its own
//! [`GroupedCounterState`]. The limiter is generic over the argument shape,
//! so the endpoint-scoped and limiter-id-scoped variants share one
//! implementation and differ only in how arguments turn into a key.

use crate::application::counter::GroupedCounterState;
use crate::application::ports::{Clock, Storage};
use crate::domain::scope::{
    EndpointArguments, GroupId, LimiterArguments, ScopeArguments, ScopeKey,
};
use crate::error::ThrottleError;
use crate::infrastructure::storage::ShardedStorage;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Default storage: one grouped state per scope key in a sharded map.
pub type ScopeStorage = ShardedStorage<ScopeKey, Arc<GroupedCounterState>>;

/// Limiter keyed by global scope or by method and normalized URL.
pub type EndpointRateLimiter<S = ScopeStorage> = KeyedRateLimiter<EndpointArguments, S>;

/// Limiter keyed by an arbitrary limiter id.
pub type LimiterIdRateLimiter<S = ScopeStorage> = KeyedRateLimiter<LimiterArguments, S>;

/// One counter value in a limiter snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Scope the counter belongs to
    pub scope: ScopeKey,
    /// Group inside the scope, `None` for the default counter
    pub group: Option<GroupId>,
    /// Count in the current window
    pub count: i64,
}

/// Fixed-window counting isolated per scope key.
///
/// States for different keys never share counters. The state for a key is
/// created on first touch, atomically with respect to concurrent first
/// touches.
///
/// # Example
/// ```
/// use gateway_throttle::application::limiter::LimiterIdRateLimiter;
/// use gateway_throttle::domain::scope::{Grouping, LimiterArguments};
/// use gateway_throttle::infrastructure::clock::SystemClock;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let limiter = LimiterIdRateLimiter::new(Arc::new(SystemClock::new()));
/// let args = LimiterArguments::new("checkout", Grouping::Ungrouped);
///
/// let count = limiter.increment(&args, Duration::from_secs(60)).unwrap();
/// assert!(count >= 1);
/// ```
pub struct KeyedRateLimiter<A, S = ScopeStorage>
where
    S: Storage<ScopeKey, Arc<GroupedCounterState>>,
{
    storage: S,
    clock: Arc<dyn Clock>,
    _arguments: PhantomData<fn(&A)>,
}

impl<A: ScopeArguments> KeyedRateLimiter<A, ScopeStorage> {
    /// Create a limiter with its own sharded storage.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_storage(clock, ShardedStorage::new())
    }
}

impl<A, S> KeyedRateLimiter<A, S>
where
    A: ScopeArguments,
    S: Storage<ScopeKey, Arc<GroupedCounterState>>,
{
    /// Create a limiter over caller-provided storage.
    pub fn with_storage(clock: Arc<dyn Clock>, storage: S) -> Self {
        Self {
            storage,
            clock,
            _arguments: PhantomData,
        }
    }

    /// Count one request for the scope and group described by `args`.
    ///
    /// # Arguments
    /// * `args` - Scope and grouping of the request
    /// * `window_size` - Length of the fixed window
    ///
    /// # Returns
    /// The count in the current window, including this request.
    ///
    /// # Errors
    /// Validation errors for missing ids or a zero window size.
    pub fn increment(&self, args: &A, window_size: Duration) -> Result<i64, ThrottleError> {
        let key = args.scope_key()?;
        if window_size.is_zero() {
            return Err(ThrottleError::ZeroWindowSize);
        }

        let state = self.state_for(&key, window_size);
        let count = state.increment(args.grouping(), window_size)?;

        tracing::trace!(
            scope = %key,
            group = ?args.grouping().group_id(),
            count,
            "rate limit counter"
        );
        Ok(count)
    }

    fn state_for(&self, key: &ScopeKey, window_size: Duration) -> Arc<GroupedCounterState> {
        let clock = &self.clock;
        self.storage.with_entry_mut(
            key.clone(),
            || {
                tracing::debug!(scope = %key, "creating scope state");
                Arc::new(GroupedCounterState::new(Arc::clone(clock), window_size))
            },
            |state| Arc::clone(state),
        )
    }

    /// Snapshot of every counter, default counters included.
    ///
    /// Each value is refreshed through the window reset rule before it is read.
    pub fn counters(&self) -> Vec<CounterSnapshot> {
        let mut states = Vec::with_capacity(self.storage.len());
        self.storage
            .for_each(|key, state| states.push((key.clone(), Arc::clone(state))));

        let mut snapshot = Vec::new();
        for (scope, state) in states {
            snapshot.push(CounterSnapshot {
                scope: scope.clone(),
                group: None,
                count: state.default_counter(),
            });
            snapshot.extend(state.counters().into_iter().map(|(group, count)| {
                CounterSnapshot {
                    scope: scope.clone(),
                    group: Some(group),
                    count,
                }
            }));
        }
        snapshot
    }

    /// Number of scope keys seen so far.
    pub fn scope_count(&self) -> usize {
        self.storage.len()
    }
}

impl<A, S> fmt::Debug for KeyedRateLimiter<A, S>
where
    S: Storage<ScopeKey, Arc<GroupedCounterState>>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedRateLimiter")
            .field("scopes", &self.storage.len())
            .field("clock", &self.clock)
            .finish()
    }
}
