//! Locked window counters.
//!
//! [`WindowedCounter`] wraps a [`WindowState`] in a read/write lock and reads
//! the clock on every access. [`GroupedCounterState`] adds lazily created
//! per-group counters next to a default counter.

use crate::application::ports::Clock;
use crate::domain::scope::{GroupId, Grouping};
use crate::domain::window::WindowState;
use crate::error::ThrottleError;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

/// A single epoch-aligned fixed-window counter.
///
/// The counter is reset lazily: a read or write that finds the stored window
/// over zeroes it first. No timer is involved.
#[derive(Debug)]
pub struct WindowedCounter {
    clock: Arc<dyn Clock>,
    state: RwLock<WindowState>,
}

impl WindowedCounter {
    /// Create a counter for windows of `window_size`.
    pub fn new(clock: Arc<dyn Clock>, window_size: Duration) -> Self {
        Self {
            clock,
            state: RwLock::new(WindowState::new(window_size)),
        }
    }

    /// Count one event and return the new count for the current window.
    pub fn increment(&self, window_size: Duration) -> i64 {
        let now = self.clock.now();
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .increment(now, window_size)
    }

    /// Current count, resetting first if the stored window is over.
    ///
    /// Takes the read lock and only promotes to the write lock when a reset
    /// is needed.
    pub fn counter(&self) -> i64 {
        let now = self.clock.now();
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if !state.is_stale(now) {
                return state.count();
            }
        }

        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        // Another writer may have refreshed in between; refresh is idempotent.
        state.refresh(now);
        state.count()
    }

    /// End of the window this counter was last touched in.
    ///
    /// Not refreshed: an idle counter reports its old window end.
    pub fn window_end(&self) -> SystemTime {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .window_end()
    }
}

/// A default counter plus one counter per group id.
///
/// Group counters are created on first use under the write lock, with a
/// second lookup after the lock is taken so concurrent first touches share
/// one counter.
#[derive(Debug)]
pub struct GroupedCounterState {
    clock: Arc<dyn Clock>,
    default_counter: WindowedCounter,
    groups: RwLock<HashMap<GroupId, Arc<WindowedCounter>>>,
}

impl GroupedCounterState {
    /// Create an empty state. `window_size` seeds every counter it creates.
    pub fn new(clock: Arc<dyn Clock>, window_size: Duration) -> Self {
        Self {
            default_counter: WindowedCounter::new(Arc::clone(&clock), window_size),
            clock,
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Count one event for the default counter or a group counter.
    ///
    /// # Errors
    /// `MissingGroupId` if grouping was requested with an empty id.
    pub fn increment(&self, grouping: &Grouping, window_size: Duration) -> Result<i64, ThrottleError> {
        grouping.validate()?;
        match grouping {
            Grouping::Ungrouped => Ok(self.default_counter.increment(window_size)),
            Grouping::Grouped(id) => Ok(self.group_counter(id, window_size).increment(window_size)),
        }
    }

    fn group_counter(&self, id: &GroupId, window_size: Duration) -> Arc<WindowedCounter> {
        {
            let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(counter) = groups.get(id) {
                return Arc::clone(counter);
            }
        }

        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        let counter = groups.entry(id.clone()).or_insert_with(|| {
            tracing::debug!(group = %id, "creating group counter");
            Arc::new(WindowedCounter::new(Arc::clone(&self.clock), window_size))
        });
        Arc::clone(counter)
    }

    /// Current value of every group counter, each refreshed first.
    pub fn counters(&self) -> HashMap<GroupId, i64> {
        let groups: Vec<(GroupId, Arc<WindowedCounter>)> = self
            .groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, counter)| (id.clone(), Arc::clone(counter)))
            .collect();

        groups
            .into_iter()
            .map(|(id, counter)| (id, counter.counter()))
            .collect()
    }

    /// Current value of the default counter.
    pub fn default_counter(&self) -> i64 {
        self.default_counter.counter()
    }

    /// Number of groups seen so far.
    pub fn group_count(&self) -> usize {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
