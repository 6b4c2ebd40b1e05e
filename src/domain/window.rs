//! Epoch-aligned fixed windows.
//!
//! Every window of a given size starts at a multiple of that size measured
//! from the Unix epoch. Two counters with the same window size therefore
//! always agree on where the current window begins and ends, no matter when
//! each of them was created or first touched.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Start and end of the window containing some instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowBounds {
    /// Inclusive start of the window
    pub start: SystemTime,
    /// Exclusive end of the window
    pub end: SystemTime,
}

/// Compute the epoch-grid window of `window_size` that contains `now`.
///
/// Instants before the epoch are treated as the epoch itself. A zero window
/// size yields an empty window at `now`.
///
/// # Example
/// ```
/// use gateway_throttle::domain::window::current_window;
/// use std::time::{Duration, UNIX_EPOCH};
///
/// let now = UNIX_EPOCH + Duration::from_millis(1_730);
/// let window = current_window(now, Duration::from_millis(500));
///
/// assert_eq!(window.start, UNIX_EPOCH + Duration::from_millis(1_500));
/// assert_eq!(window.end, UNIX_EPOCH + Duration::from_millis(2_000));
/// ```
pub fn current_window(now: SystemTime, window_size: Duration) -> WindowBounds {
    if window_size.is_zero() {
        return WindowBounds {
            start: now,
            end: now,
        };
    }

    let elapsed = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let into_window = elapsed.as_nanos() % window_size.as_nanos();
    let start = UNIX_EPOCH + (elapsed - duration_from_nanos(into_window));

    WindowBounds {
        start,
        end: start + window_size,
    }
}

fn duration_from_nanos(nanos: u128) -> Duration {
    let secs = (nanos / NANOS_PER_SEC) as u64;
    let subsec = (nanos % NANOS_PER_SEC) as u32;
    Duration::new(secs, subsec)
}

/// Counter state for one fixed window.
///
/// The state never resets on its own. Each read or write first checks whether
/// `now` has moved past the stored window end and, if so, zeroes the counter
/// and moves the end to the grid window containing `now`. An idle counter
/// keeps reporting its old window end until it is touched again.
#[derive(Debug, Clone)]
pub struct WindowState {
    window_size: Duration,
    window_end: SystemTime,
    counter: i64,
}

impl WindowState {
    /// Create an empty state. The first touch opens the current window.
    pub fn new(window_size: Duration) -> Self {
        Self {
            window_size,
            window_end: UNIX_EPOCH,
            counter: 0,
        }
    }

    /// Whether `now` lies past the stored window end.
    pub fn is_stale(&self, now: SystemTime) -> bool {
        !self.window_size.is_zero() && now > self.window_end
    }

    /// Reset the counter if the stored window has ended.
    pub fn refresh(&mut self, now: SystemTime) {
        if self.is_stale(now) {
            self.counter = 0;
            self.window_end = current_window(now, self.window_size).end;
        }
    }

    /// Count one more event in the window containing `now`.
    ///
    /// The window size may change between calls; the new size applies from
    /// the next window onwards.
    pub fn increment(&mut self, now: SystemTime, window_size: Duration) -> i64 {
        self.window_size = window_size;
        self.refresh(now);
        self.counter += 1;
        self.counter
    }

    /// Current count without any reset check.
    pub fn count(&self) -> i64 {
        self.counter
    }

    /// Stored end of the last window this state was touched in.
    pub fn window_end(&self) -> SystemTime {
        self.window_end
    }

    /// Window size used by the last increment.
    pub fn window_size(&self) -> Duration {
        self.window_size
    }
}
