//! Mock clock for testing.

use crate::application::ports::{Clock, Sleep};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tokio::sync::oneshot;

/// Real time granted to woken tasks after each timer fires.
const SETTLE: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct MockClockState {
    now: SystemTime,
    next_timer: u64,
    timers: BTreeMap<(SystemTime, u64), oneshot::Sender<()>>,
}

/// Mock clock for testing.
///
/// Time only moves when the test says so. Sleeps register a timer that fires
/// when [`advance`](MockClock::advance) or [`set`](MockClock::set) moves the
/// clock past its deadline, which makes window roll-over and TTL expiry
/// deterministic.
///
/// Due timers fire one at a time in deadline order (registration order on
/// ties). Before each timer fires, "now" is moved to its deadline, and after
/// it fires the clock briefly yields real time so that woken tasks run before
/// the next timer is considered. The same yield happens once before any timer
/// is looked at, so freshly spawned tasks get to register their sleeps.
/// Tests should use a current-thread runtime (the `#[tokio::test]` default).
///
/// # Examples
///
/// ```
/// use gateway_throttle::infrastructure::mocks::MockClock;
/// use gateway_throttle::application::ports::Clock;
/// use std::time::{Duration, UNIX_EPOCH};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let start = UNIX_EPOCH + Duration::from_secs(1_000);
/// let clock = MockClock::new(start);
///
/// let waiter = tokio::spawn(clock.sleep(Duration::from_secs(5)));
/// clock.advance(Duration::from_secs(5)).await;
///
/// assert!(waiter.is_finished());
/// assert_eq!(clock.now(), start + Duration::from_secs(5));
/// # });
/// ```
///
/// # Thread Safety
///
/// `MockClock` can be cloned to share across tasks. All clones share the same
/// time and timer queue.
#[derive(Debug, Clone)]
pub struct MockClock {
    state: Arc<Mutex<MockClockState>>,
}

impl MockClock {
    /// Create a mock clock starting at a specific time.
    pub fn new(start: SystemTime) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockClockState {
                now: start,
                next_timer: 0,
                timers: BTreeMap::new(),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockClockState> {
        self.state
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
    }

    /// Advance the clock by a duration, firing every timer due on the way.
    pub async fn advance(&self, duration: Duration) {
        let target = self.now() + duration;
        self.set(target).await;
    }

    /// Move the clock to `target`, firing every timer due on the way.
    ///
    /// Moving backwards only changes "now"; no timer fires.
    pub async fn set(&self, target: SystemTime) {
        // Spawned tasks register their timers on first poll.
        tokio::time::sleep(SETTLE).await;
        loop {
            let due = {
                let mut state = self.lock();
                let next = state
                    .timers
                    .first_key_value()
                    .map(|(key, _)| *key)
                    .filter(|(deadline, _)| *deadline <= target);
                next.and_then(|key| {
                    state.now = state.now.max(key.0);
                    state.timers.remove(&key)
                })
            };

            match due {
                Some(timer) => {
                    let _ = timer.send(());
                    tokio::time::sleep(SETTLE).await;
                }
                None => break,
            }
        }

        self.lock().now = target;
        tokio::time::sleep(SETTLE).await;
    }

    /// Number of timers that have not fired yet.
    pub fn pending_timers(&self) -> usize {
        self.lock().timers.len()
    }
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        self.lock().now
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        if duration.is_zero() {
            return Box::pin(std::future::ready(()));
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.lock();
            let deadline = state.now + duration;
            let id = state.next_timer;
            state.next_timer += 1;
            state.timers.insert((deadline, id), tx);
        }

        Box::pin(async move {
            // A dropped sender means the clock itself is gone.
            let _ = rx.await;
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::UNIX_EPOCH;

    fn start() -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_000_000)
    }

    #[tokio::test]
    async fn test_mock_clock() {
        let clock = MockClock::new(start());

        assert_eq!(clock.now(), start());

        clock.advance(Duration::from_secs(10)).await;
        assert_eq!(clock.now(), start() + Duration::from_secs(10));

        let new_time = start() + Duration::from_secs(100);
        clock.set(new_time).await;
        assert_eq!(clock.now(), new_time);
        assert_eq!(clock.since(start()), Duration::from_secs(100));
    }

    #[tokio::test]
    async fn test_sleep_waits_for_advance() {
        let clock = MockClock::new(start());
        let sleeper = tokio::spawn(clock.sleep(Duration::from_millis(250)));

        clock.advance(Duration::from_millis(249)).await;
        assert!(!sleeper.is_finished());
        assert_eq!(clock.pending_timers(), 1);

        clock.advance(Duration::from_millis(1)).await;
        assert!(sleeper.is_finished());
        assert_eq!(clock.pending_timers(), 0);
    }

    #[tokio::test]
    async fn test_timers_fire_in_deadline_order_at_their_deadline() {
        let clock = MockClock::new(start());
        let order = Arc::new(Mutex::new(Vec::new()));

        for (label, ms) in [("late", 300u64), ("early", 100), ("middle", 200)] {
            let clock_clone = clock.clone();
            let order = Arc::clone(&order);
            let sleep = clock.sleep(Duration::from_millis(ms));
            tokio::spawn(async move {
                sleep.await;
                let fired_at = clock_clone.since(start());
                order.lock().unwrap().push((label, fired_at));
            });
        }

        clock.advance(Duration::from_secs(1)).await;

        let order = order.lock().unwrap().clone();
        assert_eq!(
            order,
            vec![
                ("early", Duration::from_millis(100)),
                ("middle", Duration::from_millis(200)),
                ("late", Duration::from_millis(300)),
            ]
        );
    }

    #[tokio::test]
    async fn test_timers_registered_while_advancing_also_fire() {
        let clock = MockClock::new(start());
        let ticks = Arc::new(AtomicUsize::new(0));

        let ticker = {
            let clock = clock.clone();
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    clock.sleep(Duration::from_millis(100)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        tokio::task::yield_now().await;

        clock.advance(Duration::from_millis(350)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);

        ticker.abort();
    }

    #[tokio::test]
    async fn test_zero_sleep_is_ready() {
        let clock = MockClock::new(start());
        clock.sleep(Duration::ZERO).await;
        assert_eq!(clock.pending_timers(), 0);
    }
}
