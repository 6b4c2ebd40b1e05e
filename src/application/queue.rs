//! Delayed priority admission.
//!
//! A [`DelayedAdmissionQueue`] admits up to the window quota per epoch-aligned
//! window. Requests over quota wait in a priority heap until a later window
//! has room or their TTL runs out, whichever comes first.
//!
//! A background task owned by the queue sleeps until each window ends, then
//! admits the most urgent waiting requests into the new window. Unlike
//! [`WindowedCounter`](crate::application::counter::WindowedCounter), the
//! queue cannot reset lazily: waiting callers must be woken even when no new
//! request arrives.

use crate::application::metrics::Metrics;
use crate::application::ports::Clock;
use crate::domain::priority::{PendingRequest, Priority, PriorityHeap};
use crate::domain::strategy::WindowStrategy;
use crate::domain::window::current_window;
use crate::error::ThrottleError;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Outcome of [`DelayedAdmissionQueue::enqueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Admission {
    /// The current window had room
    AdmittedImmediately,
    /// Admitted at a later window roll-over
    AdmittedFromQueue,
    /// The TTL ran out before a window had room
    Expired,
    /// The queue was full (or shut down) when the request arrived
    Dropped,
}

impl Admission {
    /// Whether the request may proceed.
    pub fn is_admitted(&self) -> bool {
        matches!(
            self,
            Admission::AdmittedImmediately | Admission::AdmittedFromQueue
        )
    }
}

#[derive(Debug)]
struct QueueState {
    window_counter: i64,
    window_end: SystemTime,
    heap: PriorityHeap<oneshot::Sender<()>>,
    pending: HashMap<Priority, i64>,
    shut_down: bool,
}

impl QueueState {
    // Resets at the exact boundary: the background task wakes at the old
    // window end and must see a fresh window there.
    fn roll_window(&mut self, now: SystemTime, window_size: Duration) {
        let end = current_window(now, window_size).end;
        if end > self.window_end {
            self.window_counter = 0;
            self.window_end = end;
        }
    }

    fn pending_total(&self) -> i64 {
        self.pending.values().sum()
    }
}

#[derive(Debug)]
struct QueueShared {
    strategy: WindowStrategy,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
    state: Mutex<QueueState>,
}

impl QueueShared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_for_window_end(&self) -> Duration {
        let window_end = self.lock().window_end;
        self.clock.until(window_end)
    }

    /// Open the next window and signal the most urgent waiters into it.
    fn admit_waiting(&self) {
        let now = self.clock.now();
        let quota = self.strategy.window_quota();
        let mut state = self.lock();
        state.roll_window(now, self.strategy.window_size());

        while state.window_counter < quota {
            let Some((request, signal)) = state.heap.pop() else {
                break;
            };
            // A waiter whose TTL already fired has dropped its receiver.
            if signal.send(()).is_ok() {
                state.window_counter += 1;
                tracing::trace!(
                    request_id = %request.id,
                    priority = %request.priority,
                    window_counter = state.window_counter,
                    window_quota = quota,
                    "signalled queued request"
                );
            } else {
                tracing::trace!(
                    request_id = %request.id,
                    "discarded expired queue entry"
                );
            }
        }
    }

    fn release_pending(&self, priority: Priority) {
        let mut state = self.lock();
        if let Some(count) = state.pending.get_mut(&priority) {
            *count -= 1;
        }
    }
}

// Decrements the pending count when the waiting future finishes or is dropped.
struct PendingGuard<'a> {
    shared: &'a QueueShared,
    priority: Priority,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.release_pending(self.priority);
    }
}

async fn run_window_process(shared: Arc<QueueShared>) {
    loop {
        let wait = shared.wait_for_window_end();
        shared.clock.sleep(wait).await;
        shared.admit_waiting();
    }
}

/// Window-quota admission with a priority wait queue.
///
/// Requests within quota are admitted immediately. The rest wait, most
/// urgent (lowest priority value) first and FIFO within a priority, until a
/// window roll-over admits them or their TTL expires.
///
/// The queue owns a background Tokio task that is aborted when the queue is
/// dropped or [`shutdown`](Self::shutdown) is called.
///
/// # Example
/// ```
/// use gateway_throttle::application::queue::{Admission, DelayedAdmissionQueue};
/// use gateway_throttle::domain::strategy::WindowStrategy;
/// use gateway_throttle::infrastructure::clock::SystemClock;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let strategy = WindowStrategy::new(100, Duration::from_secs(60)).unwrap();
/// let queue = DelayedAdmissionQueue::new(strategy, Arc::new(SystemClock::new())).unwrap();
///
/// let request = queue.new_request("req-1", 0.0);
/// let admission = queue.enqueue(request, Duration::from_secs(5), None).await;
/// assert_eq!(admission, Admission::AdmittedImmediately);
/// # });
/// ```
pub struct DelayedAdmissionQueue {
    shared: Arc<QueueShared>,
    process: JoinHandle<()>,
}

impl DelayedAdmissionQueue {
    /// Create a queue and start its window process.
    ///
    /// # Errors
    /// `NoRuntime` when called outside a Tokio runtime.
    pub fn new(strategy: WindowStrategy, clock: Arc<dyn Clock>) -> Result<Self, ThrottleError> {
        Self::with_metrics(strategy, clock, Metrics::new())
    }

    /// Create a queue that records admissions into shared metrics.
    ///
    /// # Errors
    /// `NoRuntime` when called outside a Tokio runtime.
    pub fn with_metrics(
        strategy: WindowStrategy,
        clock: Arc<dyn Clock>,
        metrics: Metrics,
    ) -> Result<Self, ThrottleError> {
        let handle = Handle::try_current().map_err(|_| ThrottleError::NoRuntime)?;

        let mut state = QueueState {
            window_counter: 0,
            window_end: UNIX_EPOCH,
            heap: PriorityHeap::new(),
            pending: HashMap::new(),
            shut_down: false,
        };
        state.roll_window(clock.now(), strategy.window_size());

        let shared = Arc::new(QueueShared {
            strategy,
            clock,
            metrics,
            state: Mutex::new(state),
        });
        let process = handle.spawn(run_window_process(Arc::clone(&shared)));

        tracing::debug!(
            window_quota = strategy.window_quota(),
            window_size_ms = strategy.window_size().as_millis() as u64,
            "admission queue created"
        );
        Ok(Self { shared, process })
    }

    /// Build a request stamped with this queue's clock.
    pub fn new_request(&self, id: impl Into<String>, priority: impl Into<Priority>) -> PendingRequest {
        PendingRequest::new(id, priority, self.shared.clock.now())
    }

    /// Admit `request` now, or wait for a later window for at most `ttl`.
    ///
    /// # Arguments
    /// * `request` - The request; its priority orders it among waiters
    /// * `ttl` - Longest time the request may wait
    /// * `max_queue_size` - Drop instead of waiting when this many requests
    ///   are already waiting
    ///
    /// # Returns
    /// The admission outcome. Expiry and drops are outcomes, not errors.
    pub async fn enqueue(
        &self,
        request: PendingRequest,
        ttl: Duration,
        max_queue_size: Option<usize>,
    ) -> Admission {
        let shared = &*self.shared;
        let quota = shared.strategy.window_quota();
        let priority = request.priority;

        let mut receiver = {
            let mut state = shared.lock();
            state.roll_window(shared.clock.now(), shared.strategy.window_size());

            if state.window_counter < quota {
                state.window_counter += 1;
                shared.metrics.record_admitted_immediately();
                tracing::trace!(
                    request_id = %request.id,
                    priority = %priority,
                    window_counter = state.window_counter,
                    window_quota = quota,
                    "admitted immediately"
                );
                return Admission::AdmittedImmediately;
            }

            let limit = max_queue_size.map(|max| i64::try_from(max).unwrap_or(i64::MAX));
            if state.shut_down || limit.is_some_and(|max| state.pending_total() >= max) {
                shared.metrics.record_dropped();
                tracing::trace!(
                    request_id = %request.id,
                    pending = state.pending_total(),
                    "queue full, dropping request"
                );
                return Admission::Dropped;
            }

            let (signal, receiver) = oneshot::channel();
            *state.pending.entry(priority).or_insert(0) += 1;
            tracing::trace!(
                request_id = %request.id,
                priority = %priority,
                ttl_ms = ttl.as_millis() as u64,
                "request queued"
            );
            state.heap.push(request.clone(), signal);
            receiver
        };

        let _pending = PendingGuard { shared, priority };

        let admission = tokio::select! {
            biased;
            signalled = &mut receiver => match signalled {
                Ok(()) => Admission::AdmittedFromQueue,
                Err(_) => {
                    tracing::warn!(request_id = %request.id, "queue shut down while request waited");
                    Admission::Expired
                }
            },
            _ = shared.clock.sleep(ttl) => {
                // The window process may have signalled between the timer firing and now.
                receiver.close();
                if receiver.try_recv().is_ok() {
                    Admission::AdmittedFromQueue
                } else {
                    Admission::Expired
                }
            }
        };

        match admission {
            Admission::AdmittedFromQueue => shared.metrics.record_admitted_from_queue(),
            _ => shared.metrics.record_expired(),
        }
        tracing::trace!(
            request_id = %request.id,
            priority = %priority,
            waited_ms = shared.clock.since(request.enqueued_at).as_millis() as u64,
            outcome = ?admission,
            "left queue"
        );
        admission
    }

    /// Number of waiting requests per priority.
    pub fn counts(&self) -> HashMap<Priority, i64> {
        self.shared.lock().pending.clone()
    }

    /// Total number of waiting requests.
    pub fn pending(&self) -> i64 {
        self.shared.lock().pending_total()
    }

    /// Time left in the queue's current window.
    pub fn time_till_window_end(&self) -> Duration {
        self.shared.wait_for_window_end()
    }

    /// The strategy this queue enforces.
    pub fn strategy(&self) -> WindowStrategy {
        self.shared.strategy
    }

    /// Metrics this queue records into.
    pub fn metrics(&self) -> &Metrics {
        &self.shared.metrics
    }

    /// Whether the window process is still running.
    pub fn is_running(&self) -> bool {
        !self.process.is_finished()
    }

    /// Stop the window process and release every waiting request.
    ///
    /// Waiters return `Expired`. Later requests are still admitted while the
    /// current window has room and dropped otherwise.
    pub fn shutdown(&self) {
        self.process.abort();
        let drained = {
            let mut state = self.shared.lock();
            state.shut_down = true;
            std::mem::take(&mut state.heap)
        };
        tracing::debug!(released = drained.len(), "admission queue shut down");
    }
}

impl Drop for DelayedAdmissionQueue {
    fn drop(&mut self) {
        self.process.abort();
    }
}

impl fmt::Debug for DelayedAdmissionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedAdmissionQueue")
            .field("strategy", &self.shared.strategy)
            .field("pending", &self.pending())
            .field("running", &self.is_running())
            .finish()
    }
}
