//! Queue entries and the priority heap that orders them.
//!
//! Smaller priority values are more urgent. Within one priority, requests
//! leave the heap in the order they were enqueued.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::SystemTime;

/// Request priority. Lower values are served first.
///
/// Wraps an `f64` with a total order so it can be used as a map key and
/// compared inside the heap. `-0.0` is normalized to `0.0`.
#[derive(Debug, Clone, Copy)]
pub struct Priority(f64);

impl Priority {
    /// The most urgent priority a configuration hands out by default.
    pub const HIGHEST: Priority = Priority(0.0);

    /// Wrap a raw priority value.
    pub fn new(value: f64) -> Self {
        if value == 0.0 {
            Self(0.0)
        } else {
            Self(value)
        }
    }

    /// The raw priority value.
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::HIGHEST
    }
}

impl From<f64> for Priority {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl PartialEq for Priority {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for Priority {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request waiting for admission.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    /// Request id, used for logging
    pub id: String,
    /// Urgency, lower first
    pub priority: Priority,
    /// When the request arrived at the queue
    pub enqueued_at: SystemTime,
}

impl PendingRequest {
    /// Create a pending request.
    pub fn new(id: impl Into<String>, priority: impl Into<Priority>, enqueued_at: SystemTime) -> Self {
        Self {
            id: id.into(),
            priority: priority.into(),
            enqueued_at,
        }
    }
}

struct HeapEntry<T> {
    request: PendingRequest,
    sequence: u64,
    payload: T,
}

impl<T> HeapEntry<T> {
    fn urgency(&self, other: &Self) -> Ordering {
        self.request
            .priority
            .cmp(&other.request.priority)
            .then_with(|| self.request.enqueued_at.cmp(&other.request.enqueued_at))
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl<T> PartialEq for HeapEntry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.urgency(other) == Ordering::Equal
    }
}

impl<T> Eq for HeapEntry<T> {}

impl<T> PartialOrd for HeapEntry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap, so the most urgent entry must compare greatest.
impl<T> Ord for HeapEntry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.urgency(other).reverse()
    }
}

/// Min-heap of pending requests ordered by priority, then enqueue time.
///
/// Each entry carries a payload (the admission signal in the queue). Entries
/// with identical priority and enqueue time keep their insertion order.
///
/// # Example
/// ```
/// use gateway_throttle::domain::priority::{PendingRequest, PriorityHeap};
/// use std::time::{Duration, UNIX_EPOCH};
///
/// let t = UNIX_EPOCH + Duration::from_secs(1);
/// let mut heap = PriorityHeap::new();
/// heap.push(PendingRequest::new("low", 2.0, t), ());
/// heap.push(PendingRequest::new("high", 1.0, t + Duration::from_millis(5)), ());
///
/// assert_eq!(heap.pop().unwrap().0.id, "high");
/// assert_eq!(heap.pop().unwrap().0.id, "low");
/// assert!(heap.is_empty());
/// ```
pub struct PriorityHeap<T> {
    entries: BinaryHeap<HeapEntry<T>>,
    next_sequence: u64,
}

impl<T> PriorityHeap<T> {
    /// Create an empty heap.
    pub fn new() -> Self {
        Self {
            entries: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    /// Add a request with its payload.
    pub fn push(&mut self, request: PendingRequest, payload: T) {
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.entries.push(HeapEntry {
            request,
            sequence,
            payload,
        });
    }

    /// Remove and return the most urgent request.
    pub fn pop(&mut self) -> Option<(PendingRequest, T)> {
        self.entries
            .pop()
            .map(|entry| (entry.request, entry.payload))
    }

    /// The most urgent request, without removing it.
    pub fn peek(&self) -> Option<&PendingRequest> {
        self.entries.peek().map(|entry| &entry.request)
    }

    /// Number of entries, including ones whose waiter has given up.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the heap is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for PriorityHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for PriorityHeap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityHeap")
            .field("len", &self.entries.len())
            .field("next", &self.peek().map(|r| &r.id))
            .finish()
    }
}
