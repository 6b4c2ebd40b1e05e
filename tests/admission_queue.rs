use gateway_throttle::infrastructure::mocks::MockClock;
use gateway_throttle::{
    Admission, Clock, DelayedAdmissionQueue, Priority, SystemClock, WindowStrategy,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

const WINDOW: Duration = Duration::from_millis(250);
const TICK: Duration = Duration::from_millis(1);

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn start() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_000_000)
}

fn mock_queue(quota: i64, clock: &MockClock) -> Arc<DelayedAdmissionQueue> {
    let strategy = WindowStrategy::new(quota, WINDOW).unwrap();
    Arc::new(DelayedAdmissionQueue::new(strategy, Arc::new(clock.clone())).unwrap())
}

type Log = Arc<Mutex<Vec<(&'static str, Admission, Duration)>>>;

/// Enqueue `id` on a spawned task that records its outcome and wait time.
fn spawn_request(
    queue: &Arc<DelayedAdmissionQueue>,
    clock: &MockClock,
    log: &Log,
    id: &'static str,
    priority: f64,
    ttl: Duration,
) -> JoinHandle<Admission> {
    let queue = Arc::clone(queue);
    let clock = clock.clone();
    let log = Arc::clone(log);
    tokio::spawn(async move {
        let request = queue.new_request(id, priority);
        let admission = queue.enqueue(request, ttl, None).await;
        log.lock().unwrap().push((id, admission, clock.since(start())));
        admission
    })
}

#[tokio::test]
async fn test_requests_are_admitted_one_per_window() {
    init_tracing();
    let clock = MockClock::new(start());
    let queue = mock_queue(1, &clock);
    let log: Log = Arc::default();
    let ttl = Duration::from_secs(1);

    let a = spawn_request(&queue, &clock, &log, "A", 0.0, ttl);
    clock.advance(TICK).await;
    let b = spawn_request(&queue, &clock, &log, "B", 0.0, ttl);
    clock.advance(TICK).await;
    let c = spawn_request(&queue, &clock, &log, "C", 0.0, ttl);
    clock.advance(TICK).await;

    assert_eq!(a.await.unwrap(), Admission::AdmittedImmediately);
    assert_eq!(queue.pending(), 2);

    clock.set(start() + WINDOW).await;
    assert_eq!(b.await.unwrap(), Admission::AdmittedFromQueue);
    assert_eq!(queue.pending(), 1);

    clock.set(start() + 2 * WINDOW).await;
    assert_eq!(c.await.unwrap(), Admission::AdmittedFromQueue);

    let log = log.lock().unwrap().clone();
    assert_eq!(
        log,
        vec![
            ("A", Admission::AdmittedImmediately, Duration::ZERO),
            ("B", Admission::AdmittedFromQueue, WINDOW),
            ("C", Admission::AdmittedFromQueue, 2 * WINDOW),
        ]
    );

    let metrics = queue.metrics().snapshot();
    assert_eq!(metrics.admitted_immediately, 1);
    assert_eq!(metrics.admitted_from_queue, 2);
    assert_eq!(queue.pending(), 0);
}

#[tokio::test]
async fn test_ttl_expires_before_second_window() {
    let clock = MockClock::new(start());
    let queue = mock_queue(1, &clock);
    let log: Log = Arc::default();

    let a = spawn_request(&queue, &clock, &log, "A", 0.0, WINDOW);
    clock.advance(TICK).await;
    let b = spawn_request(&queue, &clock, &log, "B", 0.0, WINDOW);
    clock.advance(TICK).await;
    let c = spawn_request(&queue, &clock, &log, "C", 0.0, WINDOW);
    clock.advance(TICK).await;

    clock.set(start() + 2 * WINDOW).await;

    assert_eq!(a.await.unwrap(), Admission::AdmittedImmediately);
    assert_eq!(b.await.unwrap(), Admission::AdmittedFromQueue);
    assert_eq!(c.await.unwrap(), Admission::Expired);

    // C waited exactly its TTL, counted from its enqueue at 2ms.
    let log = log.lock().unwrap().clone();
    assert_eq!(log[2], ("C", Admission::Expired, WINDOW + 2 * TICK));
    assert_eq!(queue.metrics().requests_expired(), 1);
}

#[tokio::test]
async fn test_expired_entry_does_not_use_quota() {
    let clock = MockClock::new(start());
    let queue = mock_queue(1, &clock);
    let log: Log = Arc::default();

    // Fill the first window, then queue a request that expires within it.
    let filler = queue.new_request("filler", 0.0);
    assert_eq!(
        queue.enqueue(filler, WINDOW, None).await,
        Admission::AdmittedImmediately
    );
    let short = spawn_request(&queue, &clock, &log, "short", 0.0, Duration::from_millis(10));
    clock.advance(Duration::from_millis(20)).await;
    assert_eq!(short.await.unwrap(), Admission::Expired);

    // The expired entry is still in the heap ahead of this one.
    let patient = spawn_request(&queue, &clock, &log, "patient", 0.0, Duration::from_secs(1));
    clock.advance(TICK).await;

    clock.set(start() + WINDOW).await;
    assert_eq!(patient.await.unwrap(), Admission::AdmittedFromQueue);
}

#[tokio::test]
async fn test_same_priority_is_admitted_in_arrival_order() {
    let clock = MockClock::new(start());
    let queue = mock_queue(1, &clock);
    let log: Log = Arc::default();
    let ttl = Duration::from_secs(5);

    let filler = queue.new_request("filler", 3.0);
    assert!(queue.enqueue(filler, ttl, None).await.is_admitted());

    let first = spawn_request(&queue, &clock, &log, "first", 3.0, ttl);
    clock.advance(TICK).await;
    let second = spawn_request(&queue, &clock, &log, "second", 3.0, ttl);
    clock.advance(TICK).await;

    clock.set(start() + 2 * WINDOW).await;
    assert!(first.await.unwrap().is_admitted());
    assert!(second.await.unwrap().is_admitted());

    let order: Vec<_> = log.lock().unwrap().iter().map(|(id, _, at)| (*id, *at)).collect();
    assert_eq!(order, vec![("first", WINDOW), ("second", 2 * WINDOW)]);
}

#[tokio::test]
async fn test_lower_priority_value_overtakes_earlier_request() {
    let clock = MockClock::new(start());
    let queue = mock_queue(1, &clock);
    let log: Log = Arc::default();
    let ttl = Duration::from_secs(5);

    let filler = queue.new_request("filler", 0.0);
    assert!(queue.enqueue(filler, ttl, None).await.is_admitted());

    let background = spawn_request(&queue, &clock, &log, "background", 2.0, ttl);
    clock.advance(TICK).await;
    let urgent = spawn_request(&queue, &clock, &log, "urgent", 1.0, ttl);
    clock.advance(TICK).await;

    clock.set(start() + 2 * WINDOW).await;
    assert!(background.await.unwrap().is_admitted());
    assert!(urgent.await.unwrap().is_admitted());

    let order: Vec<_> = log.lock().unwrap().iter().map(|(id, _, at)| (*id, *at)).collect();
    assert_eq!(order, vec![("urgent", WINDOW), ("background", 2 * WINDOW)]);
}

#[tokio::test]
async fn test_quota_admits_several_waiters_per_window() {
    let clock = MockClock::new(start());
    let queue = mock_queue(2, &clock);
    let log: Log = Arc::default();
    let ttl = Duration::from_secs(5);

    let mut waiters = Vec::new();
    for id in ["a", "b", "c", "d", "e"] {
        waiters.push(spawn_request(&queue, &clock, &log, id, 0.0, ttl));
        clock.advance(TICK).await;
    }
    assert_eq!(queue.pending(), 3);

    clock.set(start() + 2 * WINDOW).await;
    for waiter in waiters {
        assert!(waiter.await.unwrap().is_admitted());
    }

    let log = log.lock().unwrap().clone();
    let at = |id: &str| log.iter().find(|(entry, _, _)| *entry == id).unwrap().2;
    assert!(at("a") < WINDOW && at("b") < WINDOW);
    assert_eq!((at("c"), at("d")), (WINDOW, WINDOW));
    assert_eq!(at("e"), 2 * WINDOW);
}

#[tokio::test]
async fn test_counts_are_stable_between_calls() {
    let clock = MockClock::new(start());
    let queue = mock_queue(0, &clock);
    let log: Log = Arc::default();

    let waiters: Vec<_> = [("x", 1.0), ("y", 1.0), ("z", 5.0)]
        .into_iter()
        .map(|(id, priority)| spawn_request(&queue, &clock, &log, id, priority, WINDOW))
        .collect();
    clock.advance(TICK).await;

    let first = queue.counts();
    let second = queue.counts();
    assert_eq!(first, second);
    assert_eq!(first.get(&Priority::new(1.0)), Some(&2));
    assert_eq!(first.get(&Priority::new(5.0)), Some(&1));

    clock.advance(WINDOW).await;
    for waiter in waiters {
        assert_eq!(waiter.await.unwrap(), Admission::Expired);
    }
    assert!(queue.counts().values().all(|count| *count == 0));
}

#[tokio::test]
async fn test_max_queue_size_drops_overflow() {
    let clock = MockClock::new(start());
    let queue = mock_queue(0, &clock);

    let mut waiters = Vec::new();
    for id in ["one", "two"] {
        let queue = Arc::clone(&queue);
        waiters.push(tokio::spawn(async move {
            let request = queue.new_request(id, 0.0);
            queue.enqueue(request, WINDOW, Some(2)).await
        }));
    }
    clock.advance(TICK).await;
    assert_eq!(queue.pending(), 2);

    let overflow = queue.new_request("three", 0.0);
    assert_eq!(
        queue.enqueue(overflow, WINDOW, Some(2)).await,
        Admission::Dropped
    );

    // Without a limit the same request waits.
    let unbounded = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            let request = queue.new_request("four", 0.0);
            queue.enqueue(request, WINDOW, None).await
        })
    };
    clock.advance(TICK).await;
    assert_eq!(queue.pending(), 3);

    clock.advance(WINDOW).await;
    for waiter in waiters {
        assert_eq!(waiter.await.unwrap(), Admission::Expired);
    }
    assert_eq!(unbounded.await.unwrap(), Admission::Expired);
    assert_eq!(queue.metrics().requests_dropped(), 1);
}

#[tokio::test]
async fn test_dropping_queue_stops_window_process() {
    let clock = MockClock::new(start());
    let queue = mock_queue(1, &clock);
    clock.advance(TICK).await;
    assert_eq!(clock.pending_timers(), 1);

    drop(queue);
    clock.advance(TICK).await;

    // An aborted process does not arm another timer after this one fires.
    clock.advance(WINDOW).await;
    assert_eq!(clock.pending_timers(), 0);
}

#[tokio::test]
async fn test_real_clock_admits_across_windows() {
    let queue = Arc::new(
        DelayedAdmissionQueue::new(
            WindowStrategy::new(1, WINDOW).unwrap(),
            Arc::new(SystemClock::new()),
        )
        .unwrap(),
    );
    let started = tokio::time::Instant::now();

    let mut requests = Vec::new();
    for id in ["A", "B", "C"] {
        let queue = Arc::clone(&queue);
        requests.push(tokio::spawn(async move {
            let request = queue.new_request(id, 0.0);
            queue.enqueue(request, Duration::from_secs(2), None).await
        }));
        tokio::time::sleep(TICK).await;
    }

    let mut outcomes = Vec::new();
    for request in requests {
        outcomes.push(request.await.unwrap());
    }

    assert!(outcomes.iter().all(Admission::is_admitted));
    assert_eq!(outcomes[0], Admission::AdmittedImmediately);
    assert_eq!(queue.metrics().snapshot().total_admitted(), 3);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(queue.is_running());
}

#[tokio::test]
async fn test_time_till_window_end_follows_clock() {
    let clock = MockClock::new(start());
    let queue = mock_queue(1, &clock);
    let now = clock.now();

    assert_eq!(queue.time_till_window_end(), WINDOW);
    clock.set(now + Duration::from_millis(100)).await;
    assert_eq!(queue.time_till_window_end(), Duration::from_millis(150));
}
