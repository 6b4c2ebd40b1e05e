use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use gateway_throttle::{
    current_window, Grouping, LimiterArguments, LimiterIdRateLimiter, PendingRequest,
    PriorityHeap, StrategyThrottle, SystemClock, ThrottlingConfig,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const WINDOW: Duration = Duration::from_secs(60);

/// Benchmark epoch-grid window computation
fn bench_window_math(c: &mut Criterion) {
    let mut group = c.benchmark_group("window_math");
    let now = SystemTime::now();

    for window_ms in [250u64, 60_000].iter() {
        group.bench_with_input(
            BenchmarkId::new("current_window", window_ms),
            window_ms,
            |b, &window_ms| {
                let window = Duration::from_millis(window_ms);
                b.iter(|| current_window(black_box(now), black_box(window)))
            },
        );
    }

    group.finish();
}

/// Benchmark single-threaded increment throughput
fn bench_single_threaded_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_threaded");
    group.throughput(Throughput::Elements(1000));

    let cases = [
        ("ungrouped", Grouping::Ungrouped),
        ("grouped", Grouping::grouped("tenant-a")),
    ];
    for (name, grouping) in cases.iter() {
        group.bench_with_input(
            BenchmarkId::new("increment", name),
            grouping,
            |b, grouping| {
                let limiter = LimiterIdRateLimiter::new(Arc::new(SystemClock::new()));
                let args = LimiterArguments::new("remedy", grouping.clone());

                b.iter(|| {
                    for _ in 0..1000 {
                        black_box(limiter.increment(black_box(&args), WINDOW).ok());
                    }
                })
            },
        );
    }

    group.finish();
}

/// Benchmark multi-threaded concurrent throughput
fn bench_concurrent_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent");

    for num_threads in [2, 4, 8].iter() {
        group.throughput(Throughput::Elements((*num_threads as u64) * 1000));

        group.bench_with_input(
            BenchmarkId::new("threads", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let limiter = Arc::new(LimiterIdRateLimiter::new(Arc::new(SystemClock::new())));

                    let mut handles = vec![];
                    for i in 0..num_threads {
                        let limiter = Arc::clone(&limiter);
                        let handle = std::thread::spawn(move || {
                            // Every thread hits the same scope in its own group
                            let args = LimiterArguments::new(
                                "remedy",
                                Grouping::grouped(format!("group-{}", i)),
                            );
                            for _ in 0..1000 {
                                black_box(limiter.increment(black_box(&args), WINDOW).ok());
                            }
                        });
                        handles.push(handle);
                    }

                    for handle in handles {
                        handle.join().unwrap();
                    }
                })
            },
        );
    }

    group.finish();
}

/// Benchmark scope-key diversity
fn bench_scope_diversity(c: &mut Criterion) {
    let mut group = c.benchmark_group("scope_diversity");
    group.throughput(Throughput::Elements(1000));

    for num_scopes in [1usize, 10, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::new("scopes", num_scopes),
            num_scopes,
            |b, &num_scopes| {
                let limiter = LimiterIdRateLimiter::new(Arc::new(SystemClock::new()));
                let args: Vec<_> = (0..num_scopes)
                    .map(|i| LimiterArguments::new(format!("remedy-{}", i), Grouping::Ungrouped))
                    .collect();

                b.iter(|| {
                    for i in 0..1000 {
                        black_box(limiter.increment(&args[i % num_scopes], WINDOW).ok());
                    }
                })
            },
        );
    }

    group.finish();
}

/// Benchmark config-driven threshold decisions with group allocation
fn bench_strategy_throttle(c: &mut Criterion) {
    let mut group = c.benchmark_group("strategy_throttle");
    group.throughput(Throughput::Elements(1000));

    let config: ThrottlingConfig = serde_json::from_str(
        r#"{
            "window_size_in_seconds": 60,
            "allowed_request_count": 1000000,
            "group_quota_allocation": {
                "group_by": { "header_name": "x-tier" },
                "groups": [{ "group_header_value": "gold", "allocation_percentage": 50 }],
                "default": "use_default_allocation",
                "default_allocation_percentage": 10
            }
        }"#,
    )
    .unwrap();
    let headers = HashMap::from([("X-Tier".to_string(), "gold".to_string())]);

    group.bench_function("grouped_check", |b| {
        let throttle = StrategyThrottle::new(Arc::new(SystemClock::new()));
        b.iter(|| {
            for _ in 0..1000 {
                black_box(throttle.check("remedy", black_box(&config), &headers).ok());
            }
        })
    });

    group.finish();
}

/// Benchmark priority heap push and pop
fn bench_priority_heap(c: &mut Criterion) {
    let mut group = c.benchmark_group("priority_heap");

    for size in [100usize, 1000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::new("push_pop", size), size, |b, &size| {
            let requests: Vec<_> = (0..size)
                .map(|i| {
                    PendingRequest::new(
                        format!("req-{}", i),
                        (i % 7) as f64,
                        UNIX_EPOCH + Duration::from_millis(i as u64),
                    )
                })
                .collect();

            b.iter(|| {
                let mut heap = PriorityHeap::new();
                for (i, request) in requests.iter().enumerate() {
                    heap.push(request.clone(), i);
                }
                while let Some(entry) = heap.pop() {
                    black_box(entry);
                }
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_window_math,
    bench_single_threaded_throughput,
    bench_concurrent_throughput,
    bench_scope_diversity,
    bench_strategy_throttle,
    bench_priority_heap,
);
criterion_main!(benches);
