//! Multi-threaded updates against one store.
//!
//! Threads stand in for worker processes: they only share the arena and
//! the registry handle, exactly what processes attached to one segment
//! would share.

#![cfg(not(feature = "loom"))]

use std::thread;

use promshm_core::{create_registry, Counter, Gauge, HeapArena, Histogram, RegistrySlot};

const THREADS: usize = 8;
const ITERATIONS: usize = 2_000;

#[test]
fn test_concurrent_counter_converges() {
    let arena = HeapArena::new();
    let registry = create_registry("default", &arena).unwrap();
    let requests = Counter::new(&arena, "requests_total", "Requests", &["method"]).unwrap();
    registry.register_metric(requests.metric()).unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let requests = requests.clone();
            thread::spawn(move || {
                let method = if i % 2 == 0 { "GET" } else { "POST" };
                for _ in 0..ITERATIONS {
                    requests.inc(&[method]).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let per_method = (THREADS / 2 * ITERATIONS) as f64;
    assert_eq!(requests.get(&["GET"]).unwrap(), per_method);
    assert_eq!(requests.get(&["POST"]).unwrap(), per_method);
    assert_eq!(requests.metric().sample_count(), 2);
}

#[test]
fn test_concurrent_label_resolution_creates_one_sample() {
    let arena = HeapArena::new();
    let gauge = Gauge::new(&arena, "queue_depth", "Depth", &["queue"]).unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let gauge = gauge.clone();
            thread::spawn(move || {
                for i in 0..64 {
                    let queue = format!("q{i}");
                    gauge.inc(&[queue.as_str()]).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(gauge.metric().sample_count(), 64);
    for i in 0..64 {
        let queue = format!("q{i}");
        assert_eq!(gauge.get(&[queue.as_str()]).unwrap(), THREADS as f64);
    }
}

#[test]
fn test_concurrent_histogram_is_consistent() {
    let arena = HeapArena::new();
    let latency =
        Histogram::new(&arena, "latency_seconds", "Latency", &[], &[0.1, 1.0, 10.0]).unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let latency = latency.clone();
            thread::spawn(move || {
                let value = [0.05, 0.5, 5.0, 50.0][i % 4];
                for _ in 0..ITERATIONS {
                    latency.observe(value, &[]).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let snapshot = latency.metric().histogram_from_labels(&[]).unwrap().snapshot();
    let per_value = (THREADS / 4 * ITERATIONS) as u64;
    assert_eq!(
        snapshot.counts,
        vec![per_value, 2 * per_value, 3 * per_value, 4 * per_value]
    );
    assert_eq!(snapshot.count, 4 * per_value);
    let expected_sum = (0.05 + 0.5 + 5.0 + 50.0) * per_value as f64;
    assert!((snapshot.sum - expected_sum).abs() < 1e-6);
}

#[test]
fn test_scrape_while_updating() {
    let arena = HeapArena::new();
    let registry = create_registry("default", &arena).unwrap();
    let hits = Counter::new(&arena, "hits_total", "Hits", &[]).unwrap();
    registry.register_metric(hits.metric()).unwrap();

    let writer = {
        let hits = hits.clone();
        thread::spawn(move || {
            for _ in 0..ITERATIONS {
                hits.inc(&[]).unwrap();
            }
        })
    };

    let mut last = 0.0;
    for _ in 0..50 {
        let text = registry.to_text();
        let value: f64 = text
            .lines()
            .find_map(|line| line.strip_prefix("hits_total{} "))
            .map(|value| value.parse().unwrap())
            .unwrap_or(0.0);
        assert!(value >= last, "counter went backwards: {value} < {last}");
        last = value;
    }
    writer.join().unwrap();

    assert_eq!(hits.get(&[]).unwrap(), ITERATIONS as f64);
}

static SLOT: RegistrySlot<HeapArena> = RegistrySlot::new();

#[test]
fn test_static_slot_shared_between_threads() {
    let arena = HeapArena::new();
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let arena = arena.clone();
            thread::spawn(move || {
                let registry = SLOT.get_or_init(&arena, "default").unwrap();
                registry.name().to_string()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), "default");
    }
    assert_eq!(SLOT.get().unwrap().collectors().len(), 1);
}
