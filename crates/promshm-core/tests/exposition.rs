//! End-to-end tests for registration and text exposition.

#![cfg(not(feature = "loom"))]

use promshm_core::{
    create_registry, Collector, Counter, Error, Gauge, HeapArena, Histogram, Metric,
    MetricFormatter, MetricType, Registry, Shared, DEFAULT_COLLECTOR,
};

#[test]
fn test_counter_end_to_end() {
    let arena = HeapArena::new();
    let registry = create_registry("default", &arena).unwrap();
    let requests = Counter::new(
        &arena,
        "http_requests_total",
        "Total HTTP requests",
        &["method"],
    )
    .unwrap();
    registry.register_metric(requests.metric()).unwrap();

    for _ in 0..3 {
        requests.inc(&["GET"]).unwrap();
    }

    let mut formatter = MetricFormatter::new();
    let text = registry.bridge(&mut formatter);
    assert_eq!(
        text,
        "# HELP http_requests_total Total HTTP requests\n\
         # TYPE http_requests_total counter\n\
         http_requests_total{method=\"GET\"} 3\n\
         \n"
    );
}

#[test]
fn test_full_registry_output_order() {
    let arena = HeapArena::new();
    let registry = create_registry("default", &arena).unwrap();

    let connections = Gauge::new(&arena, "active_connections", "Open connections", &[]).unwrap();
    let latency = Histogram::new(
        &arena,
        "request_seconds",
        "Request latency",
        &["route"],
        &[0.1, 1.0],
    )
    .unwrap();
    registry.register_metric(connections.metric()).unwrap();
    registry.register_metric(latency.metric()).unwrap();

    let mut process = registry.new_collector("process").unwrap();
    process.set_collect_fn(|collector| collector.metrics());
    let uptime = Shared::new(
        &arena,
        Metric::new(&arena, MetricType::Gauge, "uptime_seconds", "Uptime", &[]).unwrap(),
    )
    .unwrap();
    process.add_metric(uptime.clone()).unwrap();
    registry
        .register_collector(Shared::new(&arena, process).unwrap())
        .unwrap();

    connections.set(7.0, &[]).unwrap();
    latency.observe(0.05, &["/"]).unwrap();
    latency.observe(0.5, &["/api"]).unwrap();
    uptime.sample_from_labels(&[]).unwrap().set(12.5).unwrap();

    let expected = "\
# HELP active_connections Open connections
# TYPE active_connections gauge
active_connections{} 7

# HELP request_seconds Request latency
# TYPE request_seconds histogram
request_seconds_bucket{route=\"/\",le=\"0.1\"} 1
request_seconds_bucket{route=\"/\",le=\"1\"} 1
request_seconds_bucket{route=\"/\",le=\"+Inf\"} 1
request_seconds_sum{route=\"/\"} 0.05
request_seconds_count{route=\"/\"} 1
request_seconds_bucket{route=\"/api\",le=\"0.1\"} 0
request_seconds_bucket{route=\"/api\",le=\"1\"} 1
request_seconds_bucket{route=\"/api\",le=\"+Inf\"} 1
request_seconds_sum{route=\"/api\"} 0.5
request_seconds_count{route=\"/api\"} 1

# HELP uptime_seconds Uptime
# TYPE uptime_seconds gauge
uptime_seconds{} 12.5

";
    assert_eq!(registry.to_text(), expected);
}

#[test]
fn test_metric_without_samples_still_has_header() {
    let arena = HeapArena::new();
    let registry = Registry::new(&arena, "default").unwrap();
    let idle = Counter::new(&arena, "idle_total", "Never incremented", &["kind"]).unwrap();
    registry.register_metric(idle.metric()).unwrap();

    assert_eq!(
        registry.to_text(),
        "# HELP idle_total Never incremented\n# TYPE idle_total counter\n\n"
    );
}

#[test]
fn test_registration_errors() {
    let arena = HeapArena::new();
    let registry = create_registry("default", &arena).unwrap();

    let bad = Counter::new(&arena, "123bad", "", &[]).unwrap();
    assert!(matches!(
        registry.register_metric(bad.metric()),
        Err(Error::InvalidName(_))
    ));

    let first = Counter::new(&arena, "jobs_total", "", &[]).unwrap();
    let second = Counter::new(&arena, "jobs_total", "", &[]).unwrap();
    registry.register_metric(first.metric()).unwrap();
    assert_eq!(
        registry.register_metric(second.metric()).unwrap_err(),
        Error::DuplicateRegistration("jobs_total".into())
    );

    let default_again = Shared::new(&arena, Collector::new(&arena, DEFAULT_COLLECTOR).unwrap())
        .unwrap();
    assert!(matches!(
        registry.register_collector(default_again),
        Err(Error::DuplicateRegistration(_))
    ));

    assert!(matches!(
        Counter::new(&arena, "ok_total", "", &["le"]),
        Err(Error::InvalidName(_))
    ));
}

#[test]
fn test_label_values_are_escaped() {
    let arena = HeapArena::new();
    let registry = create_registry("default", &arena).unwrap();
    let errors = Counter::new(&arena, "errors_total", "Errors\nby path", &["path"]).unwrap();
    registry.register_metric(errors.metric()).unwrap();
    errors.inc(&["C:\\dir \"x\""]).unwrap();

    let text = registry.to_text();
    assert!(text.contains("# HELP errors_total Errors\\nby path\n"));
    assert!(text.contains("errors_total{path=\"C:\\\\dir \\\"x\\\"\"} 1\n"));
}
