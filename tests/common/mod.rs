//! Store scenarios shared by the memory and remote backend suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tierstore::{Backend, KeyTtl, MetricKind, RetentionTable, SeriesPoint, TimeSeriesStore};

/// Tiers `[10s, 60s, 300s]`.
pub fn scenario_retentions() -> RetentionTable {
    RetentionTable::from_intervals([
        Duration::from_secs(10),
        Duration::from_secs(60),
        Duration::from_secs(300),
    ])
    .unwrap()
}

fn assert_ttl_close(ttl: KeyTtl, expected: Duration) {
    let remaining = ttl.remaining().unwrap_or_else(|| panic!("expected a TTL, got {:?}", ttl));
    assert!(remaining <= expected, "{:?} exceeds {:?}", remaining, expected);
    assert!(
        remaining + Duration::from_secs(5) > expected,
        "{:?} too far below {:?}",
        remaining,
        expected
    );
}

pub fn counter_fans_out<B: Backend>(store: &TimeSeriesStore<B>) {
    store.write_counter_sample(100, "hits", 5).unwrap();

    let read = store.read_series("hits", 0, 200).unwrap();
    assert_eq!(read.points, vec![SeriesPoint::new(100, "5")]);

    let backend = store.backend();
    assert_eq!(backend.get("hits:60").unwrap().as_deref(), Some("5"));
    assert_eq!(backend.get("hits:300").unwrap().as_deref(), Some("5"));
    assert_eq!(backend.get("hits:10").unwrap(), None);
    assert_ttl_close(backend.pttl("hits:60").unwrap(), Duration::from_secs(120));
    assert_ttl_close(backend.pttl("hits:300").unwrap(), Duration::from_secs(600));
}

pub fn counter_drains_sum_once<B: Backend>(store: &TimeSeriesStore<B>) {
    for (ts, value) in [(100, 3), (105, 4), (110, -2), (115, 10)] {
        store.write_counter_sample(ts, "req", value).unwrap();
    }

    for tier in store.retentions().coarse() {
        assert_eq!(store.drain_counter("req", tier).unwrap(), Some(15));
        assert_eq!(store.drain_counter("req", tier).unwrap(), None);
    }
    assert_eq!(store.read_series("req", 0, 1000).unwrap().len(), 4);
}

pub fn raw_samples_buffer_on_coarse_tiers<B: Backend>(store: &TimeSeriesStore<B>) {
    store
        .write_raw_samples_for_aggregation("lat", &[12.0, 15.0, 9.0])
        .unwrap();

    let backend = store.backend();
    assert_eq!(backend.get("lat:60").unwrap().as_deref(), Some("12<X>15<X>9"));
    assert_eq!(backend.get("lat:300").unwrap().as_deref(), Some("12<X>15<X>9"));
    assert_eq!(backend.get("lat:10").unwrap(), None);
    assert!(store.read_series("lat", i64::MIN, i64::MAX).unwrap().is_empty());
    assert_ttl_close(backend.pttl("lat:60").unwrap(), Duration::from_secs(120));

    // A second batch joins the existing buffer and restarts its TTL.
    store.write_raw_samples_for_aggregation("lat", &[0.5]).unwrap();
    let tier = *store.retentions().tier(1).unwrap();
    let samples = store.drain_raw_samples("lat", &tier).unwrap().unwrap();
    assert_eq!(samples.values, vec![12.0, 15.0, 9.0, 0.5]);
    assert!(samples.errors.is_empty());
    assert!(store.drain_raw_samples("lat", &tier).unwrap().is_none());
}

pub fn truncate_then_read_is_empty<B: Backend>(store: &TimeSeriesStore<B>) {
    for ts in [10, 20, 30, 40] {
        store.write_timer_sample(ts, "timer.db", ts as f64 / 10.0).unwrap();
    }

    assert_eq!(store.truncate_series("timer.db", 30).unwrap(), 3);
    assert!(store.read_series("timer.db", 0, 30).unwrap().is_empty());
    assert_eq!(
        store.read_series("timer.db", 0, 100).unwrap().points,
        vec![SeriesPoint::new(40, "4")]
    );
    assert_eq!(store.truncate_series("timer.db", 30).unwrap(), 0);
}

pub fn drain_twice<B: Backend>(store: &TimeSeriesStore<B>) {
    store.backend().set("scratch", "payload", None).unwrap();
    assert_eq!(store.drain_and_clear("scratch").unwrap().as_deref(), Some("payload"));
    assert_eq!(store.drain_and_clear("scratch").unwrap(), None);
}

pub fn gauges_excluded_from_listing<B: Backend>(store: &TimeSeriesStore<B>) {
    for name in ["hits", "timer.lat", "gauge.mem", "gauges.cpu"] {
        assert!(store.register_datapoint(name).unwrap());
    }
    assert!(!store.register_datapoint("hits").unwrap());

    let without = store.list_datapoints(false).unwrap();
    assert_eq!(without.names().collect::<Vec<_>>(), vec!["hits", "timer.lat"]);

    let with = store.list_datapoints(true).unwrap();
    assert_eq!(with.len(), 4);
    assert_eq!(with.kind("gauges.cpu"), Some(MetricKind::Gauge));
}

/// Many threads drain one accumulator; exactly one sees the total.
pub fn concurrent_drains_never_double_return<B: Backend + 'static>(store: TimeSeriesStore<B>) {
    let store = Arc::new(store);
    for round in 0..20 {
        store.write_counter_sample(round, "conc", 7).unwrap();
        let tier = *store.retentions().tier(1).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.drain_counter("conc", &tier).unwrap())
            })
            .collect();

        let drained: Vec<i64> = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(drained, vec![7], "round {}", round);
    }
}

pub fn run_all<B: Backend + 'static>(make: impl Fn() -> TimeSeriesStore<B>) {
    counter_fans_out(&make());
    counter_drains_sum_once(&make());
    raw_samples_buffer_on_coarse_tiers(&make());
    truncate_then_read_is_empty(&make());
    drain_twice(&make());
    gauges_excluded_from_listing(&make());
    concurrent_drains_never_double_return(make());
}
