//! Store scenarios over the in-process backend, plus expiry and fault cases
//! that need a hand-driven clock or an injected failure.

mod common;

use std::time::Duration;
use tierstore::redis::ScoreBound;
use tierstore::{
    Backend, BackendError, FaultConfig, FaultyBackend, KeyTtl, ManualClock, MemoryBackend,
    StoreError, TierOutcome, TimeSeriesStore,
};

fn manual_store() -> (ManualClock, TimeSeriesStore<MemoryBackend<ManualClock>>) {
    let clock = ManualClock::new(1_700_000_000_000);
    let backend = MemoryBackend::with_clock(clock.clone());
    (clock, TimeSeriesStore::new(backend, common::scenario_retentions()))
}

#[test]
fn test_scenarios_memory_backend() {
    common::run_all(|| TimeSeriesStore::new(MemoryBackend::new(), common::scenario_retentions()));
}

#[test]
fn test_accumulator_ttl_is_exact_with_manual_clock() {
    let (clock, store) = manual_store();
    store.write_counter_sample(100, "hits", 5).unwrap();

    assert_eq!(
        store.backend().pttl("hits:60").unwrap(),
        KeyTtl::Remaining(Duration::from_secs(120))
    );
    assert_eq!(
        store.backend().pttl("hits:300").unwrap(),
        KeyTtl::Remaining(Duration::from_secs(600))
    );

    clock.advance(Duration::from_secs(30));
    assert_eq!(
        store.backend().pttl("hits:60").unwrap(),
        KeyTtl::Remaining(Duration::from_secs(90))
    );
    // The tier-0 series never expires.
    assert_eq!(store.backend().pttl("hits").unwrap(), KeyTtl::Persistent);
}

#[test]
fn test_every_write_restarts_accumulator_ttl() {
    let (clock, store) = manual_store();
    store.write_counter_sample(100, "hits", 1).unwrap();
    clock.advance(Duration::from_secs(100));
    store.write_counter_sample(200, "hits", 1).unwrap();
    clock.advance(Duration::from_secs(100));

    // 200s after the first write, but only 100s after the last one.
    let tier = *store.retentions().tier(1).unwrap();
    assert_eq!(store.drain_counter("hits", &tier).unwrap(), Some(2));
}

#[test]
fn test_undrained_accumulator_expires() {
    let (clock, store) = manual_store();
    store.write_counter_sample(100, "hits", 5).unwrap();
    store
        .write_raw_samples_for_aggregation("timer.lat", &[1.0, 2.0])
        .unwrap();

    clock.advance(Duration::from_secs(121));
    let minute = *store.retentions().tier(1).unwrap();
    let five = *store.retentions().tier(2).unwrap();

    assert_eq!(store.drain_counter("hits", &minute).unwrap(), None);
    assert!(store.drain_raw_samples("timer.lat", &minute).unwrap().is_none());
    assert_eq!(store.drain_counter("hits", &five).unwrap(), Some(5));
    assert_eq!(
        store
            .drain_raw_samples("timer.lat", &five)
            .unwrap()
            .map(|s| s.values),
        Some(vec![1.0, 2.0])
    );
}

#[test]
fn test_expired_buffer_starts_fresh() {
    let (clock, store) = manual_store();
    store.write_raw_samples_for_aggregation("timer.lat", &[1.0]).unwrap();
    clock.advance(Duration::from_secs(120));
    store.write_raw_samples_for_aggregation("timer.lat", &[2.0]).unwrap();

    assert_eq!(store.backend().get("timer.lat:60").unwrap().as_deref(), Some("2"));
    assert_eq!(
        store.backend().get("timer.lat:300").unwrap().as_deref(),
        Some("1<X>2")
    );
}

#[test]
fn test_sweep_removes_expired_accumulators() {
    let (clock, store) = manual_store();
    store.write_counter_sample(100, "hits", 5).unwrap();
    assert_eq!(store.backend().len(), 3);

    clock.advance(Duration::from_secs(601));
    assert_eq!(store.backend().evict_expired(), 2);
    assert_eq!(store.backend().len(), 1);
}

#[test]
fn test_partial_write_reports_committed_tiers() {
    // Tier 0 goes through, tiers 1 and 2 fail.
    let memory = MemoryBackend::new();
    let store = TimeSeriesStore::new(
        FaultyBackend::new(memory.clone(), FaultConfig::fail_after(1)),
        common::scenario_retentions(),
    );

    let err = store.write_counter_sample(100, "hits", 5).unwrap_err();
    let report = err.tier_report().expect("partial write carries a report");
    assert_eq!(report.metric(), "hits");
    assert_eq!(report.committed(), vec![0]);
    assert_eq!(report.failed(), vec![1, 2]);
    assert!(matches!(report.tiers()[1].outcome, TierOutcome::Failed(BackendError::Unavailable(_))));
    assert!(err.to_string().contains("tier 0 committed"));

    // The keyspace holds exactly what the report claims.
    assert_eq!(
        memory
            .zrange_by_score("hits", ScoreBound::NegInfinity, ScoreBound::PosInfinity)
            .unwrap()
            .len(),
        1
    );
    assert_eq!(memory.get("hits:60").unwrap(), None);
    assert_eq!(memory.get("hits:300").unwrap(), None);
}

#[test]
fn test_total_failure_is_backend_error() {
    let memory = MemoryBackend::new();
    let store = TimeSeriesStore::new(
        FaultyBackend::new(memory.clone(), FaultConfig::fail_after(0)),
        common::scenario_retentions(),
    );

    let err = store.write_counter_sample(100, "hits", 5).unwrap_err();
    assert!(matches!(err, StoreError::Backend(BackendError::Unavailable(_))));
    assert!(memory.is_empty());
    assert_eq!(store.backend().stats().injected, 3);
}

#[test]
fn test_raw_partial_write() {
    let memory = MemoryBackend::new();
    let store = TimeSeriesStore::new(
        FaultyBackend::new(memory.clone(), FaultConfig::fail_after(1)),
        common::scenario_retentions(),
    );

    let err = store
        .write_raw_samples_for_aggregation("timer.lat", &[3.0])
        .unwrap_err();
    let report = err.tier_report().unwrap();
    assert_eq!(report.committed(), vec![1]);
    assert_eq!(report.failed(), vec![2]);
    assert_eq!(memory.get("timer.lat:60").unwrap().as_deref(), Some("3"));
    assert_eq!(memory.get("timer.lat:300").unwrap(), None);
}

#[test]
fn test_type_conflict_surfaces_as_backend_error() {
    let (_clock, store) = manual_store();
    store.write_raw_samples_for_aggregation("mixed", &[1.5]).unwrap();

    let err = store.write_counter_sample(100, "mixed", 1).unwrap_err();
    let report = err.tier_report().unwrap();
    assert_eq!(report.committed(), vec![0]);
    assert!(report
        .failed()
        .iter()
        .all(|t| matches!(report.tiers()[*t].outcome, TierOutcome::Failed(BackendError::NotAnInteger { .. }))));
}
