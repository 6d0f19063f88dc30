//! Store Deterministic Simulation Tests
//!
//! Runs the store harness over many seeds. Each run checks every store reply
//! against a reference model and compares the raw keyspace with the model,
//! so partial tier writes must report exactly what they applied.

use tierstore::store_dst::{
    run_store_batch, summarize_store_batch, StoreDSTConfig, StoreDSTHarness,
};

// =============================================================================
// Standard Configuration Tests - 100 Seeds
// =============================================================================

#[test]
fn test_store_dst_100_seeds_standard() {
    let results = run_store_batch(0, 100, 500, StoreDSTConfig::new);
    let summary = summarize_store_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 100, "All 100 seeds should pass with standard config");
}

#[test]
fn test_store_dst_100_seeds_chaos() {
    let results = run_store_batch(1000, 100, 500, StoreDSTConfig::chaos);
    let summary = summarize_store_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 100, "All 100 seeds should pass under injected faults");

    let partial: u64 = results.iter().map(|r| r.partial_writes).sum();
    assert!(partial > 0, "Chaos runs should produce partial tier writes");
}

#[test]
fn test_store_dst_100_seeds_slow_clock() {
    let results = run_store_batch(2000, 100, 500, StoreDSTConfig::slow_clock);
    let summary = summarize_store_batch(&results);
    println!("{}", summary);

    let passed = results.iter().filter(|r| r.is_success()).count();
    assert_eq!(passed, 100, "All 100 seeds should pass with a slow clock");
}

// =============================================================================
// Long Runs
// =============================================================================

#[test]
fn test_store_dst_long_run() {
    for seed in [7, 42, 31337] {
        let mut harness = StoreDSTHarness::new(StoreDSTConfig::chaos(seed));
        harness.run(5_000);
        let result = harness.result();
        println!("{}", result.summary());
        assert!(
            result.is_success(),
            "Seed {} failed:\n{}",
            seed,
            result.invariant_violations.join("\n")
        );
    }
}

#[test]
fn test_store_dst_same_seed_same_run() {
    let first = run_store_batch(555, 3, 300, StoreDSTConfig::chaos);
    let second = run_store_batch(555, 3, 300, StoreDSTConfig::chaos);
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.summary(), b.summary());
    }
}
