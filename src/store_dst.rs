//! Deterministic Simulation Testing for the time-series store
//!
//! VOPR-style harness: a seeded RNG drives random writes, drains, reads,
//! truncations, registry calls and clock jumps against a `TimeSeriesStore`
//! over a fault-injecting in-memory backend. Every reply is checked against a
//! reference model, and the model is only updated for the tiers the store
//! reports as committed. Periodically the raw keyspace is compared with the
//! model, so a report that lies about what was written shows up as a
//! violation.
//!
//! ## Usage
//!
//! ```rust,ignore
//! for seed in 0..100 {
//!     let mut harness = StoreDSTHarness::new(StoreDSTConfig::chaos(seed));
//!     harness.run(500);
//!     assert!(harness.result().is_success(), "Seed {} failed", seed);
//! }
//! ```

use crate::backend::{Backend, FaultConfig, FaultyBackend, MemoryBackend};
use crate::clock::{Clock, ManualClock};
use crate::encoding::{encode_member, format_sample, MetricKind, RawSamples};
use crate::error::StoreError;
use crate::redis::ScoreBound;
use crate::retention::RetentionTable;
use crate::store::TimeSeriesStore;
use ahash::AHashMap;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

const COUNTER_METRICS: &[&str] = &["hits", "requests", "gauge.mem"];
const TIMER_METRICS: &[&str] = &["timer.lat", "timer.db"];

/// Configuration for store DST
#[derive(Debug, Clone)]
pub struct StoreDSTConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Probability that a backend call fails
    pub unavailable_prob: f64,
    /// Largest single clock jump
    pub max_advance_ms: u64,
    /// Compare the whole keyspace with the model every this many operations
    pub state_check_every: u64,
}

impl Default for StoreDSTConfig {
    fn default() -> Self {
        StoreDSTConfig {
            seed: 0,
            unavailable_prob: 0.0,
            max_advance_ms: 90_000,
            state_check_every: 25,
        }
    }
}

impl StoreDSTConfig {
    /// Fault-free run with given seed
    pub fn new(seed: u64) -> Self {
        StoreDSTConfig {
            seed,
            ..Default::default()
        }
    }

    /// Backend calls fail with probability 0.1
    pub fn chaos(seed: u64) -> Self {
        StoreDSTConfig {
            seed,
            unavailable_prob: 0.1,
            ..Default::default()
        }
    }

    /// Clock barely moves, so accumulators and buffers grow long
    pub fn slow_clock(seed: u64) -> Self {
        StoreDSTConfig {
            seed,
            unavailable_prob: 0.05,
            max_advance_ms: 2_000,
            ..Default::default()
        }
    }
}

/// Operation type for logging
#[derive(Debug, Clone)]
pub enum StoreOp {
    WriteCounter { metric: String, timestamp: i64, value: i64 },
    WriteTimer { metric: String, timestamp: i64, value: f64 },
    WriteRaw { metric: String, values: Vec<f64> },
    DrainCounter { metric: String, tier: usize },
    DrainRaw { metric: String, tier: usize },
    Truncate { metric: String, since: i64 },
    Read { metric: String, begin: i64, end: i64 },
    Register { metric: String },
    List { include_gauges: bool },
    Advance { ms: u64 },
    Sweep,
}

/// Result of a store DST run
#[derive(Debug, Clone)]
pub struct StoreDSTResult {
    pub seed: u64,
    pub total_operations: u64,
    pub writes: u64,
    /// Multi-tier writes that committed on some tiers only
    pub partial_writes: u64,
    pub drains: u64,
    pub reads: u64,
    /// Operations that failed with an injected fault
    pub failed_operations: u64,
    pub invariant_violations: Vec<String>,
    pub last_op: Option<StoreOp>,
}

impl StoreDSTResult {
    pub fn new(seed: u64) -> Self {
        StoreDSTResult {
            seed,
            total_operations: 0,
            writes: 0,
            partial_writes: 0,
            drains: 0,
            reads: 0,
            failed_operations: 0,
            invariant_violations: Vec::new(),
            last_op: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.invariant_violations.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "Seed {}: {} ops ({} writes, {} partial, {} drains, {} reads, {} failed), {} violations",
            self.seed,
            self.total_operations,
            self.writes,
            self.partial_writes,
            self.drains,
            self.reads,
            self.failed_operations,
            self.invariant_violations.len()
        )
    }
}

/// Value with an absolute expiry, as the keyspace stores it.
#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    deadline_ms: u64,
}

/// What the keyspace should contain.
#[derive(Debug, Default)]
struct StoreModel {
    /// metric -> (timestamp, member), in sorted-set order
    series: AHashMap<String, BTreeSet<(i64, String)>>,
    counters: AHashMap<String, Expiring<i64>>,
    raw: AHashMap<String, Expiring<Vec<f64>>>,
    datapoints: BTreeSet<(String, MetricKind)>,
}

impl StoreModel {
    fn live<'a, T>(map: &'a mut AHashMap<String, Expiring<T>>, key: &str, now_ms: u64) -> Option<&'a mut T> {
        if map.get(key).is_some_and(|e| e.deadline_ms <= now_ms) {
            map.remove(key);
        }
        map.get_mut(key).map(|e| &mut e.value)
    }

    fn take<T>(map: &mut AHashMap<String, Expiring<T>>, key: &str, now_ms: u64) -> Option<T> {
        map.remove(key)
            .filter(|e| e.deadline_ms > now_ms)
            .map(|e| e.value)
    }

    fn add_counter(&mut self, key: String, value: i64, deadline_ms: u64, now_ms: u64) {
        let total = Self::live(&mut self.counters, &key, now_ms).map_or(value, |t| *t + value);
        self.counters.insert(key, Expiring { value: total, deadline_ms });
    }

    fn append_raw(&mut self, key: String, values: &[f64], deadline_ms: u64, now_ms: u64) {
        let mut buffer = Self::live(&mut self.raw, &key, now_ms)
            .map(std::mem::take)
            .unwrap_or_default();
        buffer.extend_from_slice(values);
        self.raw.insert(key, Expiring { value: buffer, deadline_ms });
    }

    fn listed(&self, include_gauges: bool) -> BTreeMap<String, MetricKind> {
        let mut listed = BTreeMap::new();
        for (name, kind) in &self.datapoints {
            if *kind == MetricKind::Gauge && !include_gauges {
                continue;
            }
            // Set order visits the smallest kind of each name first.
            listed.entry(name.clone()).or_insert(*kind);
        }
        listed
    }
}

/// DST harness for `TimeSeriesStore`
pub struct StoreDSTHarness {
    config: StoreDSTConfig,
    rng: ChaCha8Rng,
    clock: ManualClock,
    /// Unfaulted view of the same keyspace, for state checks
    memory: MemoryBackend<ManualClock>,
    store: TimeSeriesStore<FaultyBackend<MemoryBackend<ManualClock>>>,
    model: StoreModel,
    result: StoreDSTResult,
}

impl StoreDSTHarness {
    pub fn new(config: StoreDSTConfig) -> Self {
        let clock = ManualClock::new(1_000_000_000);
        let memory = MemoryBackend::with_clock(clock.clone());
        let faults = FaultConfig {
            seed: config.seed ^ 0x5eed,
            unavailable_prob: config.unavailable_prob,
            fail_after: None,
        };
        let retentions = RetentionTable::new([
            (Duration::from_secs(10), 6),
            (Duration::from_secs(60), 10),
            (Duration::from_secs(300), 12),
        ])
        .unwrap_or_else(|e| unreachable!("fixed retention table is valid: {}", e));

        StoreDSTHarness {
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            store: TimeSeriesStore::new(FaultyBackend::new(memory.clone(), faults), retentions),
            memory,
            clock,
            model: StoreModel::default(),
            result: StoreDSTResult::new(config.seed),
            config,
        }
    }

    /// Create with just a seed (fault-free config)
    pub fn with_seed(seed: u64) -> Self {
        Self::new(StoreDSTConfig::new(seed))
    }

    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn pick(&mut self, names: &[&str]) -> String {
        names[self.rng.gen_range(0..names.len())].to_string()
    }

    fn random_timestamp(&mut self) -> i64 {
        (self.now_ms() / 1000) as i64 - self.rng.gen_range(0..120)
    }

    fn random_sample(&mut self) -> f64 {
        self.rng.gen_range(0..10_000) as f64 / 10.0
    }

    fn coarse_tier(&mut self) -> usize {
        self.rng.gen_range(1..self.store.retentions().len())
    }

    fn next_op(&mut self) -> StoreOp {
        match self.rng.gen_range(0..100) {
            0..=19 => StoreOp::WriteCounter {
                metric: self.pick(COUNTER_METRICS),
                timestamp: self.random_timestamp(),
                value: self.rng.gen_range(-10..100),
            },
            20..=31 => StoreOp::WriteTimer {
                metric: self.pick(TIMER_METRICS),
                timestamp: self.random_timestamp(),
                value: self.random_sample(),
            },
            32..=43 => {
                let count = self.rng.gen_range(0..4);
                StoreOp::WriteRaw {
                    metric: self.pick(TIMER_METRICS),
                    values: (0..count).map(|_| self.random_sample()).collect(),
                }
            }
            44..=53 => StoreOp::DrainCounter {
                metric: self.pick(COUNTER_METRICS),
                tier: self.coarse_tier(),
            },
            54..=61 => StoreOp::DrainRaw {
                metric: self.pick(TIMER_METRICS),
                tier: self.coarse_tier(),
            },
            62..=66 => {
                let all: Vec<&str> = COUNTER_METRICS.iter().chain(TIMER_METRICS).copied().collect();
                StoreOp::Truncate {
                    metric: self.pick(&all),
                    since: self.random_timestamp(),
                }
            }
            67..=76 => {
                let all: Vec<&str> = COUNTER_METRICS.iter().chain(TIMER_METRICS).copied().collect();
                let begin = self.random_timestamp();
                StoreOp::Read {
                    metric: self.pick(&all),
                    begin,
                    end: begin + self.rng.gen_range(0..120),
                }
            }
            77..=82 => {
                let all: Vec<&str> = COUNTER_METRICS.iter().chain(TIMER_METRICS).copied().collect();
                StoreOp::Register {
                    metric: self.pick(&all),
                }
            }
            83..=86 => StoreOp::List {
                include_gauges: self.rng.gen_bool(0.5),
            },
            87..=97 => StoreOp::Advance {
                ms: self.rng.gen_range(1..=self.config.max_advance_ms),
            },
            _ => StoreOp::Sweep,
        }
    }

    fn violation(&mut self, message: String) {
        self.result.invariant_violations.push(format!(
            "Op #{}: {:?} - {}",
            self.result.total_operations, self.result.last_op, message
        ));
    }

    /// Tiers a multi-tier write committed on, or `Err` if the failure was not
    /// an injected fault.
    fn committed_tiers(
        &mut self,
        outcome: Result<(), StoreError>,
        all: impl Iterator<Item = usize>,
    ) -> Result<Vec<usize>, String> {
        match outcome {
            Ok(()) => Ok(all.collect()),
            Err(StoreError::PartialTierWrite(report)) => {
                self.result.partial_writes += 1;
                if report.committed().is_empty() || report.is_complete() {
                    return Err(format!("partial write report is not partial: {}", report));
                }
                Ok(report.committed())
            }
            Err(StoreError::Backend(e)) if e.is_unavailable() => {
                self.result.failed_operations += 1;
                Ok(Vec::new())
            }
            Err(e) => Err(format!("unexpected error: {}", e)),
        }
    }

    fn apply(&mut self, op: &StoreOp) -> Result<(), String> {
        let now = self.now_ms();
        let retentions = self.store.retentions().clone();

        match op {
            StoreOp::WriteCounter {
                metric,
                timestamp,
                value,
            } => {
                self.result.writes += 1;
                let outcome = self.store.write_counter_sample(*timestamp, metric, *value);
                let committed = self.committed_tiers(outcome, 0..retentions.len())?;
                for index in committed {
                    let Some(tier) = retentions.tier(index) else {
                        return Err(format!("report names unknown tier {}", index));
                    };
                    if tier.is_finest() {
                        let member = encode_member(*timestamp, &value.to_string());
                        self.model
                            .series
                            .entry(metric.clone())
                            .or_default()
                            .insert((*timestamp, member));
                    } else {
                        let deadline = now + tier.accumulator_ttl().as_millis() as u64;
                        self.model
                            .add_counter(tier.accumulator_key(metric), *value, deadline, now);
                    }
                }
            }

            StoreOp::WriteTimer {
                metric,
                timestamp,
                value,
            } => {
                self.result.writes += 1;
                let outcome = self.store.write_timer_sample(*timestamp, metric, *value);
                if !self.committed_tiers(outcome, 0..1)?.is_empty() {
                    let member = encode_member(*timestamp, &format_sample(*value));
                    self.model
                        .series
                        .entry(metric.clone())
                        .or_default()
                        .insert((*timestamp, member));
                }
            }

            StoreOp::WriteRaw { metric, values } => {
                self.result.writes += 1;
                let outcome = self.store.write_raw_samples_for_aggregation(metric, values);
                let committed = self.committed_tiers(outcome, 1..retentions.len())?;
                if values.is_empty() {
                    return Ok(());
                }
                for index in committed {
                    let Some(tier) = retentions.tier(index).filter(|t| !t.is_finest()) else {
                        return Err(format!("raw write reported tier {}", index));
                    };
                    let deadline = now + tier.accumulator_ttl().as_millis() as u64;
                    self.model
                        .append_raw(tier.accumulator_key(metric), values, deadline, now);
                }
            }

            StoreOp::DrainCounter { metric, tier } => {
                self.result.drains += 1;
                let tier = *retentions.tier(*tier).ok_or("no such tier")?;
                match self.store.drain_counter(metric, &tier) {
                    Ok(total) => {
                        let key = tier.accumulator_key(metric);
                        let expected = StoreModel::take(&mut self.model.counters, &key, now);
                        if total != expected {
                            return Err(format!("drain {}: got {:?}, model {:?}", key, total, expected));
                        }
                    }
                    Err(StoreError::Backend(e)) if e.is_unavailable() => {
                        self.result.failed_operations += 1;
                    }
                    Err(e) => return Err(format!("unexpected error: {}", e)),
                }
            }

            StoreOp::DrainRaw { metric, tier } => {
                self.result.drains += 1;
                let tier = *retentions.tier(*tier).ok_or("no such tier")?;
                match self.store.drain_raw_samples(metric, &tier) {
                    Ok(samples) => {
                        let key = tier.accumulator_key(metric);
                        let expected = StoreModel::take(&mut self.model.raw, &key, now);
                        if let Some(samples) = &samples {
                            if !samples.errors.is_empty() {
                                return Err(format!("drain {}: decode errors {:?}", key, samples.errors));
                            }
                        }
                        let got = samples.map(|s| s.values);
                        if got != expected {
                            return Err(format!("drain {}: got {:?}, model {:?}", key, got, expected));
                        }
                    }
                    Err(StoreError::Backend(e)) if e.is_unavailable() => {
                        self.result.failed_operations += 1;
                    }
                    Err(e) => return Err(format!("unexpected error: {}", e)),
                }
            }

            StoreOp::Truncate { metric, since } => match self.store.truncate_series(metric, *since) {
                Ok(removed) => {
                    let points = self.model.series.entry(metric.clone()).or_default();
                    let before = points.len();
                    points.retain(|(ts, _)| *ts < 0 || *ts > *since);
                    let expected = before - points.len();
                    if removed != expected {
                        return Err(format!("truncate removed {}, model {}", removed, expected));
                    }
                }
                Err(StoreError::Backend(e)) if e.is_unavailable() => {
                    self.result.failed_operations += 1;
                }
                Err(e) => return Err(format!("unexpected error: {}", e)),
            },

            StoreOp::Read { metric, begin, end } => {
                self.result.reads += 1;
                match self.store.read_series(metric, *begin, *end) {
                    Ok(read) => {
                        let got: Vec<String> = read.points.iter().map(|p| p.encode()).collect();
                        let expected: Vec<String> = self
                            .model
                            .series
                            .get(metric)
                            .map(|points| {
                                points
                                    .iter()
                                    .filter(|(ts, _)| ts >= begin && ts <= end)
                                    .map(|(_, m)| m.clone())
                                    .collect()
                            })
                            .unwrap_or_default();
                        if got != expected || !read.errors.is_empty() {
                            return Err(format!("read got {:?}, model {:?}", got, expected));
                        }
                    }
                    Err(StoreError::Backend(e)) if e.is_unavailable() => {
                        self.result.failed_operations += 1;
                    }
                    Err(e) => return Err(format!("unexpected error: {}", e)),
                }
            }

            StoreOp::Register { metric } => match self.store.register_datapoint(metric) {
                Ok(added) => {
                    let fresh = self
                        .model
                        .datapoints
                        .insert((metric.clone(), MetricKind::infer(metric)));
                    if added != fresh {
                        return Err(format!("register returned {}, model {}", added, fresh));
                    }
                }
                Err(StoreError::Backend(e)) if e.is_unavailable() => {
                    self.result.failed_operations += 1;
                }
                Err(e) => return Err(format!("unexpected error: {}", e)),
            },

            StoreOp::List { include_gauges } => match self.store.list_datapoints(*include_gauges) {
                Ok(listed) => {
                    let expected = self.model.listed(*include_gauges);
                    if listed.entries != expected || !listed.rejected.is_empty() {
                        return Err(format!("listed {:?}, model {:?}", listed.entries, expected));
                    }
                }
                Err(StoreError::Backend(e)) if e.is_unavailable() => {
                    self.result.failed_operations += 1;
                }
                Err(e) => return Err(format!("unexpected error: {}", e)),
            },

            StoreOp::Advance { ms } => self.clock.advance_ms(*ms),

            StoreOp::Sweep => {
                self.memory.evict_expired();
            }
        }
        Ok(())
    }

    /// Compare every key the run can touch with the model, bypassing faults.
    fn check_state(&mut self) -> Result<(), String> {
        let now = self.now_ms();
        let retentions = self.store.retentions().clone();

        for metric in COUNTER_METRICS.iter().chain(TIMER_METRICS) {
            let members = self
                .memory
                .zrange_by_score(metric, ScoreBound::NegInfinity, ScoreBound::PosInfinity)
                .map_err(|e| e.to_string())?;
            let expected: Vec<String> = self
                .model
                .series
                .get(*metric)
                .map(|points| points.iter().map(|(_, m)| m.clone()).collect())
                .unwrap_or_default();
            if members != expected {
                return Err(format!("series {}: keyspace {:?}, model {:?}", metric, members, expected));
            }
        }

        for tier in retentions.coarse() {
            for metric in COUNTER_METRICS {
                let key = tier.accumulator_key(metric);
                let stored = self.memory.get(&key).map_err(|e| e.to_string())?;
                let stored = stored.map(|v| v.parse::<i64>().map_err(|e| e.to_string())).transpose()?;
                let expected = StoreModel::live(&mut self.model.counters, &key, now).copied();
                if stored != expected {
                    return Err(format!("{}: keyspace {:?}, model {:?}", key, stored, expected));
                }
            }
            for metric in TIMER_METRICS {
                let key = tier.accumulator_key(metric);
                let stored = self.memory.get(&key).map_err(|e| e.to_string())?;
                let stored = stored.map(|v| RawSamples::decode(&v).values);
                let expected = StoreModel::live(&mut self.model.raw, &key, now).cloned();
                if stored != expected {
                    return Err(format!("{}: keyspace {:?}, model {:?}", key, stored, expected));
                }
            }
        }

        self.memory.with_lock(|exec| exec.verify_invariants());
        Ok(())
    }

    fn run_single_op(&mut self) {
        let op = self.next_op();
        self.result.last_op = Some(op.clone());
        self.result.total_operations += 1;

        if let Err(violation) = self.apply(&op) {
            self.violation(violation);
            return;
        }

        if self.result.total_operations % self.config.state_check_every == 0 {
            if let Err(violation) = self.check_state() {
                self.violation(violation);
            }
        }
    }

    /// Run specified number of operations, then a final state check
    pub fn run(&mut self, operations: usize) {
        for _ in 0..operations {
            self.run_single_op();

            // Stop early if we hit a violation
            if !self.result.invariant_violations.is_empty() {
                return;
            }
        }
        if let Err(violation) = self.check_state() {
            self.violation(violation);
        }
    }

    pub fn result(&self) -> &StoreDSTResult {
        &self.result
    }

    /// Injected fault counters
    pub fn fault_stats(&self) -> crate::backend::FaultStats {
        self.store.backend().stats()
    }
}

/// Run a batch of DST tests with different seeds
pub fn run_store_batch(
    start_seed: u64,
    num_seeds: usize,
    ops_per_seed: usize,
    config_fn: fn(u64) -> StoreDSTConfig,
) -> Vec<StoreDSTResult> {
    (0..num_seeds)
        .map(|i| {
            let seed = start_seed + i as u64;
            let mut harness = StoreDSTHarness::new(config_fn(seed));
            harness.run(ops_per_seed);
            harness.result().clone()
        })
        .collect()
}

/// Summarize batch results
pub fn summarize_store_batch(results: &[StoreDSTResult]) -> String {
    let total = results.len();
    let passed = results.iter().filter(|r| r.is_success()).count();
    let failed = total - passed;
    let total_ops: u64 = results.iter().map(|r| r.total_operations).sum();
    let partial: u64 = results.iter().map(|r| r.partial_writes).sum();

    let mut summary = format!(
        "Store DST Summary\n\
         =================\n\
         Seeds: {} total, {} passed, {} failed\n\
         Total operations: {} ({} partial tier writes)\n",
        total, passed, failed, total_ops, partial
    );

    if failed > 0 {
        summary.push_str("\nFailed seeds:\n");
        for result in results.iter().filter(|r| !r.is_success()) {
            summary.push_str(&format!("  {}\n", result.summary()));
            for violation in &result.invariant_violations {
                summary.push_str(&format!("    - {}\n", violation));
            }
        }
    }

    summary
}
