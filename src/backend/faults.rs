//! Fault-injecting backend wrapper for deterministic simulation.
//!
//! Each call first asks the fault plan whether to fail; a failed call never
//! reaches the inner backend, so a reported `Unavailable` always means
//! "not applied".

use super::{Backend, KeyTtl};
use crate::error::{BackendError, BackendResult};
use crate::redis::ScoreBound;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::io;
use std::time::Duration;

/// Fault plan for a `FaultyBackend`.
#[derive(Debug, Clone)]
pub struct FaultConfig {
    pub seed: u64,
    /// Probability that any single call fails with `Unavailable`
    pub unavailable_prob: f64,
    /// Fail every call after this many have succeeded
    pub fail_after: Option<u64>,
}

impl Default for FaultConfig {
    fn default() -> Self {
        FaultConfig {
            seed: 0,
            unavailable_prob: 0.0,
            fail_after: None,
        }
    }
}

impl FaultConfig {
    pub fn no_faults() -> Self {
        Self::default()
    }

    pub fn chaos(seed: u64) -> Self {
        FaultConfig {
            seed,
            unavailable_prob: 0.1,
            fail_after: None,
        }
    }

    /// Let exactly `calls` calls through, then fail everything.
    pub fn fail_after(calls: u64) -> Self {
        FaultConfig {
            fail_after: Some(calls),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FaultStats {
    pub calls: u64,
    pub injected: u64,
}

struct FaultState {
    rng: ChaCha8Rng,
    stats: FaultStats,
    passed: u64,
}

pub struct FaultyBackend<B> {
    inner: B,
    config: FaultConfig,
    state: Mutex<FaultState>,
}

impl<B: Backend> FaultyBackend<B> {
    pub fn new(inner: B, config: FaultConfig) -> Self {
        FaultyBackend {
            inner,
            state: Mutex::new(FaultState {
                rng: ChaCha8Rng::seed_from_u64(config.seed),
                stats: FaultStats::default(),
                passed: 0,
            }),
            config,
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn stats(&self) -> FaultStats {
        self.state.lock().stats.clone()
    }

    /// Change the fault plan mid-run, keeping RNG and counters.
    pub fn set_unavailable_prob(&mut self, prob: f64) {
        self.config.unavailable_prob = prob;
    }

    fn check(&self, op: &'static str) -> BackendResult<()> {
        let mut state = self.state.lock();
        state.stats.calls += 1;

        let exhausted = self
            .config
            .fail_after
            .is_some_and(|limit| state.passed >= limit);
        let unlucky =
            self.config.unavailable_prob > 0.0 && state.rng.gen_bool(self.config.unavailable_prob);

        if exhausted || unlucky {
            state.stats.injected += 1;
            return Err(BackendError::Unavailable(io::Error::new(
                io::ErrorKind::ConnectionReset,
                format!("injected fault on {}", op),
            )));
        }

        state.passed += 1;
        Ok(())
    }
}

impl<B: Backend> Backend for FaultyBackend<B> {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        self.check("GET")?;
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> BackendResult<()> {
        self.check("SET")?;
        self.inner.set(key, value, ttl)
    }

    fn incr_by(&self, key: &str, delta: i64) -> BackendResult<i64> {
        self.check("INCRBY")?;
        self.inner.incr_by(key, delta)
    }

    fn append(&self, key: &str, suffix: &str) -> BackendResult<usize> {
        self.check("APPEND")?;
        self.inner.append(key, suffix)
    }

    fn del(&self, key: &str) -> BackendResult<bool> {
        self.check("DEL")?;
        self.inner.del(key)
    }

    fn get_del(&self, key: &str) -> BackendResult<Option<String>> {
        self.check("GETDEL")?;
        self.inner.get_del(key)
    }

    fn pexpire(&self, key: &str, ttl: Duration) -> BackendResult<bool> {
        self.check("PEXPIRE")?;
        self.inner.pexpire(key, ttl)
    }

    fn pttl(&self, key: &str) -> BackendResult<KeyTtl> {
        self.check("PTTL")?;
        self.inner.pttl(key)
    }

    fn zadd(&self, key: &str, score: f64, member: &str) -> BackendResult<bool> {
        self.check("ZADD")?;
        self.inner.zadd(key, score, member)
    }

    fn zrange_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
    ) -> BackendResult<Vec<String>> {
        self.check("ZRANGEBYSCORE")?;
        self.inner.zrange_by_score(key, min, max)
    }

    fn zrem_range_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
    ) -> BackendResult<usize> {
        self.check("ZREMRANGEBYSCORE")?;
        self.inner.zrem_range_by_score(key, min, max)
    }

    fn sadd(&self, key: &str, member: &str) -> BackendResult<bool> {
        self.check("SADD")?;
        self.inner.sadd(key, member)
    }

    fn smembers(&self, key: &str) -> BackendResult<Vec<String>> {
        self.check("SMEMBERS")?;
        self.inner.smembers(key)
    }

    // Composites count as one call so they stay all-or-nothing.
    fn incr_by_expire(&self, key: &str, delta: i64, ttl: Duration) -> BackendResult<i64> {
        self.check("INCRBY+PEXPIRE")?;
        self.inner.incr_by_expire(key, delta, ttl)
    }

    fn append_joined_expire(
        &self,
        key: &str,
        chunk: &str,
        delimiter: &str,
        ttl: Duration,
    ) -> BackendResult<()> {
        self.check("APPEND+PEXPIRE")?;
        self.inner.append_joined_expire(key, chunk, delimiter, ttl)
    }
}
