//! In-process backend over a shared `CommandExecutor`.
//!
//! Every trait method takes the lock once, syncs the executor to the clock and
//! runs to completion, so the composite operations are atomic.

use super::{ttl_millis, Backend, KeyTtl};
use crate::clock::{Clock, SystemClock};
use crate::error::BackendResult;
use crate::redis::{Command, CommandExecutor, RespValue, ScoreBound};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Cloning yields another handle to the same keyspace.
#[derive(Clone)]
pub struct MemoryBackend<C: Clock = SystemClock> {
    executor: Arc<Mutex<CommandExecutor>>,
    clock: C,
}

impl MemoryBackend<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for MemoryBackend<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryBackend<C> {
    pub fn with_clock(clock: C) -> Self {
        MemoryBackend {
            executor: Arc::new(Mutex::new(CommandExecutor::new())),
            clock,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run `f` against the keyspace with time synced to the clock.
    pub fn with_lock<T>(&self, f: impl FnOnce(&mut CommandExecutor) -> T) -> T {
        let mut executor = self.executor.lock();
        executor.set_time(self.clock.now_ms());
        f(&mut executor)
    }

    /// Execute a parsed command (server path).
    pub fn execute(&self, cmd: &Command) -> RespValue {
        self.with_lock(|exec| exec.execute(cmd))
    }

    /// Execute a queued transaction under a single lock acquisition.
    pub fn execute_batch(&self, commands: &[Command]) -> RespValue {
        self.with_lock(|exec| exec.execute_batch(commands))
    }

    /// Sweep expired keys. Returns the number evicted.
    pub fn evict_expired(&self) -> usize {
        self.with_lock(|exec| exec.evict_expired())
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.with_lock(|exec| exec.dbsize())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C: Clock> Backend for MemoryBackend<C> {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        self.with_lock(|exec| exec.get(key))
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> BackendResult<()> {
        self.with_lock(|exec| {
            exec.set(key, value, false, ttl.map(ttl_millis));
        });
        Ok(())
    }

    fn incr_by(&self, key: &str, delta: i64) -> BackendResult<i64> {
        self.with_lock(|exec| exec.incr_by(key, delta))
    }

    fn append(&self, key: &str, suffix: &str) -> BackendResult<usize> {
        self.with_lock(|exec| exec.append(key, suffix))
    }

    fn del(&self, key: &str) -> BackendResult<bool> {
        Ok(self.with_lock(|exec| exec.del(&[key.to_string()])) > 0)
    }

    fn get_del(&self, key: &str) -> BackendResult<Option<String>> {
        self.with_lock(|exec| exec.get_del(key))
    }

    fn pexpire(&self, key: &str, ttl: Duration) -> BackendResult<bool> {
        Ok(self.with_lock(|exec| exec.pexpire(key, ttl_millis(ttl))))
    }

    fn pttl(&self, key: &str) -> BackendResult<KeyTtl> {
        Ok(KeyTtl::from_pttl(self.with_lock(|exec| exec.pttl(key))))
    }

    fn zadd(&self, key: &str, score: f64, member: &str) -> BackendResult<bool> {
        let pairs = [(score, member.to_string())];
        Ok(self.with_lock(|exec| exec.zadd(key, &pairs))? > 0)
    }

    fn zrange_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
    ) -> BackendResult<Vec<String>> {
        let entries = self.with_lock(|exec| exec.zrange_by_score(key, min, max))?;
        Ok(entries.into_iter().map(|(member, _)| member).collect())
    }

    fn zrem_range_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
    ) -> BackendResult<usize> {
        self.with_lock(|exec| exec.zrem_range_by_score(key, min, max))
    }

    fn sadd(&self, key: &str, member: &str) -> BackendResult<bool> {
        let members = [member.to_string()];
        Ok(self.with_lock(|exec| exec.sadd(key, &members))? > 0)
    }

    fn smembers(&self, key: &str) -> BackendResult<Vec<String>> {
        self.with_lock(|exec| exec.smembers(key))
    }

    fn incr_by_expire(&self, key: &str, delta: i64, ttl: Duration) -> BackendResult<i64> {
        self.with_lock(|exec| {
            let total = exec.incr_by(key, delta)?;
            exec.pexpire(key, ttl_millis(ttl));
            Ok(total)
        })
    }

    fn append_joined_expire(
        &self,
        key: &str,
        chunk: &str,
        delimiter: &str,
        ttl: Duration,
    ) -> BackendResult<()> {
        self.with_lock(|exec| {
            exec.append_joined(key, chunk, delimiter)?;
            exec.pexpire(key, ttl_millis(ttl));
            Ok(())
        })
    }
}
