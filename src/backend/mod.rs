//! Storage backends for the time-series store.
//!
//! A `Backend` is the slice of the Redis data model the store relies on:
//! string keys with TTLs, score-ordered sets and plain sets. Every call is
//! synchronous and is tried exactly once.
//!
//! - `MemoryBackend`: in-process keyspace behind one mutex
//! - `RemoteBackend`: blocking RESP2 client for a Redis-compatible server
//! - `FaultyBackend`: seeded fault-injection wrapper for simulation tests

mod faults;
mod memory;
mod remote;

pub use faults::{FaultConfig, FaultStats, FaultyBackend};
pub use memory::MemoryBackend;
pub use remote::{RemoteBackend, RemoteConfig};

use crate::error::BackendResult;
use crate::redis::ScoreBound;
use std::sync::Arc;
use std::time::Duration;

/// Remaining lifetime of a key, as reported by PTTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    Missing,
    Persistent,
    Remaining(Duration),
}

impl KeyTtl {
    /// Decode a PTTL reply (-2 missing, -1 no deadline, else milliseconds).
    pub fn from_pttl(ms: i64) -> Self {
        match ms {
            -2 => KeyTtl::Missing,
            ms if ms < 0 => KeyTtl::Persistent,
            ms => KeyTtl::Remaining(Duration::from_millis(ms as u64)),
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self {
            KeyTtl::Remaining(d) => Some(*d),
            _ => None,
        }
    }
}

/// Milliseconds for a PX/PEXPIRE argument, saturating and never zero.
pub(crate) fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

pub trait Backend: Send + Sync {
    fn get(&self, key: &str) -> BackendResult<Option<String>>;

    /// Unconditional SET, with an optional TTL.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> BackendResult<()>;

    fn incr_by(&self, key: &str, delta: i64) -> BackendResult<i64>;

    /// Returns the new length in bytes.
    fn append(&self, key: &str, suffix: &str) -> BackendResult<usize>;

    /// Returns true if the key existed.
    fn del(&self, key: &str) -> BackendResult<bool>;

    /// Atomic read-and-delete.
    fn get_del(&self, key: &str) -> BackendResult<Option<String>>;

    /// Returns false when the key does not exist.
    fn pexpire(&self, key: &str, ttl: Duration) -> BackendResult<bool>;

    fn pttl(&self, key: &str) -> BackendResult<KeyTtl>;

    /// Returns true if the member was new.
    fn zadd(&self, key: &str, score: f64, member: &str) -> BackendResult<bool>;

    /// Members with score in `[min, max]`, ascending by score.
    fn zrange_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
    ) -> BackendResult<Vec<String>>;

    fn zrem_range_by_score(&self, key: &str, min: ScoreBound, max: ScoreBound)
        -> BackendResult<usize>;

    /// Returns true if the member was new.
    fn sadd(&self, key: &str, member: &str) -> BackendResult<bool>;

    fn smembers(&self, key: &str) -> BackendResult<Vec<String>>;

    /// INCRBY followed by a TTL reset.
    ///
    /// The default issues two calls; implementations that can should make the
    /// pair atomic.
    fn incr_by_expire(&self, key: &str, delta: i64, ttl: Duration) -> BackendResult<i64> {
        let total = self.incr_by(key, delta)?;
        self.pexpire(key, ttl)?;
        Ok(total)
    }

    /// Append `chunk` to the buffer at `key`, joined with `delimiter` when the
    /// buffer already exists, then reset the TTL.
    ///
    /// The default checks existence and appends in separate calls; a buffer
    /// expiring in between leaves an empty leading segment, which the raw
    /// sample decoder skips.
    fn append_joined_expire(
        &self,
        key: &str,
        chunk: &str,
        delimiter: &str,
        ttl: Duration,
    ) -> BackendResult<()> {
        if self.get(key)?.is_some() {
            self.append(key, &format!("{}{}", delimiter, chunk))?;
        } else {
            self.append(key, chunk)?;
        }
        self.pexpire(key, ttl)?;
        Ok(())
    }
}

/// Forward every method through a smart pointer.
macro_rules! forward_backend {
    ($ptr:ident) => {
        impl<B: Backend + ?Sized> Backend for $ptr<B> {
            fn get(&self, key: &str) -> BackendResult<Option<String>> {
                (**self).get(key)
            }

            fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> BackendResult<()> {
                (**self).set(key, value, ttl)
            }

            fn incr_by(&self, key: &str, delta: i64) -> BackendResult<i64> {
                (**self).incr_by(key, delta)
            }

            fn append(&self, key: &str, suffix: &str) -> BackendResult<usize> {
                (**self).append(key, suffix)
            }

            fn del(&self, key: &str) -> BackendResult<bool> {
                (**self).del(key)
            }

            fn get_del(&self, key: &str) -> BackendResult<Option<String>> {
                (**self).get_del(key)
            }

            fn pexpire(&self, key: &str, ttl: Duration) -> BackendResult<bool> {
                (**self).pexpire(key, ttl)
            }

            fn pttl(&self, key: &str) -> BackendResult<KeyTtl> {
                (**self).pttl(key)
            }

            fn zadd(&self, key: &str, score: f64, member: &str) -> BackendResult<bool> {
                (**self).zadd(key, score, member)
            }

            fn zrange_by_score(
                &self,
                key: &str,
                min: ScoreBound,
                max: ScoreBound,
            ) -> BackendResult<Vec<String>> {
                (**self).zrange_by_score(key, min, max)
            }

            fn zrem_range_by_score(
                &self,
                key: &str,
                min: ScoreBound,
                max: ScoreBound,
            ) -> BackendResult<usize> {
                (**self).zrem_range_by_score(key, min, max)
            }

            fn sadd(&self, key: &str, member: &str) -> BackendResult<bool> {
                (**self).sadd(key, member)
            }

            fn smembers(&self, key: &str) -> BackendResult<Vec<String>> {
                (**self).smembers(key)
            }

            fn incr_by_expire(&self, key: &str, delta: i64, ttl: Duration) -> BackendResult<i64> {
                (**self).incr_by_expire(key, delta, ttl)
            }

            fn append_joined_expire(
                &self,
                key: &str,
                chunk: &str,
                delimiter: &str,
                ttl: Duration,
            ) -> BackendResult<()> {
                (**self).append_joined_expire(key, chunk, delimiter, ttl)
            }
        }
    };
}

forward_backend!(Arc);
forward_backend!(Box);
