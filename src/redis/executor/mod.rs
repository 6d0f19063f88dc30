//! Keyspace command executor.
//!
//! `CommandExecutor` is the single-threaded state machine behind both the
//! in-process backend and the loopback server. Operations are exposed twice:
//! typed methods returning `BackendResult` (used directly by `MemoryBackend`)
//! and `execute`, which maps a parsed `Command` onto those methods and renders
//! the RESP reply.
//!
//! - `mod.rs` (this file): Core struct, expiry bookkeeping and dispatch
//! - `string_ops.rs`: GET, SET, INCRBY, APPEND, GETDEL
//! - `key_ops.rs`: DEL, EXISTS, PEXPIRE, PTTL
//! - `sorted_set_ops.rs`: ZADD, ZRANGEBYSCORE, ZREMRANGEBYSCORE, ZCARD
//! - `set_ops.rs`: SADD, SMEMBERS
//!
//! Expiry is lazy on access plus an explicit sweep (`evict_expired`), driven by
//! whatever clock the owner feeds through `set_time`.

mod key_ops;
mod set_ops;
mod sorted_set_ops;
mod string_ops;

use super::command::Command;
use super::data::Value;
use super::resp::RespValue;
use crate::error::{BackendError, BackendResult};
use ahash::AHashMap;

pub const WRONGTYPE_REPLY: &str =
    "WRONGTYPE Operation against a key holding the wrong kind of value";
pub const NOT_AN_INTEGER_REPLY: &str = "ERR value is not an integer or out of range";
pub const OVERFLOW_REPLY: &str = "ERR increment or decrement would overflow";

pub struct CommandExecutor {
    pub(crate) data: AHashMap<String, Value>,
    /// Absolute deadline in epoch milliseconds.
    pub(crate) expirations: AHashMap<String, u64>,
    pub(crate) current_time_ms: u64,
    pub(crate) commands_processed: u64,
}

impl Default for CommandExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor {
    pub fn new() -> Self {
        CommandExecutor {
            data: AHashMap::new(),
            expirations: AHashMap::new(),
            current_time_ms: 0,
            commands_processed: 0,
        }
    }

    /// VOPR: every expiration refers to a live key.
    #[cfg(debug_assertions)]
    pub(crate) fn verify_invariants(&self) {
        for key in self.expirations.keys() {
            debug_assert!(
                self.data.contains_key(key),
                "Invariant violated: expiration for missing key '{}'",
                key
            );
        }
    }

    #[cfg(not(debug_assertions))]
    #[inline(always)]
    pub(crate) fn verify_invariants(&self) {}

    /// Advance the executor's notion of now. Time never moves backwards.
    pub fn set_time(&mut self, now_ms: u64) {
        self.current_time_ms = self.current_time_ms.max(now_ms);
    }

    pub fn current_time_ms(&self) -> u64 {
        self.current_time_ms
    }

    pub fn commands_processed(&self) -> u64 {
        self.commands_processed
    }

    pub fn dbsize(&self) -> usize {
        self.data
            .keys()
            .filter(|key| !self.is_expired(key))
            .count()
    }

    pub fn flush_all(&mut self) {
        self.data.clear();
        self.expirations.clear();
    }

    pub(crate) fn is_expired(&self, key: &str) -> bool {
        match self.expirations.get(key) {
            Some(&deadline) => deadline <= self.current_time_ms,
            None => false,
        }
    }

    /// Sweep every expired key. Returns how many were evicted.
    pub fn evict_expired(&mut self) -> usize {
        #[cfg(debug_assertions)]
        let pre_data_len = self.data.len();

        let now = self.current_time_ms;
        let expired_keys: Vec<String> = self
            .expirations
            .iter()
            .filter(|(_, &deadline)| deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();

        let count = expired_keys.len();
        for key in expired_keys {
            self.remove_key(&key);
        }

        #[cfg(debug_assertions)]
        debug_assert_eq!(
            self.data.len(),
            pre_data_len.saturating_sub(count),
            "Postcondition: data size must decrease by evicted count"
        );
        self.verify_invariants();

        count
    }

    pub(crate) fn remove_key(&mut self, key: &str) -> Option<Value> {
        self.expirations.remove(key);
        self.data.remove(key)
    }

    fn drop_if_expired(&mut self, key: &str) {
        if self.is_expired(key) {
            self.remove_key(key);
        }
    }

    pub(crate) fn get_value(&mut self, key: &str) -> Option<&Value> {
        self.drop_if_expired(key);
        self.data.get(key)
    }

    pub(crate) fn get_value_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.drop_if_expired(key);
        self.data.get_mut(key)
    }

    /// Render a typed failure as the matching Redis error reply.
    pub fn error_reply(err: &BackendError) -> RespValue {
        match err {
            BackendError::WrongType { .. } => RespValue::err(WRONGTYPE_REPLY),
            BackendError::NotAnInteger { .. } => RespValue::err(NOT_AN_INTEGER_REPLY),
            BackendError::Overflow { .. } => RespValue::err(OVERFLOW_REPLY),
            other => RespValue::err(format!("ERR {}", other)),
        }
    }

    fn reply<T>(result: BackendResult<T>, render: impl FnOnce(T) -> RespValue) -> RespValue {
        match result {
            Ok(value) => render(value),
            Err(err) => Self::error_reply(&err),
        }
    }

    /// Main command execution entry point.
    pub fn execute(&mut self, cmd: &Command) -> RespValue {
        self.commands_processed += 1;

        let response = match cmd {
            Command::Ping(None) => RespValue::simple("PONG"),
            Command::Ping(Some(msg)) => RespValue::bulk(msg),
            Command::Get(key) => Self::reply(self.get(key), |v| match v {
                Some(s) => RespValue::bulk(s),
                None => RespValue::nil(),
            }),
            Command::Set { key, value, nx, px } => {
                if self.set(key, value, *nx, *px) {
                    RespValue::ok()
                } else {
                    RespValue::nil()
                }
            }
            Command::IncrBy(key, delta) => {
                Self::reply(self.incr_by(key, *delta), RespValue::Integer)
            }
            Command::Append(key, value) => Self::reply(self.append(key, value), |len| {
                RespValue::Integer(len as i64)
            }),
            Command::Del(keys) => RespValue::Integer(self.del(keys) as i64),
            Command::Exists(keys) => RespValue::Integer(self.exists(keys) as i64),
            Command::GetDel(key) => Self::reply(self.get_del(key), |v| match v {
                Some(s) => RespValue::bulk(s),
                None => RespValue::nil(),
            }),
            Command::PExpire(key, ms) => RespValue::Integer(self.pexpire(key, *ms) as i64),
            Command::Pttl(key) => RespValue::Integer(self.pttl(key)),
            Command::ZAdd { key, pairs } => Self::reply(self.zadd(key, pairs), |added| {
                RespValue::Integer(added as i64)
            }),
            Command::ZRangeByScore {
                key,
                min,
                max,
                with_scores,
            } => Self::reply(self.zrange_by_score(key, *min, *max), |entries| {
                let mut out = Vec::with_capacity(entries.len() * if *with_scores { 2 } else { 1 });
                for (member, score) in entries {
                    out.push(RespValue::bulk(member));
                    if *with_scores {
                        out.push(RespValue::bulk(score.to_string()));
                    }
                }
                RespValue::Array(Some(out))
            }),
            Command::ZRemRangeByScore { key, min, max } => {
                Self::reply(self.zrem_range_by_score(key, *min, *max), |removed| {
                    RespValue::Integer(removed as i64)
                })
            }
            Command::ZCard(key) => {
                Self::reply(self.zcard(key), |n| RespValue::Integer(n as i64))
            }
            Command::SAdd(key, members) => Self::reply(self.sadd(key, members), |added| {
                RespValue::Integer(added as i64)
            }),
            Command::SMembers(key) => Self::reply(self.smembers(key), |members| {
                RespValue::Array(Some(members.into_iter().map(RespValue::bulk).collect()))
            }),
            Command::DbSize => RespValue::Integer(self.dbsize() as i64),
            Command::FlushAll => {
                self.flush_all();
                RespValue::ok()
            }
            Command::Multi | Command::Exec | Command::Discard => RespValue::err(format!(
                "ERR {} is handled by the connection",
                cmd.name()
            )),
        };

        self.verify_invariants();
        response
    }

    /// Run queued transaction commands back to back; the EXEC reply.
    pub fn execute_batch(&mut self, commands: &[Command]) -> RespValue {
        RespValue::Array(Some(commands.iter().map(|cmd| self.execute(cmd)).collect()))
    }
}
