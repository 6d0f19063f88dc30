//! Typed commands understood by the keyspace executor.
//!
//! Only the subset of the Redis command set the time-series layer issues is
//! modelled. `from_resp` lives in `parser.rs`; `to_resp` here is the inverse
//! used by the blocking client.

use super::data::ScoreBound;
use super::resp::RespValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping(Option<String>),
    Get(String),
    Set {
        key: String,
        value: String,
        nx: bool,
        px: Option<i64>,
    },
    IncrBy(String, i64),
    Append(String, String),
    Del(Vec<String>),
    Exists(Vec<String>),
    GetDel(String),
    /// EXPIRE is normalised to milliseconds at parse time.
    PExpire(String, i64),
    Pttl(String),
    ZAdd {
        key: String,
        pairs: Vec<(f64, String)>,
    },
    ZRangeByScore {
        key: String,
        min: ScoreBound,
        max: ScoreBound,
        with_scores: bool,
    },
    ZRemRangeByScore {
        key: String,
        min: ScoreBound,
        max: ScoreBound,
    },
    ZCard(String),
    SAdd(String, Vec<String>),
    SMembers(String),
    DbSize,
    FlushAll,
    Multi,
    Exec,
    Discard,
}

impl Command {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Command::Set {
            key: key.into(),
            value: value.into(),
            nx: false,
            px: None,
        }
    }

    pub fn del(key: impl Into<String>) -> Self {
        Command::Del(vec![key.into()])
    }

    /// Upper-case command name as sent on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping(_) => "PING",
            Command::Get(_) => "GET",
            Command::Set { .. } => "SET",
            Command::IncrBy(..) => "INCRBY",
            Command::Append(..) => "APPEND",
            Command::Del(_) => "DEL",
            Command::Exists(_) => "EXISTS",
            Command::GetDel(_) => "GETDEL",
            Command::PExpire(..) => "PEXPIRE",
            Command::Pttl(_) => "PTTL",
            Command::ZAdd { .. } => "ZADD",
            Command::ZRangeByScore { .. } => "ZRANGEBYSCORE",
            Command::ZRemRangeByScore { .. } => "ZREMRANGEBYSCORE",
            Command::ZCard(_) => "ZCARD",
            Command::SAdd(..) => "SADD",
            Command::SMembers(_) => "SMEMBERS",
            Command::DbSize => "DBSIZE",
            Command::FlushAll => "FLUSHALL",
            Command::Multi => "MULTI",
            Command::Exec => "EXEC",
            Command::Discard => "DISCARD",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Command::Ping(_)
                | Command::Get(_)
                | Command::Exists(_)
                | Command::Pttl(_)
                | Command::ZRangeByScore { .. }
                | Command::ZCard(_)
                | Command::SMembers(_)
                | Command::DbSize
        )
    }

    /// Transaction control is handled per connection, not by the executor.
    pub fn is_transaction_control(&self) -> bool {
        matches!(self, Command::Multi | Command::Exec | Command::Discard)
    }

    pub fn get_primary_key(&self) -> Option<&str> {
        match self {
            Command::Get(k)
            | Command::Set { key: k, .. }
            | Command::IncrBy(k, _)
            | Command::Append(k, _)
            | Command::GetDel(k)
            | Command::PExpire(k, _)
            | Command::Pttl(k)
            | Command::ZAdd { key: k, .. }
            | Command::ZRangeByScore { key: k, .. }
            | Command::ZRemRangeByScore { key: k, .. }
            | Command::ZCard(k)
            | Command::SAdd(k, _)
            | Command::SMembers(k) => Some(k),
            Command::Del(keys) | Command::Exists(keys) => keys.first().map(String::as_str),
            Command::Ping(_)
            | Command::DbSize
            | Command::FlushAll
            | Command::Multi
            | Command::Exec
            | Command::Discard => None,
        }
    }

    /// Encode as a RESP array of bulk strings.
    pub fn to_resp(&self) -> RespValue {
        let mut parts: Vec<String> = vec![self.name().to_string()];
        match self {
            Command::Ping(msg) => parts.extend(msg.iter().cloned()),
            Command::Get(k)
            | Command::GetDel(k)
            | Command::Pttl(k)
            | Command::ZCard(k)
            | Command::SMembers(k) => parts.push(k.clone()),
            Command::Set { key, value, nx, px } => {
                parts.push(key.clone());
                parts.push(value.clone());
                if *nx {
                    parts.push("NX".to_string());
                }
                if let Some(ms) = px {
                    parts.push("PX".to_string());
                    parts.push(ms.to_string());
                }
            }
            Command::IncrBy(k, delta) => {
                parts.push(k.clone());
                parts.push(delta.to_string());
            }
            Command::Append(k, v) => {
                parts.push(k.clone());
                parts.push(v.clone());
            }
            Command::Del(keys) | Command::Exists(keys) => parts.extend(keys.iter().cloned()),
            Command::PExpire(k, ms) => {
                parts.push(k.clone());
                parts.push(ms.to_string());
            }
            Command::ZAdd { key, pairs } => {
                parts.push(key.clone());
                for (score, member) in pairs {
                    parts.push(score.to_string());
                    parts.push(member.clone());
                }
            }
            Command::ZRangeByScore {
                key,
                min,
                max,
                with_scores,
            } => {
                parts.push(key.clone());
                parts.push(min.to_string());
                parts.push(max.to_string());
                if *with_scores {
                    parts.push("WITHSCORES".to_string());
                }
            }
            Command::ZRemRangeByScore { key, min, max } => {
                parts.push(key.clone());
                parts.push(min.to_string());
                parts.push(max.to_string());
            }
            Command::SAdd(k, members) => {
                parts.push(k.clone());
                parts.extend(members.iter().cloned());
            }
            Command::DbSize
            | Command::FlushAll
            | Command::Multi
            | Command::Exec
            | Command::Discard => {}
        }
        RespValue::command(parts)
    }
}
