//! Redis-model keyspace: value types, RESP codec, typed commands and the
//! executor state machine shared by the in-process backend and the loopback
//! server.

mod command;
mod data;
mod executor;
mod parser;
mod resp;
#[cfg(test)]
mod tests;

pub use command::Command;
pub use data::{RedisSet, RedisSortedSet, ScoreBound, Value};
pub use executor::{CommandExecutor, NOT_AN_INTEGER_REPLY, OVERFLOW_REPLY, WRONGTYPE_REPLY};
pub use resp::{RespParser, RespValue};
