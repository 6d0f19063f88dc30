//! Blocking RESP2 client backend.
//!
//! One connection per backend, guarded by a mutex. A transport or framing
//! failure drops the connection; the next call reconnects. The failed call is
//! not retried.

use super::{ttl_millis, Backend, KeyTtl};
use crate::error::{BackendError, BackendResult};
use crate::redis::{
    Command, RespParser, RespValue, ScoreBound, NOT_AN_INTEGER_REPLY, OVERFLOW_REPLY,
};
use bytes::BytesMut;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, warn};

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// `host:port` of the server
    pub addr: String,
    #[serde(with = "crate::config::duration_millis")]
    pub connect_timeout: Duration,
    /// Applied to both reads and writes
    #[serde(with = "crate::config::duration_millis")]
    pub io_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            addr: "127.0.0.1:6379".to_string(),
            connect_timeout: Duration::from_secs(1),
            io_timeout: Duration::from_secs(5),
        }
    }
}

impl RemoteConfig {
    pub fn new(addr: impl Into<String>) -> Self {
        RemoteConfig {
            addr: addr.into(),
            ..Default::default()
        }
    }
}

struct Connection {
    stream: TcpStream,
    buf: BytesMut,
}

impl Connection {
    fn open(config: &RemoteConfig) -> io::Result<Self> {
        let mut last_err = None;
        for addr in config.addr.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, config.connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(config.io_timeout))?;
                    stream.set_write_timeout(Some(config.io_timeout))?;
                    stream.set_nodelay(true)?;
                    debug!(addr = %addr, "connected to backend");
                    return Ok(Connection {
                        stream,
                        buf: BytesMut::with_capacity(READ_CHUNK),
                    });
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no address resolved for {}", config.addr),
            )
        }))
    }

    /// Write all commands in one batch, then read one reply per command.
    fn exchange(&mut self, commands: &[Command]) -> BackendResult<Vec<RespValue>> {
        let mut out = BytesMut::new();
        for cmd in commands {
            RespParser::encode_into(&cmd.to_resp(), &mut out);
        }
        self.stream.write_all(&out)?;

        let mut replies = Vec::with_capacity(commands.len());
        while replies.len() < commands.len() {
            replies.push(self.read_reply()?);
        }
        Ok(replies)
    }

    fn read_reply(&mut self) -> BackendResult<RespValue> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(value) = RespParser::parse_buf(&mut self.buf).map_err(BackendError::Protocol)? {
                return Ok(value);
            }
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Err(BackendError::Unavailable(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

pub struct RemoteBackend {
    config: RemoteConfig,
    conn: Mutex<Option<Connection>>,
}

impl RemoteBackend {
    /// Connects lazily on first use.
    pub fn new(config: RemoteConfig) -> Self {
        RemoteBackend {
            config,
            conn: Mutex::new(None),
        }
    }

    /// Connect eagerly, surfacing an unreachable server at construction.
    pub fn connect(config: RemoteConfig) -> BackendResult<Self> {
        let conn = Connection::open(&config)?;
        Ok(RemoteBackend {
            config,
            conn: Mutex::new(Some(conn)),
        })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    pub fn ping(&self) -> BackendResult<()> {
        match self.call(Command::Ping(None))? {
            RespValue::SimpleString(s) if s == "PONG" => Ok(()),
            other => Err(unexpected("PING", &other)),
        }
    }

    fn round_trip(&self, commands: &[Command]) -> BackendResult<Vec<RespValue>> {
        let mut guard = self.conn.lock();
        let conn = match guard.take() {
            Some(conn) => guard.insert(conn),
            None => guard.insert(Connection::open(&self.config)?),
        };

        let result = conn.exchange(commands);
        if let Err(err) = &result {
            if matches!(err, BackendError::Unavailable(_) | BackendError::Protocol(_)) {
                warn!(addr = %self.config.addr, error = %err, "dropping backend connection");
                *guard = None;
            }
        }
        result
    }

    /// Send one command; error replies become typed errors.
    fn call(&self, cmd: Command) -> BackendResult<RespValue> {
        debug!(command = cmd.name(), "backend call");
        let key = cmd.get_primary_key().unwrap_or_default().to_string();
        let reply = self
            .round_trip(std::slice::from_ref(&cmd))?
            .pop()
            .ok_or_else(|| BackendError::Protocol("missing reply".to_string()))?;
        check_reply(&key, reply)
    }

    /// MULTI, the commands, EXEC, pipelined in one write. Returns the EXEC
    /// results, each checked for an error reply.
    fn transaction(&self, key: &str, commands: Vec<Command>) -> BackendResult<Vec<RespValue>> {
        debug!(
            key,
            commands = commands.len(),
            first = commands.first().map(Command::name).unwrap_or_default(),
            "backend transaction"
        );
        let count = commands.len();
        let mut batch = Vec::with_capacity(count + 2);
        batch.push(Command::Multi);
        batch.extend(commands);
        batch.push(Command::Exec);

        let mut replies = self.round_trip(&batch)?;
        let exec_reply = replies
            .pop()
            .ok_or_else(|| BackendError::Protocol("missing EXEC reply".to_string()))?;
        // Queueing failures surface through EXECABORT, so only EXEC is checked.
        match check_reply(key, exec_reply)? {
            RespValue::Array(Some(results)) if results.len() == count => results
                .into_iter()
                .map(|r| check_reply(key, r))
                .collect(),
            other => Err(unexpected("EXEC", &other)),
        }
    }
}

fn unexpected(what: &str, reply: &RespValue) -> BackendError {
    BackendError::Protocol(format!("unexpected {} reply: {:?}", what, reply))
}

fn check_reply(key: &str, reply: RespValue) -> BackendResult<RespValue> {
    match reply {
        RespValue::Error(msg) => Err(map_error_reply(key, msg)),
        other => Ok(other),
    }
}

/// Map a server error reply back onto the typed variants.
fn map_error_reply(key: &str, msg: String) -> BackendError {
    if msg.starts_with("WRONGTYPE") {
        BackendError::WrongType {
            key: key.to_string(),
        }
    } else if msg == NOT_AN_INTEGER_REPLY {
        BackendError::NotAnInteger {
            key: key.to_string(),
        }
    } else if msg == OVERFLOW_REPLY {
        BackendError::Overflow {
            key: key.to_string(),
        }
    } else {
        BackendError::Server(msg)
    }
}

fn expect_integer(what: &str, reply: RespValue) -> BackendResult<i64> {
    match reply {
        RespValue::Integer(n) => Ok(n),
        other => Err(unexpected(what, &other)),
    }
}

fn expect_optional_string(what: &str, reply: RespValue) -> BackendResult<Option<String>> {
    match reply {
        RespValue::BulkString(Some(data)) => Ok(Some(String::from_utf8_lossy(&data).into_owned())),
        RespValue::BulkString(None) => Ok(None),
        other => Err(unexpected(what, &other)),
    }
}

fn expect_strings(what: &str, reply: RespValue) -> BackendResult<Vec<String>> {
    match reply {
        RespValue::Array(Some(items)) => items
            .into_iter()
            .map(|item| match item {
                RespValue::BulkString(Some(data)) => {
                    Ok(String::from_utf8_lossy(&data).into_owned())
                }
                other => Err(unexpected(what, &other)),
            })
            .collect(),
        other => Err(unexpected(what, &other)),
    }
}

impl Backend for RemoteBackend {
    fn get(&self, key: &str) -> BackendResult<Option<String>> {
        expect_optional_string("GET", self.call(Command::Get(key.to_string()))?)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> BackendResult<()> {
        let cmd = Command::Set {
            key: key.to_string(),
            value: value.to_string(),
            nx: false,
            px: ttl.map(ttl_millis),
        };
        match self.call(cmd)? {
            RespValue::SimpleString(_) => Ok(()),
            other => Err(unexpected("SET", &other)),
        }
    }

    fn incr_by(&self, key: &str, delta: i64) -> BackendResult<i64> {
        expect_integer("INCRBY", self.call(Command::IncrBy(key.to_string(), delta))?)
    }

    fn append(&self, key: &str, suffix: &str) -> BackendResult<usize> {
        let len = expect_integer(
            "APPEND",
            self.call(Command::Append(key.to_string(), suffix.to_string()))?,
        )?;
        Ok(len.max(0) as usize)
    }

    fn del(&self, key: &str) -> BackendResult<bool> {
        Ok(expect_integer("DEL", self.call(Command::del(key))?)? > 0)
    }

    fn get_del(&self, key: &str) -> BackendResult<Option<String>> {
        expect_optional_string("GETDEL", self.call(Command::GetDel(key.to_string()))?)
    }

    fn pexpire(&self, key: &str, ttl: Duration) -> BackendResult<bool> {
        let reply = self.call(Command::PExpire(key.to_string(), ttl_millis(ttl)))?;
        Ok(expect_integer("PEXPIRE", reply)? == 1)
    }

    fn pttl(&self, key: &str) -> BackendResult<KeyTtl> {
        let ms = expect_integer("PTTL", self.call(Command::Pttl(key.to_string()))?)?;
        Ok(KeyTtl::from_pttl(ms))
    }

    fn zadd(&self, key: &str, score: f64, member: &str) -> BackendResult<bool> {
        let cmd = Command::ZAdd {
            key: key.to_string(),
            pairs: vec![(score, member.to_string())],
        };
        Ok(expect_integer("ZADD", self.call(cmd)?)? > 0)
    }

    fn zrange_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
    ) -> BackendResult<Vec<String>> {
        let cmd = Command::ZRangeByScore {
            key: key.to_string(),
            min,
            max,
            with_scores: false,
        };
        expect_strings("ZRANGEBYSCORE", self.call(cmd)?)
    }

    fn zrem_range_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
    ) -> BackendResult<usize> {
        let cmd = Command::ZRemRangeByScore {
            key: key.to_string(),
            min,
            max,
        };
        Ok(expect_integer("ZREMRANGEBYSCORE", self.call(cmd)?)?.max(0) as usize)
    }

    fn sadd(&self, key: &str, member: &str) -> BackendResult<bool> {
        let cmd = Command::SAdd(key.to_string(), vec![member.to_string()]);
        Ok(expect_integer("SADD", self.call(cmd)?)? > 0)
    }

    fn smembers(&self, key: &str) -> BackendResult<Vec<String>> {
        expect_strings("SMEMBERS", self.call(Command::SMembers(key.to_string()))?)
    }

    fn incr_by_expire(&self, key: &str, delta: i64, ttl: Duration) -> BackendResult<i64> {
        let mut results = self.transaction(
            key,
            vec![
                Command::IncrBy(key.to_string(), delta),
                Command::PExpire(key.to_string(), ttl_millis(ttl)),
            ],
        )?;
        results.truncate(1);
        let total = results
            .pop()
            .ok_or_else(|| BackendError::Protocol("empty EXEC result".to_string()))?;
        expect_integer("INCRBY", total)
    }

    fn append_joined_expire(
        &self,
        key: &str,
        chunk: &str,
        delimiter: &str,
        ttl: Duration,
    ) -> BackendResult<()> {
        let px = ttl_millis(ttl);
        let create = Command::Set {
            key: key.to_string(),
            value: chunk.to_string(),
            nx: true,
            px: Some(px),
        };
        match self.call(create)? {
            RespValue::SimpleString(_) => return Ok(()),
            RespValue::BulkString(None) => {}
            other => return Err(unexpected("SET NX", &other)),
        }

        // The buffer exists: join onto it and refresh its TTL together.
        self.transaction(
            key,
            vec![
                Command::Append(key.to_string(), format!("{}{}", delimiter, chunk)),
                Command::PExpire(key.to_string(), px),
            ],
        )?;
        Ok(())
    }
}
