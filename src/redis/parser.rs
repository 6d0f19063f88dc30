//! RESP request parsing into typed `Command`s.

use super::command::Command;
use super::data::ScoreBound;
use super::resp::RespValue;

fn wrong_arity(name: &str) -> String {
    format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_lowercase()
    )
}

impl Command {
    /// Parse a RESP request (array of bulk strings) into a Command.
    ///
    /// # Errors
    ///
    /// Returns the error reply text when the request is not an array of bulk
    /// strings, names an unknown command, or has malformed arguments.
    pub fn from_resp(value: &RespValue) -> Result<Command, String> {
        let elements = match value {
            RespValue::Array(Some(elements)) if !elements.is_empty() => elements,
            _ => return Err("Invalid command format".to_string()),
        };

        let cmd_name = match &elements[0] {
            RespValue::BulkString(Some(data)) => String::from_utf8_lossy(data).to_uppercase(),
            _ => return Err("Invalid command format".to_string()),
        };
        let args = &elements[1..];

        let require = |n: usize| -> Result<(), String> {
            if args.len() == n {
                Ok(())
            } else {
                Err(wrong_arity(&cmd_name))
            }
        };
        let require_at_least = |n: usize| -> Result<(), String> {
            if args.len() >= n {
                Ok(())
            } else {
                Err(wrong_arity(&cmd_name))
            }
        };

        match cmd_name.as_str() {
            "PING" => match args.len() {
                0 => Ok(Command::Ping(None)),
                1 => Ok(Command::Ping(Some(Self::extract_string(&args[0])?))),
                _ => Err(wrong_arity(&cmd_name)),
            },
            "GET" => {
                require(1)?;
                Ok(Command::Get(Self::extract_string(&args[0])?))
            }
            "SET" => {
                require_at_least(2)?;
                let key = Self::extract_string(&args[0])?;
                let value = Self::extract_string(&args[1])?;
                let mut nx = false;
                let mut px = None;
                let mut i = 2;
                while i < args.len() {
                    let opt = Self::extract_string(&args[i])?.to_uppercase();
                    match opt.as_str() {
                        "NX" => {
                            nx = true;
                            i += 1;
                        }
                        "PX" | "EX" => {
                            if px.is_some() || i + 1 >= args.len() {
                                return Err("ERR syntax error".to_string());
                            }
                            let amount = Self::extract_i64(&args[i + 1])?;
                            if amount <= 0 {
                                return Err("ERR invalid expire time in 'set' command".to_string());
                            }
                            px = Some(if opt == "EX" {
                                amount.checked_mul(1000).ok_or_else(|| {
                                    "ERR invalid expire time in 'set' command".to_string()
                                })?
                            } else {
                                amount
                            });
                            i += 2;
                        }
                        _ => return Err("ERR syntax error".to_string()),
                    }
                }
                Ok(Command::Set { key, value, nx, px })
            }
            "INCRBY" => {
                require(2)?;
                let key = Self::extract_string(&args[0])?;
                let delta = Self::extract_i64(&args[1])?;
                Ok(Command::IncrBy(key, delta))
            }
            "INCR" => {
                require(1)?;
                Ok(Command::IncrBy(Self::extract_string(&args[0])?, 1))
            }
            "APPEND" => {
                require(2)?;
                let key = Self::extract_string(&args[0])?;
                let value = Self::extract_string(&args[1])?;
                Ok(Command::Append(key, value))
            }
            "DEL" => {
                require_at_least(1)?;
                Ok(Command::Del(Self::extract_strings(args)?))
            }
            "EXISTS" => {
                require_at_least(1)?;
                Ok(Command::Exists(Self::extract_strings(args)?))
            }
            "GETDEL" => {
                require(1)?;
                Ok(Command::GetDel(Self::extract_string(&args[0])?))
            }
            "EXPIRE" | "PEXPIRE" => {
                require(2)?;
                let key = Self::extract_string(&args[0])?;
                let amount = Self::extract_i64(&args[1])?;
                let ms = if cmd_name == "EXPIRE" {
                    amount.checked_mul(1000).ok_or_else(|| {
                        "ERR invalid expire time in 'expire' command".to_string()
                    })?
                } else {
                    amount
                };
                Ok(Command::PExpire(key, ms))
            }
            "PTTL" => {
                require(1)?;
                Ok(Command::Pttl(Self::extract_string(&args[0])?))
            }
            "ZADD" => {
                require_at_least(3)?;
                if (args.len() - 1) % 2 != 0 {
                    return Err("ERR syntax error".to_string());
                }
                let key = Self::extract_string(&args[0])?;
                let pairs = args[1..]
                    .chunks_exact(2)
                    .map(|pair| {
                        let score = Self::extract_float(&pair[0])?;
                        let member = Self::extract_string(&pair[1])?;
                        Ok((score, member))
                    })
                    .collect::<Result<Vec<_>, String>>()?;
                Ok(Command::ZAdd { key, pairs })
            }
            "ZRANGEBYSCORE" => {
                require_at_least(3)?;
                let key = Self::extract_string(&args[0])?;
                let min = Self::extract_bound(&args[1])?;
                let max = Self::extract_bound(&args[2])?;
                let with_scores = match args.get(3) {
                    None => false,
                    Some(opt) if Self::extract_string(opt)?.eq_ignore_ascii_case("WITHSCORES") => {
                        true
                    }
                    Some(_) => return Err("ERR syntax error".to_string()),
                };
                if args.len() > 4 {
                    return Err("ERR syntax error".to_string());
                }
                Ok(Command::ZRangeByScore {
                    key,
                    min,
                    max,
                    with_scores,
                })
            }
            "ZREMRANGEBYSCORE" => {
                require(3)?;
                let key = Self::extract_string(&args[0])?;
                let min = Self::extract_bound(&args[1])?;
                let max = Self::extract_bound(&args[2])?;
                Ok(Command::ZRemRangeByScore { key, min, max })
            }
            "ZCARD" => {
                require(1)?;
                Ok(Command::ZCard(Self::extract_string(&args[0])?))
            }
            "SADD" => {
                require_at_least(2)?;
                let key = Self::extract_string(&args[0])?;
                let members = Self::extract_strings(&args[1..])?;
                Ok(Command::SAdd(key, members))
            }
            "SMEMBERS" => {
                require(1)?;
                Ok(Command::SMembers(Self::extract_string(&args[0])?))
            }
            "DBSIZE" => {
                require(0)?;
                Ok(Command::DbSize)
            }
            "FLUSHALL" | "FLUSHDB" => Ok(Command::FlushAll),
            "MULTI" => {
                require(0)?;
                Ok(Command::Multi)
            }
            "EXEC" => {
                require(0)?;
                Ok(Command::Exec)
            }
            "DISCARD" => {
                require(0)?;
                Ok(Command::Discard)
            }
            _ => Err(format!(
                "ERR unknown command '{}'",
                cmd_name.to_lowercase()
            )),
        }
    }

    fn extract_string(value: &RespValue) -> Result<String, String> {
        match value {
            RespValue::BulkString(Some(data)) => Ok(String::from_utf8_lossy(data).to_string()),
            _ => Err("Expected bulk string".to_string()),
        }
    }

    fn extract_strings(values: &[RespValue]) -> Result<Vec<String>, String> {
        values.iter().map(Self::extract_string).collect()
    }

    fn extract_float(value: &RespValue) -> Result<f64, String> {
        let parsed = match value {
            RespValue::BulkString(Some(data)) => String::from_utf8_lossy(data).parse::<f64>().ok(),
            _ => None,
        };
        match parsed {
            Some(score) if !score.is_nan() => Ok(score),
            _ => Err("ERR value is not a valid float".to_string()),
        }
    }

    fn extract_i64(value: &RespValue) -> Result<i64, String> {
        match value {
            RespValue::BulkString(Some(data)) => {
                let s = String::from_utf8_lossy(data);
                s.parse::<i64>()
                    .map_err(|_| "ERR value is not an integer or out of range".to_string())
            }
            RespValue::Integer(n) => Ok(*n),
            _ => Err("ERR value is not an integer or out of range".to_string()),
        }
    }

    fn extract_bound(value: &RespValue) -> Result<ScoreBound, String> {
        Self::extract_string(value)?.parse()
    }
}
