//! String command implementations for CommandExecutor.
//!
//! Handles: GET, SET, INCRBY, APPEND, GETDEL and the joined append used by raw
//! sample buffers.
//!
//! # TigerStyle Invariants
//!
//! - SET without PX clears any existing deadline; INCRBY and APPEND keep it
//! - GETDEL leaves neither the value nor its deadline behind

use super::CommandExecutor;
use crate::error::{BackendError, BackendResult};
use crate::redis::data::Value;

impl CommandExecutor {
    pub fn get(&mut self, key: &str) -> BackendResult<Option<String>> {
        match self.get_value(key) {
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(BackendError::WrongType {
                key: key.to_string(),
            }),
            None => Ok(None),
        }
    }

    /// SET with optional NX and PX. Returns false when NX suppressed the write.
    pub fn set(&mut self, key: &str, value: &str, nx: bool, px: Option<i64>) -> bool {
        if nx && self.get_value(key).is_some() {
            return false;
        }

        self.data
            .insert(key.to_string(), Value::String(value.to_string()));
        match px {
            Some(ms) if ms > 0 => {
                let deadline = self.current_time_ms.saturating_add(ms as u64);
                self.expirations.insert(key.to_string(), deadline);
            }
            _ => {
                self.expirations.remove(key);
            }
        }

        // TigerStyle: Postconditions
        debug_assert!(
            self.data.contains_key(key),
            "Postcondition violated: SET must store key"
        );
        debug_assert!(
            px.is_some() || !self.expirations.contains_key(key),
            "Postcondition violated: SET without PX must clear deadline"
        );
        true
    }

    /// INCRBY. Missing keys start at zero.
    pub fn incr_by(&mut self, key: &str, delta: i64) -> BackendResult<i64> {
        let current = match self.get_value(key) {
            Some(Value::String(s)) => s.parse::<i64>().map_err(|_| BackendError::NotAnInteger {
                key: key.to_string(),
            })?,
            Some(_) => {
                return Err(BackendError::WrongType {
                    key: key.to_string(),
                })
            }
            None => 0,
        };

        let next = current
            .checked_add(delta)
            .ok_or_else(|| BackendError::Overflow {
                key: key.to_string(),
            })?;
        self.data
            .insert(key.to_string(), Value::String(next.to_string()));
        Ok(next)
    }

    /// APPEND. Returns the new length in bytes.
    pub fn append(&mut self, key: &str, suffix: &str) -> BackendResult<usize> {
        match self.get_value_mut(key) {
            Some(Value::String(s)) => {
                s.push_str(suffix);
                Ok(s.len())
            }
            Some(_) => Err(BackendError::WrongType {
                key: key.to_string(),
            }),
            None => {
                self.data
                    .insert(key.to_string(), Value::String(suffix.to_string()));
                Ok(suffix.len())
            }
        }
    }

    /// Append `chunk`, preceded by `delimiter` only when the key already holds
    /// a value. Returns the new length in bytes.
    pub fn append_joined(
        &mut self,
        key: &str,
        chunk: &str,
        delimiter: &str,
    ) -> BackendResult<usize> {
        match self.get_value_mut(key) {
            Some(Value::String(s)) => {
                s.reserve(delimiter.len() + chunk.len());
                s.push_str(delimiter);
                s.push_str(chunk);
                Ok(s.len())
            }
            Some(_) => Err(BackendError::WrongType {
                key: key.to_string(),
            }),
            None => {
                self.data
                    .insert(key.to_string(), Value::String(chunk.to_string()));
                Ok(chunk.len())
            }
        }
    }

    /// GETDEL: read and remove in one step.
    pub fn get_del(&mut self, key: &str) -> BackendResult<Option<String>> {
        match self.get_value(key) {
            Some(Value::String(_)) => {}
            Some(_) => {
                return Err(BackendError::WrongType {
                    key: key.to_string(),
                })
            }
            None => return Ok(None),
        }

        let taken = match self.remove_key(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };

        // TigerStyle: Postconditions
        debug_assert!(
            !self.data.contains_key(key) && !self.expirations.contains_key(key),
            "Postcondition violated: GETDEL must remove key and deadline"
        );
        Ok(taken)
    }
}
