//! Set command implementations for CommandExecutor.
//!
//! Handles: SADD, SMEMBERS

use super::CommandExecutor;
use crate::error::{BackendError, BackendResult};
use crate::redis::data::{RedisSet, Value};

impl CommandExecutor {
    /// SADD. Returns the number of members that were new.
    pub fn sadd(&mut self, key: &str, members: &[String]) -> BackendResult<usize> {
        if self.get_value(key).is_none() {
            self.data.insert(key.to_string(), Value::Set(RedisSet::new()));
        }
        match self.data.get_mut(key) {
            Some(Value::Set(set)) => Ok(members.iter().filter(|m| set.add(m)).count()),
            _ => Err(BackendError::WrongType {
                key: key.to_string(),
            }),
        }
    }

    /// SMEMBERS, in arbitrary order.
    pub fn smembers(&mut self, key: &str) -> BackendResult<Vec<String>> {
        match self.get_value(key) {
            Some(Value::Set(set)) => Ok(set.members()),
            Some(_) => Err(BackendError::WrongType {
                key: key.to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }
}
