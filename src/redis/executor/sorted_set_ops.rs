//! Sorted set command implementations for CommandExecutor.
//!
//! Handles: ZADD, ZRANGEBYSCORE, ZREMRANGEBYSCORE, ZCARD

use super::CommandExecutor;
use crate::error::{BackendError, BackendResult};
use crate::redis::data::{RedisSortedSet, ScoreBound, Value};

impl CommandExecutor {
    fn sorted_set(&mut self, key: &str) -> BackendResult<Option<&RedisSortedSet>> {
        match self.get_value(key) {
            Some(Value::SortedSet(zs)) => Ok(Some(zs)),
            Some(_) => Err(BackendError::WrongType {
                key: key.to_string(),
            }),
            None => Ok(None),
        }
    }

    /// ZADD. Returns the number of members that were new.
    pub fn zadd(&mut self, key: &str, pairs: &[(f64, String)]) -> BackendResult<usize> {
        debug_assert!(!pairs.is_empty(), "Precondition: ZADD needs at least one pair");

        if self.get_value(key).is_none() {
            self.data
                .insert(key.to_string(), Value::SortedSet(RedisSortedSet::new()));
        }
        let zset = match self.data.get_mut(key) {
            Some(Value::SortedSet(zs)) => zs,
            _ => {
                return Err(BackendError::WrongType {
                    key: key.to_string(),
                })
            }
        };

        let added = pairs
            .iter()
            .filter(|(score, member)| zset.add(member, *score))
            .count();

        // TigerStyle: Postcondition
        debug_assert!(
            pairs.iter().all(|(_, m)| zset.score(m).is_some()),
            "Postcondition violated: every ZADD member must be present"
        );
        Ok(added)
    }

    pub fn zrange_by_score(
        &mut self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
    ) -> BackendResult<Vec<(String, f64)>> {
        Ok(self
            .sorted_set(key)?
            .map(|zs| zs.range_by_score(min, max))
            .unwrap_or_default())
    }

    /// ZREMRANGEBYSCORE. An emptied set is removed, as Redis does.
    pub fn zrem_range_by_score(
        &mut self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
    ) -> BackendResult<usize> {
        let (removed, now_empty) = match self.get_value_mut(key) {
            Some(Value::SortedSet(zs)) => {
                let removed = zs.remove_range_by_score(min, max);
                (removed, zs.is_empty())
            }
            Some(_) => {
                return Err(BackendError::WrongType {
                    key: key.to_string(),
                })
            }
            None => return Ok(0),
        };

        if now_empty {
            self.remove_key(key);
        }
        Ok(removed)
    }

    pub fn zcard(&mut self, key: &str) -> BackendResult<usize> {
        Ok(self.sorted_set(key)?.map_or(0, RedisSortedSet::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(f64, &str)]) -> Vec<(f64, String)> {
        items.iter().map(|(s, m)| (*s, m.to_string())).collect()
    }

    #[test]
    fn test_zadd_counts_new_members() {
        let mut exec = CommandExecutor::new();
        assert_eq!(exec.zadd("z", &pairs(&[(1.0, "a"), (2.0, "b")])).unwrap(), 2);
        assert_eq!(exec.zadd("z", &pairs(&[(3.0, "a"), (4.0, "c")])).unwrap(), 1);
        assert_eq!(exec.zcard("z").unwrap(), 3);
    }

    #[test]
    fn test_zrange_missing_key_is_empty() {
        let mut exec = CommandExecutor::new();
        let range = exec
            .zrange_by_score("nope", ScoreBound::NegInfinity, ScoreBound::PosInfinity)
            .unwrap();
        assert!(range.is_empty());
    }

    #[test]
    fn test_zrem_range_removes_emptied_key() {
        let mut exec = CommandExecutor::new();
        exec.zadd("z", &pairs(&[(10.0, "a"), (20.0, "b")])).unwrap();

        let removed = exec
            .zrem_range_by_score("z", ScoreBound::Inclusive(0.0), ScoreBound::Inclusive(20.0))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(exec.exists(&["z".to_string()]), 0);
    }

    #[test]
    fn test_zadd_against_string_is_wrong_type() {
        let mut exec = CommandExecutor::new();
        exec.set("s", "v", false, None);
        assert!(matches!(
            exec.zadd("s", &pairs(&[(1.0, "a")])),
            Err(BackendError::WrongType { .. })
        ));
    }
}
