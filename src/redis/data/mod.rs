//! Redis data structures module
//!
//! The value types the keyspace needs for time-series storage:
//! - `Value`: Union type for all stored values
//! - `RedisSet`: Unordered set of unique strings (datapoint registry)
//! - `RedisSortedSet`: Score-ordered set (point series)

mod set;
mod sorted_set;
mod value;

pub use set::RedisSet;
pub use sorted_set::{RedisSortedSet, ScoreBound};
pub use value::Value;
