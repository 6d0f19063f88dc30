//! Error types for the time-series store and its backends.

use crate::store::TierWriteReport;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Result alias for raw backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Errors raised by a [`Backend`](crate::backend::Backend) implementation.
///
/// Transport failures are reported as `Unavailable` and are never retried by
/// this crate; the caller owns the retry policy.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Connection or transport failure.
    #[error("backend unavailable: {0}")]
    Unavailable(#[from] std::io::Error),

    /// The key holds a value of a different type than the operation expects.
    #[error("WRONGTYPE key '{key}' holds the wrong kind of value")]
    WrongType { key: String },

    /// INCRBY against a value that is not a 64-bit integer.
    #[error("value at key '{key}' is not an integer or out of range")]
    NotAnInteger { key: String },

    /// INCRBY would overflow a 64-bit integer.
    #[error("increment on key '{key}' would overflow")]
    Overflow { key: String },

    /// The peer sent something that is not valid RESP or not the expected reply shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with an error reply we don't map to a typed variant.
    #[error("server error: {0}")]
    Server(String),
}

impl BackendError {
    /// True for transport failures, where the caller may retry on a fresh connection.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}

/// A stored member, buffer segment or registry entry that does not match the
/// expected encoding. Reported per item, never aborting the surrounding read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("series member {member:?} is missing the <X> delimiter")]
    MissingDelimiter { member: String },

    #[error("series member {member:?} has a non-integer timestamp")]
    InvalidTimestamp { member: String },

    #[error("raw sample segment {segment:?} is not a number")]
    InvalidSample { segment: String },

    #[error("registry entry {entry:?} has unknown kind tag {tag:?}")]
    UnknownKind { entry: String, tag: String },

    #[error("accumulator {key:?} holds non-integer value {value:?}")]
    InvalidCounter { key: String, value: String },
}

/// Errors returned by [`TimeSeriesStore`](crate::store::TimeSeriesStore).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend failure, passed through unchanged.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A multi-tier write committed on some tiers but not all of them.
    #[error("partial tier write: {0}")]
    PartialTierWrite(TierWriteReport),

    /// A single value read back could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl StoreError {
    /// The tier report when this is a partial write.
    pub fn tier_report(&self) -> Option<&TierWriteReport> {
        match self {
            StoreError::PartialTierWrite(report) => Some(report),
            _ => None,
        }
    }
}

/// Configuration errors: invalid retention tables and unreadable config files.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("retention table must contain at least one tier")]
    EmptyRetentions,

    #[error("retention tier {index} has a zero interval")]
    ZeroInterval { index: usize },

    #[error("retention tier {index} interval {interval_secs}s must be coarser than tier {previous} ({previous_secs}s)")]
    NotIncreasing {
        index: usize,
        interval_secs: u64,
        previous: usize,
        previous_secs: u64,
    },

    #[error("retention tier {index} interval must be a whole number of seconds")]
    FractionalInterval { index: usize },

    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
