//! Multi-resolution time-series storage over a Redis-model backend.
//!
//! Counter and timer samples are written once and fanned out to every
//! retention tier: the finest tier keeps each sample as a point in a sorted
//! set, coarser tiers fold samples into expiring accumulators that a rollup
//! job drains once per interval.

pub mod backend;
pub mod clock;
pub mod config;
pub mod encoding;
pub mod error;
pub mod observability;
pub mod redis;
pub mod retention;
pub mod server;
pub mod store;
pub mod store_dst;

pub use backend::{Backend, FaultConfig, FaultyBackend, KeyTtl, MemoryBackend, RemoteBackend, RemoteConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BackendConfig, RetentionConfig, TierstoreConfig};
pub use encoding::{MetricKind, RawSamples, SeriesPoint, DELIMITER};
pub use error::{BackendError, BackendResult, ConfigError, DecodeError, Result, StoreError};
pub use retention::{RetentionTable, RetentionTier};
pub use store::{Datapoints, SeriesRead, TierOutcome, TierWriteReport, TimeSeriesStore};
