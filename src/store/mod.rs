//! Multi-resolution time-series store.
//!
//! `TimeSeriesStore` owns only its retention table; all state lives in the
//! backend. Operations are split across files by the structure they touch:
//!
//! - `counter_ops.rs`: counter samples and accumulator drains
//! - `series_ops.rs`: timer samples, range reads and truncation
//! - `raw_ops.rs`: raw sample buffers for aggregation
//! - `registry_ops.rs`: the datapoint registry
//! - `report.rs`: per-tier outcome of multi-tier writes

mod counter_ops;
mod raw_ops;
mod registry_ops;
mod report;
mod series_ops;

pub use registry_ops::Datapoints;
pub use report::{TierOutcome, TierResult, TierWriteReport};
pub use series_ops::SeriesRead;

use crate::backend::Backend;
use crate::error::Result;
use crate::retention::RetentionTable;
use tracing::debug;

pub struct TimeSeriesStore<B: Backend> {
    backend: B,
    retentions: RetentionTable,
}

impl<B: Backend> TimeSeriesStore<B> {
    pub fn new(backend: B, retentions: RetentionTable) -> Self {
        debug!(tiers = retentions.len(), "time-series store created");
        TimeSeriesStore {
            backend,
            retentions,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn retentions(&self) -> &RetentionTable {
        &self.retentions
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Read and delete `key` in one atomic step.
    ///
    /// Concurrent drains of the same key never both see the value. `None`
    /// means the key was absent (never written, expired or already drained).
    pub fn drain_and_clear(&self, key: &str) -> Result<Option<String>> {
        let value = self.backend.get_del(key)?;
        debug!(key, found = value.is_some(), "drained key");
        Ok(value)
    }
}
