//! Raw timer samples buffered per coarse tier for later aggregation.

use super::{TierWriteReport, TimeSeriesStore};
use crate::backend::Backend;
use crate::encoding::{join_samples, RawSamples, DELIMITER};
use crate::error::Result;
use crate::retention::RetentionTier;
use tracing::{debug, warn};

impl<B: Backend> TimeSeriesStore<B> {
    /// Append `values` to the raw buffer of every coarse tier.
    ///
    /// Tier 0 is skipped. Each buffer is joined onto with the delimiter and its
    /// TTL restarts at twice the tier interval. An empty slice writes nothing.
    pub fn write_raw_samples_for_aggregation(&self, metric: &str, values: &[f64]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }

        let chunk = join_samples(values);
        let mut report = TierWriteReport::new(metric);
        for tier in self.retentions.coarse() {
            let key = tier.accumulator_key(metric);
            let result =
                self.backend
                    .append_joined_expire(&key, &chunk, DELIMITER, tier.accumulator_ttl());
            report.record(tier.index(), key, result);
        }

        debug!(metric, samples = values.len(), "raw samples buffered");
        report.into_result()
    }

    /// Drain the raw buffer of `metric` at `tier`.
    pub fn drain_raw_samples(&self, metric: &str, tier: &RetentionTier) -> Result<Option<RawSamples>> {
        debug_assert!(!tier.is_finest(), "Precondition: tier 0 has no raw buffer");

        let key = tier.accumulator_key(metric);
        let Some(buffer) = self.drain_and_clear(&key)? else {
            return Ok(None);
        };

        let samples = RawSamples::decode(&buffer);
        if !samples.errors.is_empty() {
            warn!(
                key = %key,
                undecodable = samples.errors.len(),
                "raw buffer contains malformed samples"
            );
        }
        Ok(Some(samples))
    }
}
