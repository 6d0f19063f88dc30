//! Counter samples.
//!
//! Tier 0 keeps every sample as a series point; coarser tiers fold samples
//! into a running total that the rollup drains once per interval.

use super::{TierWriteReport, TimeSeriesStore};
use crate::backend::Backend;
use crate::encoding::encode_member;
use crate::error::{DecodeError, Result, StoreError};
use crate::retention::RetentionTier;
use tracing::{debug, warn};

impl<B: Backend> TimeSeriesStore<B> {
    /// Record one counter sample on every tier.
    ///
    /// Tier 0 gets the point `(timestamp, value)` in the `metric` series. Each
    /// coarser tier adds `value` to `metric:<interval>` and restarts its TTL at
    /// twice the interval. All tiers are attempted; if only some commit the
    /// error is `PartialTierWrite` with the per-tier outcome.
    pub fn write_counter_sample(&self, timestamp: i64, metric: &str, value: i64) -> Result<()> {
        let mut report = TierWriteReport::new(metric);

        for tier in self.retentions.iter() {
            if tier.is_finest() {
                let member = encode_member(timestamp, &value.to_string());
                let result = self.backend.zadd(metric, timestamp as f64, &member);
                report.record(tier.index(), metric, result);
            } else {
                let key = tier.accumulator_key(metric);
                let result = self
                    .backend
                    .incr_by_expire(&key, value, tier.accumulator_ttl());
                report.record(tier.index(), key, result);
            }
        }

        debug!(metric, timestamp, value, "counter sample written");
        report.into_result()
    }

    /// Drain the accumulator of `metric` at `tier`, returning its total.
    ///
    /// The accumulator is gone afterwards even when its contents fail to
    /// parse; the decode error carries the raw value.
    pub fn drain_counter(&self, metric: &str, tier: &RetentionTier) -> Result<Option<i64>> {
        debug_assert!(
            !tier.is_finest(),
            "Precondition: tier 0 has no accumulator"
        );

        let key = tier.accumulator_key(metric);
        let Some(raw) = self.drain_and_clear(&key)? else {
            return Ok(None);
        };

        match raw.parse::<i64>() {
            Ok(total) => Ok(Some(total)),
            Err(_) => {
                let err = DecodeError::InvalidCounter { key, value: raw };
                warn!(error = %err, "undecodable accumulator drained");
                Err(StoreError::Decode(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{KeyTtl, MemoryBackend};
    use crate::retention::RetentionTable;
    use std::time::Duration;

    fn store() -> TimeSeriesStore<MemoryBackend> {
        let retentions = RetentionTable::from_intervals([
            Duration::from_secs(10),
            Duration::from_secs(60),
            Duration::from_secs(300),
        ])
        .unwrap();
        TimeSeriesStore::new(MemoryBackend::new(), retentions)
    }

    #[test]
    fn test_counter_sample_fans_out_to_tiers() {
        let store = store();
        store.write_counter_sample(100, "hits", 5).unwrap();

        let members = store
            .backend()
            .zrange_by_score(
                "hits",
                crate::redis::ScoreBound::NegInfinity,
                crate::redis::ScoreBound::PosInfinity,
            )
            .unwrap();
        assert_eq!(members, vec!["100<X>5"]);
        assert_eq!(store.backend().get("hits:60").unwrap(), Some("5".into()));
        assert_eq!(store.backend().get("hits:300").unwrap(), Some("5".into()));
        assert!(matches!(
            store.backend().pttl("hits:10").unwrap(),
            KeyTtl::Missing
        ));
    }

    #[test]
    fn test_drain_counter_sums_once() {
        let store = store();
        for (ts, v) in [(100, 1), (101, 2), (102, 3)] {
            store.write_counter_sample(ts, "hits", v).unwrap();
        }

        let tier = *store.retentions().tier(1).unwrap();
        assert_eq!(store.drain_counter("hits", &tier).unwrap(), Some(6));
        assert_eq!(store.drain_counter("hits", &tier).unwrap(), None);
    }

    #[test]
    fn test_drain_counter_rejects_garbage() {
        let store = store();
        store.backend().set("hits:60", "lots", None).unwrap();

        let tier = *store.retentions().tier(1).unwrap();
        let err = store.drain_counter("hits", &tier).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Decode(DecodeError::InvalidCounter { .. })
        ));
        assert_eq!(store.backend().get("hits:60").unwrap(), None);
    }
}
