//! Retention tiers.
//!
//! Tier 0 is the finest resolution and matches the ingestion flush interval.
//! Every further tier is strictly coarser. The table is validated once at
//! construction and never changes afterwards.

use crate::error::ConfigError;
use std::time::Duration;

/// A single retention granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionTier {
    index: usize,
    interval: Duration,
    /// Number of intervals kept by the rollup path; 0 means unbounded.
    samples: u64,
}

impl RetentionTier {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn is_finest(&self) -> bool {
        self.index == 0
    }

    /// Key of this tier's accumulator or raw buffer for `metric`.
    pub fn accumulator_key(&self, metric: &str) -> String {
        format!("{}:{}", metric, self.interval.as_secs())
    }

    /// Expiry applied to accumulators and raw buffers: twice the interval.
    pub fn accumulator_ttl(&self) -> Duration {
        self.interval * 2
    }

    /// Time covered by the retained samples, `None` when unbounded.
    pub fn span(&self) -> Option<Duration> {
        if self.samples == 0 {
            None
        } else {
            Some(Duration::from_secs(
                self.interval.as_secs().saturating_mul(self.samples),
            ))
        }
    }

    /// Latest timestamp (epoch seconds) that has fallen out of this tier's
    /// window at `now`. Feed it to `truncate_series`.
    pub fn truncation_threshold(&self, now: i64) -> Option<i64> {
        let span = self.span()?.as_secs();
        let span = i64::try_from(span).unwrap_or(i64::MAX);
        Some(now.saturating_sub(span))
    }
}

/// Ordered, validated list of retention tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionTable {
    tiers: Vec<RetentionTier>,
}

impl RetentionTable {
    /// Build a table from `(interval, samples)` pairs, finest first.
    pub fn new<I>(tiers: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (Duration, u64)>,
    {
        let tiers: Vec<RetentionTier> = tiers
            .into_iter()
            .enumerate()
            .map(|(index, (interval, samples))| RetentionTier {
                index,
                interval,
                samples,
            })
            .collect();

        if tiers.is_empty() {
            return Err(ConfigError::EmptyRetentions);
        }

        for tier in &tiers {
            if tier.interval.is_zero() {
                return Err(ConfigError::ZeroInterval { index: tier.index });
            }
            if tier.interval.subsec_nanos() != 0 {
                return Err(ConfigError::FractionalInterval { index: tier.index });
            }
        }

        for pair in tiers.windows(2) {
            if pair[1].interval <= pair[0].interval {
                return Err(ConfigError::NotIncreasing {
                    index: pair[1].index,
                    interval_secs: pair[1].interval.as_secs(),
                    previous: pair[0].index,
                    previous_secs: pair[0].interval.as_secs(),
                });
            }
        }

        debug_assert!(tiers.iter().enumerate().all(|(i, t)| t.index == i));
        Ok(RetentionTable { tiers })
    }

    /// Build a table from intervals alone, with unbounded sample counts.
    pub fn from_intervals<I>(intervals: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = Duration>,
    {
        Self::new(intervals.into_iter().map(|interval| (interval, 0)))
    }

    /// Tier 0, the flush interval.
    pub fn finest(&self) -> &RetentionTier {
        // Construction rejects empty tables.
        &self.tiers[0]
    }

    pub fn tier(&self, index: usize) -> Option<&RetentionTier> {
        self.tiers.get(index)
    }

    /// Tiers 1..N, the ones backed by accumulators and raw buffers.
    pub fn coarse(&self) -> &[RetentionTier] {
        &self.tiers[1..]
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RetentionTier> {
        self.tiers.iter()
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl<'a> IntoIterator for &'a RetentionTable {
    type Item = &'a RetentionTier;
    type IntoIter = std::slice::Iter<'a, RetentionTier>;

    fn into_iter(self) -> Self::IntoIter {
        self.tiers.iter()
    }
}
