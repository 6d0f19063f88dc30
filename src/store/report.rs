//! Per-tier outcome of a multi-tier write.

use crate::error::{BackendError, BackendResult, StoreError};
use std::fmt;
use tracing::warn;

#[derive(Debug)]
pub enum TierOutcome {
    Committed,
    Failed(BackendError),
}

impl TierOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, TierOutcome::Committed)
    }
}

/// One tier's line in a [`TierWriteReport`].
#[derive(Debug)]
pub struct TierResult {
    pub tier: usize,
    /// Key the tier wrote to (series key or accumulator key)
    pub key: String,
    pub outcome: TierOutcome,
}

/// Which tiers of a single sample write reached the backend.
///
/// Tiers are attempted in order and a failure on one does not stop the
/// others, so any subset may have committed.
#[derive(Debug)]
pub struct TierWriteReport {
    metric: String,
    tiers: Vec<TierResult>,
}

impl TierWriteReport {
    pub fn new(metric: impl Into<String>) -> Self {
        TierWriteReport {
            metric: metric.into(),
            tiers: Vec::new(),
        }
    }

    pub fn record<T>(&mut self, tier: usize, key: impl Into<String>, result: BackendResult<T>) {
        debug_assert!(
            self.tiers.last().map_or(true, |last| last.tier < tier),
            "Precondition: tiers must be recorded in ascending order"
        );
        let outcome = match result {
            Ok(_) => TierOutcome::Committed,
            Err(err) => TierOutcome::Failed(err),
        };
        self.tiers.push(TierResult {
            tier,
            key: key.into(),
            outcome,
        });
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn tiers(&self) -> &[TierResult] {
        &self.tiers
    }

    /// Indices of the tiers that committed.
    pub fn committed(&self) -> Vec<usize> {
        self.tiers
            .iter()
            .filter(|t| t.outcome.is_committed())
            .map(|t| t.tier)
            .collect()
    }

    /// Indices of the tiers that failed.
    pub fn failed(&self) -> Vec<usize> {
        self.tiers
            .iter()
            .filter(|t| !t.outcome.is_committed())
            .map(|t| t.tier)
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.tiers.iter().all(|t| t.outcome.is_committed())
    }

    /// `Ok` when every tier committed, the first backend error unchanged when
    /// none did, `PartialTierWrite` otherwise.
    pub fn into_result(self) -> Result<(), StoreError> {
        if self.is_complete() {
            return Ok(());
        }

        if self.committed().is_empty() {
            let first = self.tiers.into_iter().find_map(|t| match t.outcome {
                TierOutcome::Failed(err) => Some(err),
                TierOutcome::Committed => None,
            });
            // Not complete and nothing committed means at least one failure.
            return match first {
                Some(err) => Err(StoreError::Backend(err)),
                None => Ok(()),
            };
        }

        warn!(
            metric = %self.metric,
            committed = ?self.committed(),
            failed = ?self.failed(),
            "partial tier write"
        );
        Err(StoreError::PartialTierWrite(self))
    }
}

impl fmt::Display for TierWriteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "metric '{}':", self.metric)?;
        for (i, t) in self.tiers.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            match &t.outcome {
                TierOutcome::Committed => write!(f, "{}tier {} committed", sep, t.tier)?,
                TierOutcome::Failed(err) => write!(f, "{}tier {} failed ({})", sep, t.tier, err)?,
            }
        }
        Ok(())
    }
}
