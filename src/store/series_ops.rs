//! Point series: timer samples, range reads and truncation.

use super::TimeSeriesStore;
use crate::backend::Backend;
use crate::encoding::{encode_member, format_sample, SeriesPoint};
use crate::error::{DecodeError, Result};
use crate::redis::ScoreBound;
use serde::Serialize;
use tracing::{debug, warn};

/// Result of a range read: decoded points in ascending timestamp order, plus
/// one error per member that could not be decoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesRead {
    pub points: Vec<SeriesPoint>,
    #[serde(skip)]
    pub errors: Vec<DecodeError>,
}

impl SeriesRead {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl<B: Backend> TimeSeriesStore<B> {
    /// Append one timer sample to the `metric` series.
    pub fn write_timer_sample(&self, timestamp: i64, metric: &str, value: f64) -> Result<()> {
        let member = encode_member(timestamp, &format_sample(value));
        self.backend.zadd(metric, timestamp as f64, &member)?;
        debug!(metric, timestamp, value, "timer sample written");
        Ok(())
    }

    /// Remove every point with timestamp in `[0, since]`. Returns how many
    /// were removed; repeating the call removes nothing more.
    pub fn truncate_series(&self, metric: &str, since: i64) -> Result<usize> {
        let removed = self.backend.zrem_range_by_score(
            metric,
            ScoreBound::Inclusive(0.0),
            ScoreBound::Inclusive(since as f64),
        )?;
        debug!(metric, since, removed, "series truncated");
        Ok(removed)
    }

    /// Points with timestamp in `[begin, end]`, ascending.
    pub fn read_series(&self, metric: &str, begin: i64, end: i64) -> Result<SeriesRead> {
        let members = self.backend.zrange_by_score(
            metric,
            ScoreBound::Inclusive(begin as f64),
            ScoreBound::Inclusive(end as f64),
        )?;

        let mut read = SeriesRead {
            points: Vec::with_capacity(members.len()),
            errors: Vec::new(),
        };
        for member in &members {
            match SeriesPoint::decode(member) {
                Ok(point) => read.points.push(point),
                Err(err) => read.errors.push(err),
            }
        }

        if !read.errors.is_empty() {
            warn!(
                metric,
                undecodable = read.errors.len(),
                "series contains malformed members"
            );
        }

        // TigerStyle: Postcondition
        debug_assert!(
            read.points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
            "Postcondition violated: points must be in timestamp order"
        );
        Ok(read)
    }
}
