//! Datapoint registry: the set of every metric name ever written.

use super::TimeSeriesStore;
use crate::backend::Backend;
use crate::encoding::{decode_registry_entry, encode_registry_entry, MetricKind, DATAPOINTS_KEY};
use crate::error::{DecodeError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Registered datapoints, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Datapoints {
    pub entries: BTreeMap<String, MetricKind>,
    /// Entries with an unknown kind tag
    #[serde(skip)]
    pub rejected: Vec<DecodeError>,
}

impl Datapoints {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn kind(&self, name: &str) -> Option<MetricKind> {
        self.entries.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<B: Backend> TimeSeriesStore<B> {
    /// Register `metric`, inferring its kind from the name. Idempotent.
    /// Returns true the first time.
    pub fn register_datapoint(&self, metric: &str) -> Result<bool> {
        self.register_datapoint_as(metric, MetricKind::infer(metric))
    }

    /// Register `metric` with an explicit kind. Idempotent.
    pub fn register_datapoint_as(&self, metric: &str, kind: MetricKind) -> Result<bool> {
        let added = self
            .backend
            .sadd(DATAPOINTS_KEY, &encode_registry_entry(metric, kind))?;
        if added {
            debug!(metric, kind = %kind, "datapoint registered");
        }
        Ok(added)
    }

    /// Every registered datapoint; gauges only when `include_gauges`.
    ///
    /// A name registered under several kinds is reported once, with the
    /// first kind in tag order (counter, timer, gauge).
    pub fn list_datapoints(&self, include_gauges: bool) -> Result<Datapoints> {
        let mut members = self.backend.smembers(DATAPOINTS_KEY)?;
        members.sort_unstable();

        let mut datapoints = Datapoints::default();
        for member in &members {
            match decode_registry_entry(member) {
                Ok((_, MetricKind::Gauge)) if !include_gauges => {}
                Ok((name, kind)) => {
                    let slot = datapoints.entries.entry(name).or_insert(kind);
                    *slot = (*slot).min(kind);
                }
                Err(err) => datapoints.rejected.push(err),
            }
        }

        if !datapoints.rejected.is_empty() {
            warn!(
                rejected = datapoints.rejected.len(),
                "registry contains malformed entries"
            );
        }
        Ok(datapoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::retention::RetentionTable;
    use std::time::Duration;

    fn store() -> TimeSeriesStore<MemoryBackend> {
        let retentions = RetentionTable::from_intervals([Duration::from_secs(10)]).unwrap();
        TimeSeriesStore::new(MemoryBackend::new(), retentions)
    }

    #[test]
    fn test_register_is_idempotent() {
        let store = store();
        assert!(store.register_datapoint("hits").unwrap());
        assert!(!store.register_datapoint("hits").unwrap());
        assert_eq!(store.list_datapoints(true).unwrap().len(), 1);
    }

    #[test]
    fn test_gauges_filtered_by_kind() {
        let store = store();
        store.register_datapoint("hits").unwrap();
        store.register_datapoint("timer.lat").unwrap();
        store.register_datapoint("gauge.mem").unwrap();
        store
            .register_datapoint_as("queue_depth", MetricKind::Gauge)
            .unwrap();

        let without = store.list_datapoints(false).unwrap();
        assert_eq!(without.names().collect::<Vec<_>>(), vec!["hits", "timer.lat"]);
        assert_eq!(without.kind("timer.lat"), Some(MetricKind::Timer));

        let with = store.list_datapoints(true).unwrap();
        assert_eq!(with.len(), 4);
        assert_eq!(with.kind("queue_depth"), Some(MetricKind::Gauge));
    }

    #[test]
    fn test_legacy_untagged_entries() {
        let store = store();
        store.backend().sadd(DATAPOINTS_KEY, "gauges.cpu").unwrap();
        store.backend().sadd(DATAPOINTS_KEY, "requests").unwrap();

        let listed = store.list_datapoints(false).unwrap();
        assert_eq!(listed.names().collect::<Vec<_>>(), vec!["requests"]);
    }

    #[test]
    fn test_unknown_tag_rejected_rest_listed() {
        let store = store();
        store.register_datapoint("hits").unwrap();
        store.backend().sadd(DATAPOINTS_KEY, "z<X>weird").unwrap();

        let listed = store.list_datapoints(true).unwrap();
        assert!(listed.contains("hits"));
        assert_eq!(
            listed.rejected,
            vec![DecodeError::UnknownKind {
                entry: "z<X>weird".into(),
                tag: "z".into()
            }]
        );
    }

    #[test]
    fn test_duplicate_kinds_resolve_to_first_tag() {
        let store = store();
        store.register_datapoint_as("x", MetricKind::Timer).unwrap();
        store.register_datapoint_as("x", MetricKind::Counter).unwrap();
        assert_eq!(
            store.list_datapoints(true).unwrap().kind("x"),
            Some(MetricKind::Counter)
        );
    }
}
