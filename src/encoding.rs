//! Stored value formats.
//!
//! Format version 1:
//!
//! - series member: `<timestamp><X><value>`, scored by the timestamp
//! - raw sample buffer: `<v1><X><v2><X>...`; later appends join with `<X>`
//! - registry entry: `<kind><X><name>` with kind `c`, `t` or `g`
//!
//! Timestamps are decimal epoch seconds and values are decimal numbers, so the
//! delimiter can never occur inside either.

use crate::error::DecodeError;
use serde::Serialize;

/// Version of the formats below. Bump on any incompatible change.
pub const FORMAT_VERSION: u32 = 1;

/// Separator between fields of a member and between raw samples.
pub const DELIMITER: &str = "<X>";

/// Set holding every registered datapoint.
pub const DATAPOINTS_KEY: &str = "datapoints";

/// One decoded point of a series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: i64,
    pub value: String,
}

impl SeriesPoint {
    pub fn new(timestamp: i64, value: impl Into<String>) -> Self {
        SeriesPoint {
            timestamp,
            value: value.into(),
        }
    }

    /// Encode as an ordered-set member.
    pub fn encode(&self) -> String {
        encode_member(self.timestamp, &self.value)
    }

    /// Decode an ordered-set member.
    pub fn decode(member: &str) -> Result<Self, DecodeError> {
        let (timestamp, value) =
            member
                .split_once(DELIMITER)
                .ok_or_else(|| DecodeError::MissingDelimiter {
                    member: member.to_string(),
                })?;
        let timestamp = timestamp
            .parse::<i64>()
            .map_err(|_| DecodeError::InvalidTimestamp {
                member: member.to_string(),
            })?;
        Ok(SeriesPoint::new(timestamp, value))
    }

    pub fn value_f64(&self) -> Option<f64> {
        self.value.parse().ok()
    }
}

pub fn encode_member(timestamp: i64, value: &str) -> String {
    let mut member = String::with_capacity(24 + value.len());
    member.push_str(&timestamp.to_string());
    member.push_str(DELIMITER);
    member.push_str(value);
    member
}

/// Shortest decimal form that parses back to the same `f64` (`12.0` -> `"12"`).
pub fn format_sample(value: f64) -> String {
    value.to_string()
}

/// Join samples into one raw buffer chunk.
pub fn join_samples(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| format_sample(*v))
        .collect::<Vec<_>>()
        .join(DELIMITER)
}

/// Decoded contents of a raw sample buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSamples {
    pub values: Vec<f64>,
    pub errors: Vec<DecodeError>,
}

impl RawSamples {
    /// Split a buffer. Empty segments are skipped; a buffer recreated between
    /// the existence check and the append of a remote write starts with one.
    pub fn decode(buffer: &str) -> Self {
        let mut samples = RawSamples::default();
        for segment in buffer.split(DELIMITER).filter(|s| !s.is_empty()) {
            match segment.parse::<f64>() {
                Ok(v) => samples.values.push(v),
                Err(_) => samples.errors.push(DecodeError::InvalidSample {
                    segment: segment.to_string(),
                }),
            }
        }
        samples
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Kind tag stored with each registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Timer,
    Gauge,
}

impl MetricKind {
    pub fn tag(&self) -> &'static str {
        match self {
            MetricKind::Counter => "c",
            MetricKind::Timer => "t",
            MetricKind::Gauge => "g",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "c" => Some(MetricKind::Counter),
            "t" => Some(MetricKind::Timer),
            "g" => Some(MetricKind::Gauge),
            _ => None,
        }
    }

    /// Kind implied by the naming convention (`gauge*`, `timer*`).
    pub fn infer(name: &str) -> Self {
        if name.starts_with("gauge") {
            MetricKind::Gauge
        } else if name.starts_with("timer") {
            MetricKind::Timer
        } else {
            MetricKind::Counter
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MetricKind::Counter => "counter",
            MetricKind::Timer => "timer",
            MetricKind::Gauge => "gauge",
        };
        f.write_str(name)
    }
}

pub fn encode_registry_entry(name: &str, kind: MetricKind) -> String {
    format!("{}{}{}", kind.tag(), DELIMITER, name)
}

/// Decode a registry entry. Untagged entries written by older daemons are
/// classified by the naming convention.
pub fn decode_registry_entry(entry: &str) -> Result<(String, MetricKind), DecodeError> {
    match entry.split_once(DELIMITER) {
        Some((tag, name)) => match MetricKind::from_tag(tag) {
            Some(kind) => Ok((name.to_string(), kind)),
            None => Err(DecodeError::UnknownKind {
                entry: entry.to_string(),
                tag: tag.to_string(),
            }),
        },
        None => Ok((entry.to_string(), MetricKind::infer(entry))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_format() {
        assert_eq!(encode_member(100, "5"), "100<X>5");
        let point = SeriesPoint::decode("100<X>5").unwrap();
        assert_eq!(point, SeriesPoint::new(100, "5"));
        assert_eq!(point.value_f64(), Some(5.0));
    }

    #[test]
    fn test_member_value_keeps_text_after_first_delimiter() {
        let point = SeriesPoint::decode("7<X>1.5<X>extra").unwrap();
        assert_eq!(point.timestamp, 7);
        assert_eq!(point.value, "1.5<X>extra");
    }

    #[test]
    fn test_member_missing_delimiter() {
        let err = SeriesPoint::decode("1005").unwrap_err();
        assert_eq!(
            err,
            DecodeError::MissingDelimiter {
                member: "1005".to_string()
            }
        );
    }

    #[test]
    fn test_member_bad_timestamp() {
        let err = SeriesPoint::decode("abc<X>5").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidTimestamp { .. }));
    }

    #[test]
    fn test_negative_timestamp_decodes() {
        let point = SeriesPoint::decode("-5<X>1").unwrap();
        assert_eq!(point.timestamp, -5);
    }

    #[test]
    fn test_join_samples() {
        assert_eq!(join_samples(&[12.0, 15.0, 9.0]), "12<X>15<X>9");
        assert_eq!(join_samples(&[0.25]), "0.25");
        assert_eq!(join_samples(&[]), "");
    }

    #[test]
    fn test_raw_samples_decode() {
        let samples = RawSamples::decode("12<X>15<X>9");
        assert_eq!(samples.values, vec![12.0, 15.0, 9.0]);
        assert!(samples.errors.is_empty());

        let samples = RawSamples::decode("<X>1<X>oops<X>2");
        assert_eq!(samples.values, vec![1.0, 2.0]);
        assert_eq!(
            samples.errors,
            vec![DecodeError::InvalidSample {
                segment: "oops".to_string()
            }]
        );
    }

    #[test]
    fn test_registry_entry_tagged() {
        let entry = encode_registry_entry("gauges.cpu", MetricKind::Gauge);
        assert_eq!(entry, "g<X>gauges.cpu");
        assert_eq!(
            decode_registry_entry(&entry).unwrap(),
            ("gauges.cpu".to_string(), MetricKind::Gauge)
        );
    }

    #[test]
    fn test_registry_entry_explicit_kind_beats_prefix() {
        let entry = encode_registry_entry("gaugeometer.hits", MetricKind::Counter);
        let (name, kind) = decode_registry_entry(&entry).unwrap();
        assert_eq!(name, "gaugeometer.hits");
        assert_eq!(kind, MetricKind::Counter);
    }

    #[test]
    fn test_registry_entry_untagged_falls_back_to_prefix() {
        assert_eq!(
            decode_registry_entry("gauges:temp").unwrap().1,
            MetricKind::Gauge
        );
        assert_eq!(
            decode_registry_entry("timers:latency").unwrap().1,
            MetricKind::Timer
        );
        assert_eq!(
            decode_registry_entry("counters:hits").unwrap().1,
            MetricKind::Counter
        );
    }

    #[test]
    fn test_registry_entry_unknown_tag() {
        let err = decode_registry_entry("z<X>foo").unwrap_err();
        assert!(matches!(err, DecodeError::UnknownKind { ref tag, .. } if tag == "z"));
    }
}
