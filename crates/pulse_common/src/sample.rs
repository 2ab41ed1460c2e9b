//! Samples and the per-host sample store.
//!
//! Upstream history arrives as loosely typed JSON records. Each record is
//! parsed into a [`Sample`] once; records that cannot be used are skipped
//! with a warning and counted, the rest of the series still processes.

use crate::error::SampleError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// A history record as returned by the metrics source.
///
/// Clock and value may be JSON numbers or numeric strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    #[serde(default)]
    pub clock: Value,
    #[serde(default)]
    pub value: Value,
}

impl RawSample {
    pub fn new(clock: impl Into<Value>, value: impl Into<Value>) -> Self {
        Self {
            clock: clock.into(),
            value: value.into(),
        }
    }

    /// The clock in seconds, if it parses
    pub fn clock_secs(&self) -> Option<i64> {
        parse_clock(&self.clock).ok()
    }
}

/// A parsed, finite sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Unix seconds, UTC
    pub timestamp: i64,
    pub value: f64,
}

impl Sample {
    pub fn parse(raw: &RawSample) -> Result<Self, SampleError> {
        let timestamp = parse_clock(&raw.clock)?;
        let value = parse_value(&raw.value)?;
        if !value.is_finite() {
            return Err(SampleError::NonFinite(value));
        }
        Ok(Self { timestamp, value })
    }
}

fn parse_clock(clock: &Value) -> Result<i64, SampleError> {
    match clock {
        Value::Null => Err(SampleError::MissingField("clock")),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| not_numeric("clock", clock)),
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| not_numeric("clock", clock)),
        _ => Err(not_numeric("clock", clock)),
    }
}

fn parse_value(value: &Value) -> Result<f64, SampleError> {
    match value {
        Value::Null => Err(SampleError::MissingField("value")),
        Value::Number(n) => n.as_f64().ok_or_else(|| not_numeric("value", value)),
        Value::String(s) => s.trim().parse::<f64>().map_err(|_| not_numeric("value", value)),
        _ => Err(not_numeric("value", value)),
    }
}

fn not_numeric(field: &'static str, raw: &Value) -> SampleError {
    SampleError::NotNumeric {
        field,
        raw: raw.to_string(),
    }
}

/// Samples of one metric, ascending by timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    samples: Vec<Sample>,
}

impl Series {
    /// Build from already parsed samples; sorts ascending.
    pub fn from_samples(mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|s| s.timestamp);
        Self { samples }
    }

    /// Parse raw records, skipping the unusable ones.
    ///
    /// Returns the series and the number of rejected records.
    pub fn from_raw(metric_key: &str, raw: &[RawSample]) -> (Self, usize) {
        let mut rejected = 0;
        let samples = raw
            .iter()
            .filter_map(|record| match Sample::parse(record) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    warn!("[PASS] Skipping sample of {}: {}", metric_key, e);
                    rejected += 1;
                    None
                }
            })
            .collect();
        (Self::from_samples(samples), rejected)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Samples with `start <= timestamp < end`.
    pub fn range(&self, start: i64, end: i64) -> &[Sample] {
        let lo = self.samples.partition_point(|s| s.timestamp < start);
        let hi = self.samples.partition_point(|s| s.timestamp < end);
        if lo >= hi {
            return &[];
        }
        &self.samples[lo..hi]
    }

    pub fn first_timestamp(&self) -> Option<i64> {
        self.samples.first().map(|s| s.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.samples.last().map(|s| s.timestamp)
    }
}

/// Series for every fetched metric of one host, keyed by metric key.
#[derive(Debug, Clone, Default)]
pub struct SampleStore {
    series: BTreeMap<String, Series>,
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, metric_key: impl Into<String>, series: Series) {
        self.series.insert(metric_key.into(), series);
    }

    pub fn get(&self, metric_key: &str) -> Option<&Series> {
        self.series.get(metric_key)
    }

    pub fn contains(&self, metric_key: &str) -> bool {
        self.series.contains_key(metric_key)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Earliest and latest timestamp across every series.
    pub fn bounds(&self) -> Option<(i64, i64)> {
        merge_bounds(
            self.series
                .values()
                .map(|s| s.first_timestamp().zip(s.last_timestamp())),
        )
    }
}

/// Fold optional `(min, max)` pairs into one.
pub fn merge_bounds(bounds: impl IntoIterator<Item = Option<(i64, i64)>>) -> Option<(i64, i64)> {
    bounds
        .into_iter()
        .flatten()
        .reduce(|(lo_a, hi_a), (lo_b, hi_b)| (lo_a.min(lo_b), hi_a.max(hi_b)))
}
