//! Output emitter.
//!
//! Every scalar the pipeline computes becomes a [`Point`] handed to a
//! [`PointSink`] one at a time. Writes are best-effort: a failed point is
//! logged, counted and dropped, and the pass carries on.

use crate::error::SinkError;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::warn;

/// Per-sample raw values
pub const RAW_METRICS: &str = "raw_metrics";
/// Per-sample scores
pub const SCORE_METRIC: &str = "score_metric";
/// Per-sample weighted scores
pub const WEIGHTED_SCORE_METRIC: &str = "weighted_score_metric";
/// Per-window average raw value
pub const RAW_METRICS_AVG: &str = "raw_metrics_avg";
/// Per-window average score
pub const SCORE_METRIC_AVG: &str = "score_metric_avg";
/// Per-window average weighted score
pub const WEIGHTED_SCORE_METRIC_AVG: &str = "weighted_score_metric_avg";
/// Per-window host score
pub const HOST_SCORE: &str = "host_score";
/// Per-window system score
pub const SYSTEM_SCORE: &str = "system_score";

/// Magnitude past which 4 decimals are below f64 precision
const ROUND4_EXACT_ABOVE: f64 = 1e15;

/// Round to 4 decimal places, the precision of every emitted field.
///
/// Values too large to carry 4 decimals are returned unchanged, so a finite
/// input never rounds to infinity.
pub fn round4(value: f64) -> f64 {
    if !value.is_finite() || value.abs() >= ROUND4_EXACT_ABOVE {
        return value;
    }
    (value * 10_000.0).round() / 10_000.0
}

/// One time-series point
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, f64>,
    /// Unix seconds
    pub timestamp: i64,
}

impl Point {
    pub fn new(measurement: impl Into<String>, timestamp: i64) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Add a field, rounded to 4 decimals.
    pub fn field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.insert(key.into(), round4(value));
        self
    }

    /// Encode as one line of InfluxDB line protocol with second precision.
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape(&self.measurement, &[',', ' ']);
        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape(key, &[',', '=', ' ']));
            line.push('=');
            line.push_str(&escape(value, &[',', '=', ' ']));
        }

        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(key, value)| format!("{}={}", escape(key, &[',', '=', ' ']), value))
            .collect();
        line.push(' ');
        line.push_str(&fields.join(","));
        line.push(' ');
        line.push_str(&self.timestamp.to_string());
        line
    }
}

fn escape(raw: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '\\' || special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Downstream time-series sink
pub trait PointSink: Send + Sync {
    /// Write one point. No retries; the caller logs and drops on error.
    fn write(&self, point: &Point) -> Result<(), SinkError>;
}

/// Sink that keeps every point in memory, for tests
#[derive(Default)]
pub struct RecordingSink {
    points: Mutex<Vec<Point>>,
    fail_measurements: Vec<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every point of the given measurements
    pub fn failing_on(measurements: &[&str]) -> Self {
        Self {
            points: Mutex::new(Vec::new()),
            fail_measurements: measurements.iter().map(|m| (*m).to_string()).collect(),
        }
    }

    pub fn points(&self) -> Vec<Point> {
        self.points.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Points of one measurement, in write order
    pub fn measurement(&self, name: &str) -> Vec<Point> {
        self.points()
            .into_iter()
            .filter(|p| p.measurement == name)
            .collect()
    }
}

impl PointSink for RecordingSink {
    fn write(&self, point: &Point) -> Result<(), SinkError> {
        if self.fail_measurements.contains(&point.measurement) {
            return Err(SinkError::Rejected {
                status: 500,
                body: format!("{} rejected", point.measurement),
            });
        }
        self.points
            .lock()
            .map_err(|e| SinkError::Io(e.to_string()))?
            .push(point.clone());
        Ok(())
    }
}

/// Host identity carried as tags on every host-level point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostTags {
    /// Normalized display name (`target_host` tag)
    pub target_host: String,
    /// Upstream host id (`host_id` tag)
    pub host_id: String,
}

impl HostTags {
    fn apply(&self, point: Point) -> Point {
        point
            .tag("target_host", self.target_host.as_str())
            .tag("host_id", self.host_id.as_str())
    }
}

/// Turns pipeline scalars into points and writes them to a sink.
pub struct Emitter<'a> {
    sink: &'a dyn PointSink,
    written: usize,
    failed: usize,
}

impl<'a> Emitter<'a> {
    pub fn new(sink: &'a dyn PointSink) -> Self {
        Self {
            sink,
            written: 0,
            failed: 0,
        }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Write a point, logging and dropping it on failure.
    pub fn emit(&mut self, point: &Point) {
        match self.sink.write(point) {
            Ok(()) => self.written += 1,
            Err(e) => {
                self.failed += 1;
                warn!(
                    "[PASS] Failed to write {} point at {}: {}",
                    point.measurement, point.timestamp, e
                );
            }
        }
    }

    /// Instant channel: one sample's raw value, score and weighted score.
    pub fn emit_instant(
        &mut self,
        host: &HostTags,
        metric_key: &str,
        timestamp: i64,
        raw: f64,
        score: f64,
        weighted: f64,
    ) {
        self.emit_triplet(
            [RAW_METRICS, SCORE_METRIC, WEIGHTED_SCORE_METRIC],
            host,
            metric_key,
            timestamp,
            [raw, score, weighted],
        );
    }

    /// Windowed channel: one metric's averages, stamped at window close.
    pub fn emit_window(
        &mut self,
        host: &HostTags,
        metric_key: &str,
        window_end: i64,
        avg_raw: f64,
        avg_score: f64,
        avg_weighted: f64,
    ) {
        self.emit_triplet(
            [RAW_METRICS_AVG, SCORE_METRIC_AVG, WEIGHTED_SCORE_METRIC_AVG],
            host,
            metric_key,
            window_end,
            [avg_raw, avg_score, avg_weighted],
        );
    }

    fn emit_triplet(
        &mut self,
        measurements: [&str; 3],
        host: &HostTags,
        metric_key: &str,
        timestamp: i64,
        values: [f64; 3],
    ) {
        let [raw_name, score_name, weighted_name] = measurements;
        let [raw, score, weighted] = values;

        let raw_point = host.apply(Point::new(raw_name, timestamp)).field(metric_key, raw);
        self.emit(&raw_point);

        let score_point = host
            .apply(Point::new(score_name, timestamp))
            .field(metric_key, score);
        self.emit(&score_point);

        let weighted_point = host
            .apply(Point::new(weighted_name, timestamp))
            .tag("metric", metric_key)
            .field("weighted_score", weighted);
        self.emit(&weighted_point);
    }

    pub fn emit_host_score(&mut self, host: &HostTags, window_end: i64, score: f64) {
        let point = host
            .apply(Point::new(HOST_SCORE, window_end))
            .field("averaged_host_score", score);
        self.emit(&point);
    }

    pub fn emit_system_score(&mut self, window_end: i64, score: f64) {
        let point = Point::new(SYSTEM_SCORE, window_end).field("system_score", score);
        self.emit(&point);
    }
}
