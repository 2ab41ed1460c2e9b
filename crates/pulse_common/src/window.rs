//! Window aggregator.
//!
//! Buckets one metric's samples into the pass grid and averages raw value,
//! score and weighted score per non-empty window. Results are folded into a
//! per-host [`WindowAccumulator`] keyed by window end.

use crate::config::MetricSpec;
use crate::grid::WindowGrid;
use crate::sample::{Sample, Series};
use std::collections::BTreeMap;

/// A scored sample for the instant channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredSample {
    pub timestamp: i64,
    pub raw: f64,
    pub score: f64,
    pub weighted: f64,
}

/// Averages of one metric over one window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricWindowStats {
    pub window_start: i64,
    /// Emission timestamp
    pub window_end: i64,
    pub sample_count: usize,
    pub avg_raw: f64,
    pub avg_score: f64,
    pub avg_weighted: f64,
}

impl MetricWindowStats {
    /// Contribution to the host score: `avg_score * weight`.
    pub fn contribution(&self, weight: f64) -> f64 {
        self.avg_score * weight
    }
}

/// Score every sample of a series.
pub fn score_samples(spec: &MetricSpec, samples: &[Sample]) -> Vec<ScoredSample> {
    samples
        .iter()
        .map(|sample| {
            let score = spec.score(sample.value);
            ScoredSample {
                timestamp: sample.timestamp,
                raw: sample.value,
                score,
                weighted: score * spec.weight,
            }
        })
        .collect()
}

/// Average one metric over every window of the grid, skipping empty ones.
pub fn aggregate_metric(
    spec: &MetricSpec,
    series: &Series,
    grid: &WindowGrid,
) -> Vec<MetricWindowStats> {
    grid.windows()
        .filter_map(|window| {
            let in_window = series.range(window.start, window.end);
            if in_window.is_empty() {
                return None;
            }

            let count = in_window.len() as f64;
            let scored = score_samples(spec, in_window);
            let sum_raw: f64 = scored.iter().map(|s| s.raw).sum();
            let sum_score: f64 = scored.iter().map(|s| s.score).sum();
            let sum_weighted: f64 = scored.iter().map(|s| s.weighted).sum();

            Some(MetricWindowStats {
                window_start: window.start,
                window_end: window.end,
                sample_count: in_window.len(),
                avg_raw: sum_raw / count,
                avg_score: sum_score / count,
                avg_weighted: sum_weighted / count,
            })
        })
        .collect()
}

/// Per-window lists of metric results for one host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowEntry {
    /// `avg_score * weight` per metric
    pub scores: Vec<f64>,
    /// Average weighted score per metric
    pub weighted: Vec<f64>,
    /// Average raw value per metric
    pub raw: Vec<f64>,
}

/// Metric results of one host, keyed by window end
#[derive(Debug, Clone, Default)]
pub struct WindowAccumulator {
    entries: BTreeMap<i64, WindowEntry>,
}

impl WindowAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one metric's window result in.
    pub fn add(&mut self, stats: &MetricWindowStats, weight: f64) {
        let entry = self.entries.entry(stats.window_end).or_default();
        entry.scores.push(stats.contribution(weight));
        entry.weighted.push(stats.avg_weighted);
        entry.raw.push(stats.avg_raw);
    }

    pub fn get(&self, window_end: i64) -> Option<&WindowEntry> {
        self.entries.get(&window_end)
    }

    /// Entries in ascending window-end order
    pub fn iter(&self) -> impl Iterator<Item = (i64, &WindowEntry)> {
        self.entries.iter().map(|(end, entry)| (*end, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
