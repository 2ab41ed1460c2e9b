//! System aggregator.
//!
//! Collects weighted host contributions for the whole pass, keyed by window
//! end, and folds them into one system score per window once every host has
//! contributed. The accumulator is an explicit value threaded through the
//! pass; parallel host workers can build their own and [`merge`] them.
//!
//! [`merge`]: SystemAccumulator::merge

use std::collections::BTreeMap;

/// Running totals for one window end
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct HostTotals {
    /// Sum of `host_score * host_weight`
    pub total: f64,
    /// Sum of host weights
    pub weight: f64,
}

/// System score for one window end
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemScoreRecord {
    pub window_end: i64,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SystemAccumulator {
    windows: BTreeMap<i64, HostTotals>,
}

impl SystemAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contribute(&mut self, window_end: i64, weighted_score: f64, host_weight: f64) {
        let totals = self.windows.entry(window_end).or_default();
        totals.total += weighted_score;
        totals.weight += host_weight;
    }

    pub fn merge(&mut self, other: SystemAccumulator) {
        for (window_end, totals) in other.windows {
            self.contribute(window_end, totals.total, totals.weight);
        }
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// `total / weight` per window end, 0.0 when no weight was observed.
    pub fn finish(&self) -> Vec<SystemScoreRecord> {
        self.windows
            .iter()
            .map(|(&window_end, totals)| SystemScoreRecord {
                window_end,
                score: if totals.weight > 0.0 {
                    totals.total / totals.weight
                } else {
                    0.0
                },
            })
            .collect()
    }
}
