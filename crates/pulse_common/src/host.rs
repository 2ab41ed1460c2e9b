//! Host aggregator.
//!
//! A host score is the SUM of its metrics' `avg_score * weight` for a window,
//! not their mean: hosts with more weighted metrics can reach a higher
//! ceiling. No renormalization happens at this level.

use crate::system::SystemAccumulator;
use crate::window::WindowAccumulator;

/// Host score for one window end
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HostScoreRecord {
    pub window_end: i64,
    pub score: f64,
    /// `score * host_weight`, the host's share of the system total
    pub weighted_contribution: f64,
}

/// Compute one record per window end present in the accumulator.
pub fn host_scores(windows: &WindowAccumulator, host_weight: f64) -> Vec<HostScoreRecord> {
    windows
        .iter()
        .filter(|(_, entry)| !entry.scores.is_empty())
        .map(|(window_end, entry)| {
            let score: f64 = entry.scores.iter().sum();
            HostScoreRecord {
                window_end,
                score,
                weighted_contribution: score * host_weight,
            }
        })
        .collect()
}

/// Fold a host's records into the pass-wide system accumulator.
pub fn fold_into_system(
    records: &[HostScoreRecord],
    host_weight: f64,
    system: &mut SystemAccumulator,
) {
    for record in records {
        system.contribute(record.window_end, record.weighted_contribution, host_weight);
    }
}
