//! One evaluation pass.
//!
//! Fetch every host's samples, build the window grid once, then score each
//! host against that grid and fold the system score last. Collaborators are
//! injected by the caller; nothing here holds state between passes.

use crate::config::{Durations, HostGroup};
use crate::emit::{Emitter, HostTags, PointSink};
use crate::grid::WindowGrid;
use crate::host::{fold_into_system, host_scores};
use crate::sample::{merge_bounds, SampleStore, Series};
use crate::source::MetricsSource;
use crate::system::SystemAccumulator;
use crate::window::{aggregate_metric, score_samples, WindowAccumulator};
use chrono::DateTime;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// How the pass derives its time range and grid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// Full grid over everything fetched in `[now - time_window, now]`
    Historical,
    /// One trailing window starting at `start_from`
    Continuous { start_from: i64 },
}

/// Inputs of one pass
#[derive(Debug, Clone, Copy)]
pub struct PassParams {
    pub mode: PassMode,
    /// Unix seconds at pass start
    pub now: i64,
    pub durations: Durations,
}

impl PassParams {
    /// History range to fetch, inclusive on both ends.
    pub fn fetch_range(&self) -> (i64, i64) {
        match self.mode {
            PassMode::Historical => (self.now - self.durations.time_window, self.now),
            PassMode::Continuous { start_from } => (start_from, self.now),
        }
    }
}

/// Counters reported after every pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub hosts_processed: usize,
    pub hosts_skipped: usize,
    pub metrics_processed: usize,
    pub metrics_skipped: usize,
    pub samples_scored: usize,
    pub samples_rejected: usize,
    pub grid_windows: usize,
    pub metric_windows: usize,
    pub system_windows: usize,
    pub points_written: usize,
    pub points_failed: usize,
}

/// A host whose samples were fetched for this pass
struct FetchedHost<'a> {
    group: &'a HostGroup,
    tags: HostTags,
    store: SampleStore,
}

/// Run one pass and emit every stage to the sink.
pub fn run_pass(
    source: &dyn MetricsSource,
    sink: &dyn PointSink,
    groups: &[HostGroup],
    params: &PassParams,
) -> PassSummary {
    let mut summary = PassSummary::default();
    let (time_from, time_till) = params.fetch_range();

    info!(
        "[PASS] Starting {:?} pass over {} hosts, range {} .. {}",
        params.mode,
        groups.len(),
        format_clock(time_from),
        format_clock(time_till)
    );

    let fetched: Vec<FetchedHost> = groups
        .iter()
        .filter_map(|group| fetch_host(source, group, time_from, time_till, &mut summary))
        .collect();

    let grid = match params.mode {
        PassMode::Historical => WindowGrid::historical(
            merge_bounds(fetched.iter().map(|host| host.store.bounds())),
            params.now,
            params.durations.time_window,
            params.durations.step,
            params.durations.averaging_window,
        ),
        PassMode::Continuous { start_from } => {
            WindowGrid::continuous(start_from, params.durations.averaging_window)
        }
    };
    summary.grid_windows = grid.len();

    let mut emitter = Emitter::new(sink);
    let mut system = SystemAccumulator::new();
    for host in &fetched {
        score_host(host, &grid, &mut emitter, &mut system, &mut summary);
    }

    let system_records = system.finish();
    for record in &system_records {
        debug!(
            "[PASS] System score {:.4} at {}",
            record.score,
            format_clock(record.window_end)
        );
        emitter.emit_system_score(record.window_end, record.score);
    }
    summary.system_windows = system_records.len();
    summary.points_written = emitter.written();
    summary.points_failed = emitter.failed();

    info!(
        "[PASS] Done: {} hosts ({} skipped), {} metrics ({} skipped), {} samples ({} rejected), {} system windows, {} points written, {} failed",
        summary.hosts_processed,
        summary.hosts_skipped,
        summary.metrics_processed,
        summary.metrics_skipped,
        summary.samples_scored,
        summary.samples_rejected,
        summary.system_windows,
        summary.points_written,
        summary.points_failed
    );

    summary
}

/// Resolve a host, list its items and pull history for each enabled metric.
///
/// Upstream failures skip the host (or metric) for this pass only.
fn fetch_host<'a>(
    source: &dyn MetricsSource,
    group: &'a HostGroup,
    time_from: i64,
    time_till: i64,
    summary: &mut PassSummary,
) -> Option<FetchedHost<'a>> {
    let host_id = match source.resolve_host(&group.lookup_host) {
        Ok(Some(id)) => id,
        Ok(None) => {
            warn!("[PASS] Host not found: {}", group.lookup_host);
            summary.hosts_skipped += 1;
            return None;
        }
        Err(e) => {
            warn!("[PASS] Failed to resolve host {}: {}", group.lookup_host, e);
            summary.hosts_skipped += 1;
            return None;
        }
    };

    let items = match source.list_metrics(&host_id) {
        Ok(items) => items,
        Err(e) => {
            warn!("[PASS] Failed to list metrics of {}: {}", group.lookup_host, e);
            summary.hosts_skipped += 1;
            return None;
        }
    };
    let items: HashMap<&str, _> = items.iter().map(|item| (item.key.as_str(), item)).collect();

    let mut store = SampleStore::new();
    for spec in &group.metrics {
        if store.contains(&spec.key) {
            continue;
        }
        let Some(item) = items.get(spec.key.as_str()) else {
            warn!(
                "[PASS] Metric {} not found on {}: {}",
                spec.label(),
                group.lookup_host,
                spec.key
            );
            summary.metrics_skipped += 1;
            continue;
        };

        let history = match source.fetch_history(item, time_from, time_till) {
            Ok(history) => history,
            Err(e) => {
                warn!("[PASS] Failed to fetch history of {}: {}", spec.label(), e);
                summary.metrics_skipped += 1;
                continue;
            }
        };

        let (series, rejected) = Series::from_raw(&spec.key, &history);
        summary.samples_rejected += rejected;
        if series.is_empty() {
            warn!("[PASS] No history for {} on {}", spec.label(), group.lookup_host);
            summary.metrics_skipped += 1;
            continue;
        }
        debug!(
            "[PASS] {} samples for {} on {}",
            series.len(),
            spec.label(),
            group.lookup_host
        );
        store.insert(spec.key.clone(), series);
    }

    Some(FetchedHost {
        group,
        tags: HostTags {
            target_host: group.tag_name(),
            host_id,
        },
        store,
    })
}

/// Score one host against the shared grid and fold it into the system total.
fn score_host(
    host: &FetchedHost,
    grid: &WindowGrid,
    emitter: &mut Emitter,
    system: &mut SystemAccumulator,
    summary: &mut PassSummary,
) {
    let mut windows = WindowAccumulator::new();

    for spec in &host.group.metrics {
        let Some(series) = host.store.get(&spec.key) else {
            continue;
        };
        summary.metrics_processed += 1;

        for scored in score_samples(spec, series.samples()) {
            emitter.emit_instant(
                &host.tags,
                &spec.key,
                scored.timestamp,
                scored.raw,
                scored.score,
                scored.weighted,
            );
            summary.samples_scored += 1;
        }

        let metric_windows = summary.metric_windows;
        for stats in aggregate_metric(spec, series, grid) {
            emitter.emit_window(
                &host.tags,
                &spec.key,
                stats.window_end,
                stats.avg_raw,
                stats.avg_score,
                stats.avg_weighted,
            );
            windows.add(&stats, spec.weight);
            summary.metric_windows += 1;
        }
        debug!(
            "[PASS] {} ({}) on {}: {} windows",
            spec.label(),
            spec.shape.as_str(),
            host.group.host_name,
            summary.metric_windows - metric_windows
        );
    }

    let records = host_scores(&windows, host.group.weight);
    for record in &records {
        emitter.emit_host_score(&host.tags, record.window_end, record.score);
    }
    fold_into_system(&records, host.group.weight, system);

    summary.hosts_processed += 1;
    debug!(
        "[PASS] Host {} scored over {} windows",
        host.group.host_name,
        records.len()
    );
}

fn format_clock(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn durations() -> Durations {
        Durations {
            time_window: 1800,
            averaging_window: 300,
            step: 120,
        }
    }

    #[test]
    fn test_fetch_range_by_mode() {
        let historical = PassParams {
            mode: PassMode::Historical,
            now: 10_000,
            durations: durations(),
        };
        assert_eq!(historical.fetch_range(), (8_200, 10_000));

        let continuous = PassParams {
            mode: PassMode::Continuous { start_from: 9_760 },
            now: 10_000,
            durations: durations(),
        };
        assert_eq!(continuous.fetch_range(), (9_760, 10_000));
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0), "1970-01-01 00:00:00");
        assert_eq!(format_clock(120), "1970-01-01 00:02:00");
    }
}
