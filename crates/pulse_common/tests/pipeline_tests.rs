//! Golden tests for a full evaluation pass.
//!
//! These drive the pipeline end to end through the fake source and the
//! recording sink and lock the emitted points.

use pulse_common::emit::{
    HOST_SCORE, RAW_METRICS, RAW_METRICS_AVG, SCORE_METRIC, SCORE_METRIC_AVG, SYSTEM_SCORE,
    WEIGHTED_SCORE_METRIC, WEIGHTED_SCORE_METRIC_AVG,
};
use pulse_common::{
    run_pass, FakeMetricsSource, PassMode, PassParams, Point, RawSample, RecordingSink,
    ScoringConfig,
};

const SINGLE_HOST: &str = r#"{
    "averaging_window": 2,
    "moving_avg_step": 2,
    "time_window": 30,
    "hosts": [{
        "host": "target-a",
        "host_name": "Target A",
        "host_weight": 1.0,
        "metrics": [
            {"key": "cpu", "function": "z_shape", "min": 0, "max": 100, "weight": 2.0},
            {"key": "mem", "function": "s_shape", "min": 0, "max": 100, "weight": 5.0, "enabled": false}
        ]
    }]
}"#;

fn single_host_source() -> FakeMetricsSource {
    FakeMetricsSource::new()
        .with_host("target-a", "10001")
        .with_metric(
            "10001",
            "cpu",
            "500",
            vec![
                RawSample::new("0", "50"),
                RawSample::new("60", "150"),
                RawSample::new("119", "25"),
            ],
        )
        .with_metric("10001", "mem", "501", vec![RawSample::new("30", "99")])
}

fn run(config: &str, source: &FakeMetricsSource, mode: PassMode, now: i64) -> RecordingSink {
    let config = ScoringConfig::from_json(config).unwrap();
    let sink = RecordingSink::new();
    let params = PassParams {
        mode,
        now,
        durations: config.durations(),
    };
    run_pass(source, &sink, &config.host_groups(), &params);
    sink
}

fn field(point: &Point, key: &str) -> f64 {
    point.fields[key]
}

// === GOLDEN: single host, single window ===

/// GOLDEN: z_shape cpu, samples 50/150/25 in one 120s window
/// score(50)=0.5, score(150)=0 (clamped), score(25)=0.75
#[test]
fn golden_single_window_scores() {
    let source = single_host_source();
    let sink = run(SINGLE_HOST, &source, PassMode::Continuous { start_from: 0 }, 120);

    let raw_avg = sink.measurement(RAW_METRICS_AVG);
    assert_eq!(raw_avg.len(), 1);
    assert_eq!(raw_avg[0].timestamp, 120);
    assert_eq!(field(&raw_avg[0], "cpu"), 75.0);

    let score_avg = sink.measurement(SCORE_METRIC_AVG);
    assert_eq!(field(&score_avg[0], "cpu"), 0.4167);

    let weighted_avg = sink.measurement(WEIGHTED_SCORE_METRIC_AVG);
    assert_eq!(field(&weighted_avg[0], "weighted_score"), 0.8333);
    assert_eq!(weighted_avg[0].tags["metric"], "cpu");

    let host = sink.measurement(HOST_SCORE);
    assert_eq!(host.len(), 1);
    assert_eq!(host[0].timestamp, 120);
    assert_eq!(field(&host[0], "averaged_host_score"), 0.8333);
    assert_eq!(host[0].tags["target_host"], "target_a");
    assert_eq!(host[0].tags["host_id"], "10001");

    let system = sink.measurement(SYSTEM_SCORE);
    assert_eq!(system.len(), 1);
    assert_eq!(system[0].timestamp, 120);
    assert_eq!(field(&system[0], "system_score"), 0.8333);
    assert!(system[0].tags.is_empty());
}

/// GOLDEN: instant channel stamps each sample at its own clock
#[test]
fn golden_instant_channel() {
    let source = single_host_source();
    let sink = run(SINGLE_HOST, &source, PassMode::Continuous { start_from: 0 }, 120);

    let raw: Vec<(i64, f64)> = sink
        .measurement(RAW_METRICS)
        .iter()
        .map(|p| (p.timestamp, field(p, "cpu")))
        .collect();
    assert_eq!(raw, vec![(0, 50.0), (60, 150.0), (119, 25.0)]);

    let scores: Vec<f64> = sink
        .measurement(SCORE_METRIC)
        .iter()
        .map(|p| field(p, "cpu"))
        .collect();
    assert_eq!(scores, vec![0.5, 0.0, 0.75]);

    let weighted: Vec<f64> = sink
        .measurement(WEIGHTED_SCORE_METRIC)
        .iter()
        .map(|p| field(p, "weighted_score"))
        .collect();
    assert_eq!(weighted, vec![1.0, 0.0, 1.5]);
}

/// Historical mode over the same samples derives the same single window
#[test]
fn test_historical_mode_matches_continuous_window() {
    let source = single_host_source();
    let sink = run(SINGLE_HOST, &source, PassMode::Historical, 120);

    let system = sink.measurement(SYSTEM_SCORE);
    assert_eq!(system.len(), 1);
    assert_eq!(system[0].timestamp, 120);
    assert_eq!(field(&system[0], "system_score"), 0.8333);
}

#[test]
fn test_disabled_metric_emits_nothing() {
    let source = single_host_source();
    let sink = run(SINGLE_HOST, &source, PassMode::Continuous { start_from: 0 }, 120);

    assert!(sink
        .points()
        .iter()
        .all(|p| !p.fields.contains_key("mem") && p.tags.get("metric").map_or(true, |m| m != "mem")));
    assert!(source.history_calls().iter().all(|(item, _, _)| item != "501"));
}

#[test]
fn test_rerun_is_idempotent() {
    let source = single_host_source();
    let first = run(SINGLE_HOST, &source, PassMode::Historical, 120);
    let second = run(SINGLE_HOST, &source, PassMode::Historical, 120);
    assert_eq!(first.points(), second.points());
}

#[test]
fn test_continuous_fetch_starts_at_window_start() {
    let source = single_host_source();
    run(SINGLE_HOST, &source, PassMode::Continuous { start_from: 40 }, 160);
    assert_eq!(source.history_calls(), vec![("500".to_string(), 40, 160)]);
}

// === Multi-host behavior ===

const TWO_HOSTS: &str = r#"{
    "averaging_window": 1,
    "moving_avg_step": 1,
    "time_window": 10,
    "hosts": [
        {
            "host": "web-01",
            "host_name": "Web",
            "host_weight": 1.0,
            "metrics": [
                {"key": "cpu", "min": 0, "max": 100, "weight": 0.5},
                {"key": "latency", "min": 0, "max": 1000, "weight": 0.5}
            ]
        },
        {
            "host": "db-01",
            "host_name": "Database",
            "host_weight": 3.0,
            "metrics": [
                {"key": "cpu", "function": "z_shape", "min": 0, "max": 100, "weight": 1.0}
            ]
        },
        {
            "host": "ghost-01",
            "host_name": "Ghost",
            "metrics": [{"key": "cpu", "min": 0, "max": 100, "weight": 1.0}]
        }
    ]
}"#;

fn two_host_source() -> FakeMetricsSource {
    FakeMetricsSource::new()
        .with_host("web-01", "1")
        .with_host("db-01", "2")
        .with_metric("1", "cpu", "11", vec![RawSample::new(0, 20), RawSample::new(70, 40)])
        .with_metric("1", "latency", "12", vec![RawSample::new(10, 500)])
        .with_metric("2", "cpu", "21", vec![RawSample::new(5, 90), RawSample::new(65, 10)])
}

#[test]
fn test_host_score_sums_metric_contributions() {
    let source = two_host_source();
    let sink = run(TWO_HOSTS, &source, PassMode::Historical, 120);

    let web: Vec<(i64, f64)> = sink
        .measurement(HOST_SCORE)
        .iter()
        .filter(|p| p.tags["target_host"] == "web")
        .map(|p| (p.timestamp, field(p, "averaged_host_score")))
        .collect();
    // window [0,60): cpu 20 -> 0.8*0.5, latency 500 -> 0.5*0.5; window [60,120): cpu 40 -> 0.6*0.5
    assert_eq!(web, vec![(60, 0.65), (120, 0.3)]);
}

#[test]
fn test_system_score_weights_hosts() {
    let source = two_host_source();
    let sink = run(TWO_HOSTS, &source, PassMode::Historical, 120);

    let system: Vec<(i64, f64)> = sink
        .measurement(SYSTEM_SCORE)
        .iter()
        .map(|p| (p.timestamp, field(p, "system_score")))
        .collect();
    // [0,60): (0.65*1 + 0.1*3) / 4 = 0.2375; [60,120): (0.3*1 + 0.9*3) / 4 = 0.75
    assert_eq!(system, vec![(60, 0.2375), (120, 0.75)]);
}

#[test]
fn test_missing_host_is_skipped() {
    let source = two_host_source();
    let config = ScoringConfig::from_json(TWO_HOSTS).unwrap();
    let sink = RecordingSink::new();
    let summary = run_pass(
        &source,
        &sink,
        &config.host_groups(),
        &PassParams {
            mode: PassMode::Historical,
            now: 120,
            durations: config.durations(),
        },
    );

    assert_eq!(summary.hosts_processed, 2);
    assert_eq!(summary.hosts_skipped, 1);
    assert!(sink.points().iter().all(|p| p.tags.get("target_host").map_or(true, |h| h != "ghost")));
}

#[test]
fn test_unreachable_host_does_not_abort_pass() {
    let source = two_host_source().with_failing_host("1");
    let sink = run(TWO_HOSTS, &source, PassMode::Historical, 120);

    let hosts: Vec<String> = sink
        .measurement(HOST_SCORE)
        .iter()
        .map(|p| p.tags["target_host"].clone())
        .collect();
    assert_eq!(hosts, vec!["database".to_string()]);

    // grid comes from the database samples alone: range(5, 65, 60) = [5]
    let system = sink.measurement(SYSTEM_SCORE);
    assert_eq!(system.len(), 1);
    assert_eq!(system[0].timestamp, 65);
    assert_eq!(field(&system[0], "system_score"), 0.1);
}

#[test]
fn test_malformed_samples_are_skipped() {
    let source = FakeMetricsSource::new().with_host("web-01", "1").with_metric(
        "1",
        "cpu",
        "11",
        vec![
            RawSample::new(0, 20),
            RawSample::new("10", "n/a"),
            RawSample::new("20", "NaN"),
            RawSample::new(30, 40),
        ],
    );
    let config = ScoringConfig::from_json(TWO_HOSTS).unwrap();
    let groups: Vec<_> = config
        .host_groups()
        .into_iter()
        .filter(|g| g.host_name == "Web")
        .collect();
    let sink = RecordingSink::new();
    let summary = run_pass(
        &source,
        &sink,
        &groups,
        &PassParams {
            mode: PassMode::Historical,
            now: 120,
            durations: config.durations(),
        },
    );

    assert_eq!(summary.samples_rejected, 2);
    assert_eq!(summary.samples_scored, 2);
    let avg = sink.measurement(RAW_METRICS_AVG);
    assert_eq!(field(&avg[0], "cpu"), 30.0);
}

#[test]
fn test_sink_failures_are_counted_not_fatal() {
    let source = single_host_source();
    let config = ScoringConfig::from_json(SINGLE_HOST).unwrap();
    let sink = RecordingSink::failing_on(&[HOST_SCORE]);
    let summary = run_pass(
        &source,
        &sink,
        &config.host_groups(),
        &PassParams {
            mode: PassMode::Continuous { start_from: 0 },
            now: 120,
            durations: config.durations(),
        },
    );

    assert_eq!(summary.points_failed, 1);
    assert_eq!(sink.measurement(SYSTEM_SCORE).len(), 1);
}

#[test]
fn test_empty_continuous_window_emits_no_scores() {
    let source = single_host_source();
    let sink = run(SINGLE_HOST, &source, PassMode::Continuous { start_from: 500 }, 620);
    assert!(sink.points().is_empty());
}

/// A finite sample too large for 4-decimal rounding is written as-is
#[test]
fn test_huge_sample_stays_finite() {
    let source = FakeMetricsSource::new()
        .with_host("target-a", "10001")
        .with_metric("10001", "cpu", "500", vec![RawSample::new("0", "1e305")]);
    let sink = run(SINGLE_HOST, &source, PassMode::Continuous { start_from: 0 }, 120);

    let raw = sink.measurement(RAW_METRICS);
    assert_eq!(raw.len(), 1);
    assert_eq!(field(&raw[0], "cpu"), 1e305);

    let raw_avg = sink.measurement(RAW_METRICS_AVG);
    assert_eq!(raw_avg.len(), 1);
    assert_eq!(field(&raw_avg[0], "cpu"), 1e305);
    assert!(!raw_avg[0].to_line_protocol().contains("inf"));
}
