//! Pulse common library - windowed health scoring.
//!
//! Turns raw telemetry samples into normalized, weighted scores at three
//! levels (metric, host, system) over sliding windows, and republishes every
//! stage as time-series points.

pub mod config;
pub mod emit;
pub mod error;
pub mod grid;
pub mod host;
pub mod normalize;
pub mod pipeline;
pub mod sample;
pub mod source;
pub mod system;
pub mod window;

pub use config::{Durations, HostGroup, MetricSpec, ScoringConfig, Target};
pub use emit::{Emitter, Point, PointSink, RecordingSink};
pub use error::{ConfigError, SampleError, SinkError, SourceError};
pub use grid::{Window, WindowGrid};
pub use normalize::{s_shape, z_shape, Shape};
pub use pipeline::{run_pass, PassMode, PassParams, PassSummary};
pub use sample::{RawSample, Sample, SampleStore, Series};
pub use source::{FakeMetricsSource, MetricsSource, RemoteMetric, HISTORY_PAGE_LIMIT};
pub use system::{SystemAccumulator, SystemScoreRecord};
