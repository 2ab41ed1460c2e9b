//! Scoring configuration.
//!
//! Loads the target list and window lengths from `config.json` (or a `.toml`
//! file with the same shape). Durations are configured in minutes and exposed
//! in seconds. Targets sharing a `host_name` are pooled into one
//! [`HostGroup`] here, once, so the pipeline never re-derives grouping.

use crate::error::ConfigError;
use crate::normalize::Shape;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Default config file path
pub const CONFIG_PATH: &str = "config.json";

/// One metric to score on a target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Upstream item key, e.g. `system.cpu.util`
    pub key: String,

    /// Optional display name, only used in log lines
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default, rename = "function")]
    pub shape: Shape,

    /// Missing thresholds are treated as NaN
    #[serde(default = "nan")]
    pub min: f64,

    #[serde(default = "nan")]
    pub max: f64,

    #[serde(default)]
    pub weight: f64,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl MetricSpec {
    /// Score a single finite raw value.
    pub fn score(&self, value: f64) -> f64 {
        self.shape.score(value, self.min, self.max)
    }

    /// Display name for log lines, falling back to the key.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.key)
    }
}

/// A host as configured: upstream host name, display name and metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Host name as known to the metrics source
    pub host: String,

    /// Display host name; targets sharing it are pooled
    pub host_name: String,

    #[serde(default = "default_host_weight")]
    pub host_weight: f64,

    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
}

/// Top-level scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Look-back horizon in minutes (historical mode)
    #[serde(default = "default_time_window")]
    pub time_window: u64,

    /// Averaging window length in minutes
    #[serde(default = "default_averaging_window")]
    pub averaging_window: u64,

    /// Step between window starts in minutes
    #[serde(default = "default_moving_avg_step")]
    pub moving_avg_step: u64,

    /// Run continuously instead of a one-shot historical pass
    #[serde(default)]
    pub continuous: bool,

    #[serde(default)]
    pub hosts: Vec<Target>,

    /// Explicit per-host weights keyed by display host name
    #[serde(default)]
    pub host_weights: HashMap<String, f64>,
}

fn nan() -> f64 {
    f64::NAN
}

fn default_true() -> bool {
    true
}

fn default_host_weight() -> f64 {
    1.0
}

fn default_time_window() -> u64 {
    30
}

fn default_averaging_window() -> u64 {
    5
}

fn default_moving_avg_step() -> u64 {
    2
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            time_window: default_time_window(),
            averaging_window: default_averaging_window(),
            moving_avg_step: default_moving_avg_step(),
            continuous: false,
            hosts: Vec::new(),
            host_weights: HashMap::new(),
        }
    }
}

/// Window lengths in seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Durations {
    pub time_window: i64,
    pub averaging_window: i64,
    pub step: i64,
}

/// Targets pooled under one display host name.
#[derive(Debug, Clone)]
pub struct HostGroup {
    /// Display host name from the configuration
    pub host_name: String,

    /// Upstream host name used to resolve the host id (first target's)
    pub lookup_host: String,

    /// Resolved host weight for system scoring
    pub weight: f64,

    /// Enabled metrics of every target in the group, in config order
    pub metrics: Vec<MetricSpec>,
}

impl HostGroup {
    /// Tag value for `target_host`: lowercase, spaces replaced by `_`
    pub fn tag_name(&self) -> String {
        self.host_name.to_lowercase().replace(' ', "_")
    }
}

impl ScoringConfig {
    /// Load from disk. `.toml` files are parsed as TOML, anything else as JSON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = if path.extension().is_some_and(|ext| ext == "toml") {
            Self::from_toml(&contents)?
        } else {
            Self::from_json(&contents)?
        };

        config.validate()?;
        info!(
            "[CONFIG] Loaded {} targets from {}",
            config.hosts.len(),
            path.display()
        );
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Reject configurations no pass can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_window == 0 || self.averaging_window == 0 || self.moving_avg_step == 0 {
            return Err(ConfigError::Invalid(
                "time_window, averaging_window and moving_avg_step must be positive".to_string(),
            ));
        }

        if self.hosts.is_empty() {
            return Err(ConfigError::Invalid("no hosts configured".to_string()));
        }

        for target in &self.hosts {
            if target.host.is_empty() || target.host_name.is_empty() {
                return Err(ConfigError::Invalid(
                    "every target needs `host` and `host_name`".to_string(),
                ));
            }
            for metric in &target.metrics {
                if metric.key.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "metric without key on host {}",
                        target.host
                    )));
                }
                if metric.enabled && (metric.min.is_nan() || metric.max.is_nan()) {
                    warn!(
                        "[CONFIG] Metric {} on {} has no min/max thresholds, its scores will clamp to 1.0",
                        metric.key, target.host
                    );
                }
            }
        }

        Ok(())
    }

    pub fn durations(&self) -> Durations {
        Durations {
            time_window: minutes(self.time_window),
            averaging_window: minutes(self.averaging_window),
            step: minutes(self.moving_avg_step),
        }
    }

    /// Group targets by display host name in first-appearance order.
    ///
    /// Weight resolution: `host_weights[host_name]`, else the targets' common
    /// `host_weight`. When targets disagree the last one wins and a warning
    /// is logged.
    pub fn host_groups(&self) -> Vec<HostGroup> {
        let mut order: Vec<&str> = Vec::new();
        let mut grouped: HashMap<&str, Vec<&Target>> = HashMap::new();

        for target in &self.hosts {
            let name = target.host_name.as_str();
            if !grouped.contains_key(name) {
                order.push(name);
            }
            grouped.entry(name).or_default().push(target);
        }

        order
            .into_iter()
            .filter_map(|name| {
                let targets = grouped.remove(name)?;
                let first = targets.first()?;
                Some(HostGroup {
                    host_name: name.to_string(),
                    lookup_host: first.host.clone(),
                    weight: self.resolve_host_weight(name, &targets),
                    metrics: targets
                        .iter()
                        .flat_map(|t| t.metrics.iter())
                        .filter(|m| m.enabled)
                        .cloned()
                        .collect(),
                })
            })
            .collect()
    }

    fn resolve_host_weight(&self, host_name: &str, targets: &[&Target]) -> f64 {
        if let Some(weight) = self.host_weights.get(host_name) {
            return *weight;
        }

        let last = targets.last().map_or(1.0, |t| t.host_weight);
        let conflicting = targets.iter().any(|t| t.host_weight != last);
        if conflicting {
            let weights: Vec<String> = targets.iter().map(|t| t.host_weight.to_string()).collect();
            warn!(
                "[CONFIG] Targets of {} disagree on host_weight ({}), using {}; set host_weights.{} to choose",
                host_name,
                weights.join(", "),
                last,
                host_name
            );
        }
        last
    }
}

fn minutes(value: u64) -> i64 {
    i64::try_from(value.saturating_mul(60)).unwrap_or(i64::MAX)
}
