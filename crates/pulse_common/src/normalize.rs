//! Normalization shapes.
//!
//! Map a raw metric value and a `(min, max)` threshold pair to a score in
//! `[0, 1]`. Callers reject non-finite raw values before they get here.

use serde::{Deserialize, Serialize};

/// Normalization function attached to a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shape {
    /// Lower is better: `max` scores 0, `min` scores 1.
    #[default]
    ZShape,
    /// Higher is better: `min` scores 0, `max` scores 1.
    SShape,
}

impl Shape {
    /// Score `value` against the thresholds with this shape.
    pub fn score(self, value: f64, min: f64, max: f64) -> f64 {
        match self {
            Shape::ZShape => z_shape(value, min, max),
            Shape::SShape => s_shape(value, min, max),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Shape::ZShape => "z_shape",
            Shape::SShape => "s_shape",
        }
    }
}

/// Clamp into `[0, 1]`.
///
/// NaN (thresholds missing from the configuration) compares as neither
/// below 0 nor below 1 and lands on 1.0.
pub fn clamp01(x: f64) -> f64 {
    let upper = if x < 1.0 { x } else { 1.0 };
    if upper > 0.0 {
        upper
    } else {
        0.0
    }
}

/// `(max - value) / (max - min)`, clamped. Degenerate thresholds score 0.
pub fn z_shape(value: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    if span == 0.0 {
        return 0.0;
    }
    clamp01((max - value) / span)
}

/// `(value - min) / (max - min)`, clamped. Degenerate thresholds score 0.
pub fn s_shape(value: f64, min: f64, max: f64) -> f64 {
    let span = max - min;
    if span == 0.0 {
        return 0.0;
    }
    clamp01((value - min) / span)
}
