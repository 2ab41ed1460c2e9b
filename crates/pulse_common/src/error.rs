//! Error types for Pulse.
//!
//! Each collaborator boundary has its own enum so callers can decide which
//! failures skip a host, which drop a point and which abort the process.

use std::path::PathBuf;
use thiserror::Error;

/// Failures while loading or validating the scoring configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Failures reported by the upstream metrics source.
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Failures while writing a single point to the sink.
#[derive(Error, Debug, Clone)]
pub enum SinkError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Write rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(String),
}

/// Why a single upstream sample could not be used.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` is not numeric: {raw}")]
    NotNumeric { field: &'static str, raw: String },

    #[error("value {0} is not finite")]
    NonFinite(f64),
}
