//! Metrics source interface.
//!
//! The pipeline only sees this trait. The daemon plugs in the Zabbix
//! JSON-RPC client; tests plug in [`FakeMetricsSource`].

use crate::error::SourceError;
use crate::sample::RawSample;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Maximum number of history records returned per fetch. There is no
/// pagination, longer ranges are silently truncated upstream.
pub const HISTORY_PAGE_LIMIT: usize = 1000;

/// A metric item known to the source for a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMetric {
    #[serde(rename = "key_")]
    pub key: String,
    #[serde(rename = "itemid")]
    pub item_id: String,
    /// Upstream history table selector (0 float, 3 unsigned, ...)
    #[serde(default, deserialize_with = "de_value_type")]
    pub value_type: u8,
}

fn de_value_type<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s.parse().map_err(D::Error::custom),
        serde_json::Value::Number(n) => n
            .as_u64()
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| D::Error::custom(format!("invalid value_type {}", n))),
        serde_json::Value::Null => Ok(0),
        other => Err(D::Error::custom(format!("invalid value_type {}", other))),
    }
}

/// Upstream metrics source
pub trait MetricsSource: Send + Sync {
    /// Resolve a configured host name to the source's host id.
    fn resolve_host(&self, host: &str) -> Result<Option<String>, SourceError>;

    /// List the metric items of a host.
    fn list_metrics(&self, host_id: &str) -> Result<Vec<RemoteMetric>, SourceError>;

    /// Fetch history of one item in `[time_from, time_till]`, ascending by
    /// clock, at most [`HISTORY_PAGE_LIMIT`] records.
    fn fetch_history(
        &self,
        metric: &RemoteMetric,
        time_from: i64,
        time_till: i64,
    ) -> Result<Vec<RawSample>, SourceError>;
}

/// In-memory metrics source for testing
#[derive(Default)]
pub struct FakeMetricsSource {
    hosts: HashMap<String, String>,
    metrics: HashMap<String, Vec<RemoteMetric>>,
    history: HashMap<String, Vec<RawSample>>,
    failing_hosts: Vec<String>,
    history_calls: Mutex<Vec<(String, i64, i64)>>,
}

impl FakeMetricsSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host name and its id
    pub fn with_host(mut self, host: &str, host_id: &str) -> Self {
        self.hosts.insert(host.to_string(), host_id.to_string());
        self
    }

    /// Register a metric item on a host id with its full history
    pub fn with_metric(
        mut self,
        host_id: &str,
        key: &str,
        item_id: &str,
        history: Vec<RawSample>,
    ) -> Self {
        self.metrics
            .entry(host_id.to_string())
            .or_default()
            .push(RemoteMetric {
                key: key.to_string(),
                item_id: item_id.to_string(),
                value_type: 0,
            });
        self.history.insert(item_id.to_string(), history);
        self
    }

    /// Make every call for this host id fail as if the source were down
    pub fn with_failing_host(mut self, host_id: &str) -> Self {
        self.failing_hosts.push(host_id.to_string());
        self
    }

    /// `(item_id, time_from, time_till)` of every history fetch so far
    pub fn history_calls(&self) -> Vec<(String, i64, i64)> {
        self.history_calls
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

impl MetricsSource for FakeMetricsSource {
    fn resolve_host(&self, host: &str) -> Result<Option<String>, SourceError> {
        Ok(self.hosts.get(host).cloned())
    }

    fn list_metrics(&self, host_id: &str) -> Result<Vec<RemoteMetric>, SourceError> {
        if self.failing_hosts.iter().any(|h| h == host_id) {
            return Err(SourceError::Http("connection refused".to_string()));
        }
        Ok(self.metrics.get(host_id).cloned().unwrap_or_default())
    }

    fn fetch_history(
        &self,
        metric: &RemoteMetric,
        time_from: i64,
        time_till: i64,
    ) -> Result<Vec<RawSample>, SourceError> {
        if let Ok(mut calls) = self.history_calls.lock() {
            calls.push((metric.item_id.clone(), time_from, time_till));
        }

        let history = self.history.get(&metric.item_id).cloned().unwrap_or_default();
        let mut selected: Vec<RawSample> = history
            .into_iter()
            .filter(|raw| {
                raw.clock_secs()
                    .map_or(true, |ts| ts >= time_from && ts <= time_till)
            })
            .collect();
        selected.sort_by_key(|raw| raw.clock_secs().unwrap_or(i64::MIN));

        // the page holds the newest records
        let overflow = selected.len().saturating_sub(HISTORY_PAGE_LIMIT);
        Ok(selected.split_off(overflow))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_metric_from_zabbix_json() {
        let json = serde_json::json!({"itemid": "23296", "key_": "system.cpu.util", "value_type": "0"});
        let metric: RemoteMetric = serde_json::from_value(json).unwrap();
        assert_eq!(metric.key, "system.cpu.util");
        assert_eq!(metric.item_id, "23296");
        assert_eq!(metric.value_type, 0);

        let json = serde_json::json!({"itemid": "1", "key_": "k", "value_type": 3});
        let metric: RemoteMetric = serde_json::from_value(json).unwrap();
        assert_eq!(metric.value_type, 3);
    }

    #[test]
    fn test_fake_source_filters_range() {
        let source = FakeMetricsSource::new().with_host("web-01", "10").with_metric(
            "10",
            "cpu",
            "100",
            vec![RawSample::new(0, 1), RawSample::new(60, 2), RawSample::new(120, 3)],
        );

        assert_eq!(source.resolve_host("web-01").unwrap(), Some("10".to_string()));
        assert_eq!(source.resolve_host("nope").unwrap(), None);

        let metrics = source.list_metrics("10").unwrap();
        let history = source.fetch_history(&metrics[0], 60, 200).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(source.history_calls(), vec![("100".to_string(), 60, 200)]);
    }

    #[test]
    fn test_fake_source_failing_host() {
        let source = FakeMetricsSource::new()
            .with_host("db-01", "20")
            .with_failing_host("20");
        assert!(source.list_metrics("20").is_err());
    }

    #[test]
    fn test_fake_source_keeps_newest_page() {
        let history: Vec<RawSample> = (0..1_500).map(|ts| RawSample::new(ts, 1)).collect();
        let source = FakeMetricsSource::new()
            .with_host("web-01", "10")
            .with_metric("10", "cpu", "100", history);

        let metrics = source.list_metrics("10").unwrap();
        let page = source.fetch_history(&metrics[0], 0, 2_000).unwrap();
        assert_eq!(page.len(), HISTORY_PAGE_LIMIT);
        assert_eq!(page[0].clock_secs(), Some(500));
        assert_eq!(page[HISTORY_PAGE_LIMIT - 1].clock_secs(), Some(1_499));
    }
}
