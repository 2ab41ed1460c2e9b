//! Zabbix JSON-RPC metrics source.
//!
//! Authenticates once at construction; a failed login aborts the process
//! before any pass runs. Every later call failure is returned to the pass,
//! which skips the affected host or metric.

use pulse_common::error::SourceError;
use pulse_common::sample::RawSample;
use pulse_common::source::{MetricsSource, RemoteMetric, HISTORY_PAGE_LIMIT};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use crate::properties::ZabbixSettings;

/// Default HTTP timeout for API calls
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Blocking Zabbix API client
pub struct ZabbixClient {
    url: String,
    client: Client,
    auth: String,
    cookie: Option<String>,
    next_id: AtomicU64,
}

impl ZabbixClient {
    /// Build the HTTP client and log in.
    pub fn connect(
        settings: &ZabbixSettings,
        cookie: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SourceError::Http(format!("Failed to create HTTP client: {}", e)))?;

        let mut zabbix = Self {
            url: settings.url.clone(),
            client,
            auth: String::new(),
            cookie,
            next_id: AtomicU64::new(1),
        };

        let token = zabbix
            .call(
                "user.login",
                json!({"username": settings.username, "password": settings.password}),
                false,
            )
            .map_err(|e| SourceError::Auth(e.to_string()))?;
        zabbix.auth = token
            .as_str()
            .ok_or_else(|| SourceError::Auth(format!("unexpected login result: {}", token)))?
            .to_string();

        info!("[ZABBIX] Authenticated against {} as {}", settings.url, settings.username);
        Ok(zabbix)
    }

    fn call(&self, method: &str, params: Value, with_auth: bool) -> Result<Value, SourceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let auth = with_auth.then_some(self.auth.as_str());
        let body = build_request(method, params, auth, id);

        let mut request = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .json(&body);
        if let Some(cookie) = &self.cookie {
            request = request.header(COOKIE, cookie.as_str());
        }

        let response = request
            .send()
            .map_err(|e| SourceError::Http(format!("{} request failed: {}", method, e)))?;
        if !response.status().is_success() {
            return Err(SourceError::Http(format!(
                "HTTP {} from {}",
                response.status(),
                method
            )));
        }

        let payload: Value = response
            .json()
            .map_err(|e| SourceError::Malformed(format!("{}: {}", method, e)))?;
        debug!("[ZABBIX] {} ok (id {})", method, id);
        parse_response(payload)
    }
}

/// JSON-RPC 2.0 request body
pub fn build_request(method: &str, params: Value, auth: Option<&str>, id: u64) -> Value {
    let mut body = json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": id,
    });
    if let Some(auth) = auth {
        body["auth"] = Value::String(auth.to_string());
    }
    body
}

/// Extract `result`, or turn the `error` object into [`SourceError::Rpc`].
pub fn parse_response(payload: Value) -> Result<Value, SourceError> {
    if let Some(error) = payload.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error.get("message").and_then(Value::as_str).unwrap_or("");
        let data = error.get("data").and_then(Value::as_str).unwrap_or("");
        return Err(SourceError::Rpc {
            code,
            message: format!("{} {}", message, data).trim().to_string(),
        });
    }

    payload
        .get("result")
        .cloned()
        .ok_or_else(|| SourceError::Malformed("response has neither result nor error".to_string()))
}

/// `host.get` params for one host name
pub fn host_params(host: &str) -> Value {
    json!({"filter": {"host": [host]}})
}

/// `item.get` params for one host id
pub fn item_params(host_id: &str) -> Value {
    json!({
        "output": ["itemid", "key_", "value_type"],
        "hostids": host_id,
        "sortfield": "name",
    })
}

/// `history.get` params, newest first and capped at one page
pub fn history_params(metric: &RemoteMetric, time_from: i64, time_till: i64) -> Value {
    json!({
        "output": "extend",
        "history": metric.value_type,
        "itemids": metric.item_id,
        "sortfield": "clock",
        "sortorder": "DESC",
        "time_from": time_from,
        "time_till": time_till,
        "limit": HISTORY_PAGE_LIMIT,
    })
}

/// First `hostid` of a `host.get` result
pub fn first_host_id(result: &Value) -> Option<String> {
    result
        .as_array()?
        .first()?
        .get("hostid")?
        .as_str()
        .map(str::to_string)
}

impl MetricsSource for ZabbixClient {
    fn resolve_host(&self, host: &str) -> Result<Option<String>, SourceError> {
        let result = self.call("host.get", host_params(host), true)?;
        Ok(first_host_id(&result))
    }

    fn list_metrics(&self, host_id: &str) -> Result<Vec<RemoteMetric>, SourceError> {
        let result = self.call("item.get", item_params(host_id), true)?;
        serde_json::from_value(result).map_err(|e| SourceError::Malformed(format!("item.get: {}", e)))
    }

    fn fetch_history(
        &self,
        metric: &RemoteMetric,
        time_from: i64,
        time_till: i64,
    ) -> Result<Vec<RawSample>, SourceError> {
        let result = self.call(
            "history.get",
            history_params(metric, time_from, time_till),
            true,
        )?;
        let mut history: Vec<RawSample> = serde_json::from_value(result)
            .map_err(|e| SourceError::Malformed(format!("history.get: {}", e)))?;
        history.sort_by_key(|raw| raw.clock_secs().unwrap_or(i64::MIN));
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_with_auth() {
        let body = build_request("host.get", host_params("web-01"), Some("tok"), 2);
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["method"], "host.get");
        assert_eq!(body["params"]["filter"]["host"][0], "web-01");
        assert_eq!(body["auth"], "tok");
        assert_eq!(body["id"], 2);
    }

    #[test]
    fn test_login_request_has_no_auth() {
        let body = build_request("user.login", json!({"username": "u", "password": "p"}), None, 1);
        assert!(body.get("auth").is_none());
    }

    #[test]
    fn test_parse_response_result() {
        let payload = json!({"jsonrpc": "2.0", "result": [{"hostid": "10084"}], "id": 2});
        let result = parse_response(payload).unwrap();
        assert_eq!(first_host_id(&result), Some("10084".to_string()));
    }

    #[test]
    fn test_parse_response_error() {
        let payload = json!({
            "jsonrpc": "2.0",
            "error": {"code": -32602, "message": "Invalid params.", "data": "Not authorised."},
            "id": 3
        });
        match parse_response(payload) {
            Err(SourceError::Rpc { code, message }) => {
                assert_eq!(code, -32602);
                assert_eq!(message, "Invalid params. Not authorised.");
            }
            other => panic!("expected rpc error, got {:?}", other),
        }
    }

    #[test]
    fn test_first_host_id_empty_result() {
        assert_eq!(first_host_id(&json!([])), None);
    }

    #[test]
    fn test_history_params() {
        let metric = RemoteMetric {
            key: "system.cpu.util".to_string(),
            item_id: "23296".to_string(),
            value_type: 3,
        };
        let params = history_params(&metric, 100, 200);
        assert_eq!(params["history"], 3);
        assert_eq!(params["itemids"], "23296");
        assert_eq!(params["sortorder"], "DESC");
        assert_eq!(params["limit"], 1000);
        assert_eq!(params["time_from"], 100);
        assert_eq!(params["time_till"], 200);
    }

    #[test]
    fn test_history_result_deserializes() {
        let result = json!([
            {"itemid": "23296", "clock": "1700000060", "value": "12.5", "ns": "0"},
            {"itemid": "23296", "clock": "1700000000", "value": "10.0", "ns": "0"}
        ]);
        let mut history: Vec<RawSample> = serde_json::from_value(result).unwrap();
        history.sort_by_key(|raw| raw.clock_secs().unwrap_or(i64::MIN));
        assert_eq!(history[0].clock_secs(), Some(1_700_000_000));
        assert_eq!(history[1].value, json!("12.5"));
    }
}
