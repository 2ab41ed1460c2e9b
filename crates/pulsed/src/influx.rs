//! InfluxDB v2 sink.
//!
//! One HTTP write per point, line protocol with second precision. There is
//! no batching and no retry queue; the emitter logs and drops failures.

use pulse_common::emit::{Point, PointSink};
use pulse_common::error::SinkError;
use reqwest::blocking::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE};
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::properties::InfluxSettings;

/// Blocking InfluxDB writer
pub struct InfluxSink {
    url: String,
    token: String,
    org: String,
    bucket: String,
    cookie: Option<String>,
    client: Client,
}

impl InfluxSink {
    pub fn new(
        settings: &InfluxSettings,
        cookie: Option<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: settings.url.clone(),
            token: settings.token.clone(),
            org: settings.org.clone(),
            bucket: settings.bucket.clone(),
            cookie,
            client,
        })
    }
}

impl PointSink for InfluxSink {
    fn write(&self, point: &Point) -> Result<(), SinkError> {
        let line = point.to_line_protocol();

        let mut request = self
            .client
            .post(&self.url)
            .query(&[
                ("bucket", self.bucket.as_str()),
                ("org", self.org.as_str()),
                ("precision", "s"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.token))
            .header(CONTENT_TYPE, "text/plain")
            .body(line.clone());
        if let Some(cookie) = &self.cookie {
            request = request.header(COOKIE, cookie.as_str());
        }

        let response = request
            .send()
            .map_err(|e| SinkError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        debug!("[INFLUX] Wrote {}", line);
        Ok(())
    }
}

/// Dry-run sink printing line protocol to any writer (stdout by default)
pub struct LineSink<W: Write + Send> {
    out: Mutex<W>,
}

impl LineSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> Result<W, SinkError> {
        self.out.into_inner().map_err(|e| SinkError::Io(e.to_string()))
    }
}

impl<W: Write + Send> PointSink for LineSink<W> {
    fn write(&self, point: &Point) -> Result<(), SinkError> {
        let mut out = self.out.lock().map_err(|e| SinkError::Io(e.to_string()))?;
        writeln!(out, "{}", point.to_line_protocol()).map_err(|e| SinkError::Io(e.to_string()))
    }
}
