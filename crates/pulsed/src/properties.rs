//! Process properties.
//!
//! Connection settings live in a flat `key=value` file (`config.properties`)
//! next to the scoring config. Lines starting with `#` are comments.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Default properties file path
pub const PROPERTIES_PATH: &str = "config.properties";

/// Default local InfluxDB write endpoint
pub const DEFAULT_INFLUX_URL: &str = "http://localhost:8086/api/v2/write";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read properties {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing required property `{0}`")]
    Missing(String),

    #[error("Invalid value for `{key}`: {value}")]
    Invalid { key: String, value: String },
}

/// Parsed `key=value` pairs
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let props = Self::parse(&contents);
        info!("[CONFIG] Loaded {} properties from {}", props.values.len(), path.display());
        Ok(props)
    }

    pub fn parse(contents: &str) -> Self {
        let values = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();
        Self { values }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    pub fn require(&self, key: &str) -> Result<&str, SettingsError> {
        self.get(key)
            .ok_or_else(|| SettingsError::Missing(key.to_string()))
    }
}

/// Where a service is reached: directly, or through the authenticated tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceMode {
    Local,
    Cloud,
}

impl ServiceMode {
    fn from_property(props: &Properties, key: &str) -> Result<Self, SettingsError> {
        match props.get(key).unwrap_or("local") {
            "local" => Ok(ServiceMode::Local),
            "cloud" => Ok(ServiceMode::Cloud),
            other => Err(SettingsError::Invalid {
                key: key.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// InfluxDB v2 write settings
#[derive(Debug, Clone)]
pub struct InfluxSettings {
    pub mode: ServiceMode,
    pub url: String,
    pub token: String,
    pub org: String,
    pub bucket: String,
    /// Token file prefix for the tunnel cookie (cloud mode)
    pub token_prefix: Option<String>,
}

/// Zabbix API settings
#[derive(Debug, Clone)]
pub struct ZabbixSettings {
    pub mode: ServiceMode,
    pub url: String,
    pub username: String,
    pub password: String,
    /// Token file prefix for the tunnel cookie (cloud mode)
    pub token_prefix: Option<String>,
}

/// Everything the daemon needs to reach its collaborators
#[derive(Debug, Clone)]
pub struct Settings {
    pub influx: InfluxSettings,
    pub zabbix: ZabbixSettings,
    /// Folder holding tunnel access tokens
    pub token_folder: Option<String>,
}

impl Settings {
    pub fn from_properties(props: &Properties) -> Result<Self, SettingsError> {
        let influx_mode = ServiceMode::from_property(props, "influxdb.mode")?;
        let influx_url = match influx_mode {
            ServiceMode::Cloud => props.require("influxdb.cloud.url")?.to_string(),
            ServiceMode::Local => props
                .get("influxdb.local.url")
                .unwrap_or(DEFAULT_INFLUX_URL)
                .to_string(),
        };

        let zabbix_mode = ServiceMode::from_property(props, "zabbix.mode")?;
        let zabbix_url = match zabbix_mode {
            ServiceMode::Cloud => props.require("zabbix.cloud.url")?,
            ServiceMode::Local => props.require("zabbix.local.url")?,
        };

        let settings = Self {
            influx: InfluxSettings {
                mode: influx_mode,
                url: influx_url,
                token: props.require("influxdb.token")?.to_string(),
                org: props.require("influxdb.org")?.to_string(),
                bucket: props.require("influxdb.bucket")?.to_string(),
                token_prefix: props.get("influxdb.folder.prefix").map(str::to_string),
            },
            zabbix: ZabbixSettings {
                mode: zabbix_mode,
                url: zabbix_url.to_string(),
                username: props.require("zabbix.username")?.to_string(),
                password: props.require("zabbix.password")?.to_string(),
                token_prefix: props.get("zabbix.folder.prefix").map(str::to_string),
            },
            token_folder: props.get("cloudflare.token.path").map(str::to_string),
        };

        let uses_tunnel =
            settings.influx.mode == ServiceMode::Cloud || settings.zabbix.mode == ServiceMode::Cloud;
        if uses_tunnel && settings.token_folder.is_none() {
            return Err(SettingsError::Missing("cloudflare.token.path".to_string()));
        }

        Ok(settings)
    }
}
