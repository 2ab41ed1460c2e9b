//! Pulse daemon library - exposes modules for testing.

pub mod controller;
pub mod credentials;
pub mod influx;
pub mod properties;
pub mod zabbix;
