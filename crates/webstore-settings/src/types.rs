//! Settings type definitions.
//!
//! Field names are camelCase in the JSON file. Every section carries
//! `#[serde(default)]` so a partial file only overrides what it names.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings type.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebstoreSettings {
    /// Networked reference backend.
    pub server: ServerSettings,
    /// Client-side connection to a backend.
    pub client: ClientSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Backend bind address and connection limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// WebSocket port. `0` picks a free port.
    pub port: u16,
    /// Per-client outbound queue length before frames are dropped.
    pub max_send_queue: usize,
    /// WebSocket ping interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Emit `onChangeDocDevMode` pushes alongside `onChange`.
    pub dev_mode: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            max_send_queue: 1024,
            heartbeat_interval_ms: 30_000,
            dev_mode: false,
        }
    }
}

impl ServerSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// Backend WebSocket endpoint.
    pub url: String,
    pub connect_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8787/ws".to_string(),
            connect_timeout_ms: 5_000,
        }
    }
}

impl ClientSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Per-module level overrides, e.g. `{"webstore_rpc": "debug"}`.
    pub module_levels: BTreeMap<String, String>,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            module_levels: BTreeMap::new(),
            json: false,
        }
    }
}
