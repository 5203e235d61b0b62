//! Server configuration.

use std::time::Duration;

use webstore_settings::ServerSettings;

/// Configuration for the webstore backend.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Outbound frames buffered per client before new ones are dropped.
    pub max_send_queue: usize,
    /// Interval between server-initiated pings.
    pub heartbeat_interval: Duration,
    /// Emit `onChangeDocDevMode` pushes.
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_send_queue: 1024,
            heartbeat_interval: Duration::from_secs(30),
            dev_mode: false,
        }
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            max_send_queue: settings.max_send_queue.max(1),
            heartbeat_interval: settings.heartbeat_interval(),
            dev_mode: settings.dev_mode,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
