//! Structured logging setup shared by the backend and the CLI.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};
use webstore_settings::LoggingSettings;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "webstore_rpc" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Build from loaded settings. Unparseable levels fall back to INFO for the
    /// default and are skipped for module overrides.
    pub fn from_settings(logging: &LoggingSettings) -> Self {
        let log_level = Level::from_str(&logging.level).unwrap_or(Level::INFO);
        let module_levels = logging
            .module_levels
            .iter()
            .filter_map(|(module, level)| {
                Level::from_str(level)
                    .ok()
                    .map(|level| (module.clone(), level))
            })
            .collect();
        Self {
            log_level,
            module_levels,
            json: logging.json,
        }
    }

    /// `EnvFilter` directive string, e.g. `info,webstore_rpc=debug`.
    pub fn filter_directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

/// Install the global subscriber. Returns `false` when one was already set,
/// so repeated calls (tests, embedded use) are harmless.
pub fn init_telemetry(config: &TelemetryConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer().with_target(true).boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer.with_filter(env_filter))
        .try_init()
        .is_ok()
}
