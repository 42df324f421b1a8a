//! Telemetry configuration from environment variables or a config file.

use serde::Deserialize;
use std::env;

/// Configuration for logging and metrics.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name attached to log lines
    pub service_name: String,

    /// Log filter directive (trace, debug, info, warn, error, or an
    /// `EnvFilter` expression such as `region_rpc=debug,info`)
    pub log_level: String,

    /// Whether to emit JSON formatted logs
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "regiond".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// - `REGION_SERVICE_NAME`: Service name (default: regiond)
    /// - `REGION_LOG_LEVEL` or `RUST_LOG`: Log filter (default: info)
    /// - `REGION_JSON_LOGS`: Enable JSON logs (default: false)
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides on top of this configuration.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(name) = env::var("REGION_SERVICE_NAME") {
            self.service_name = name;
        }
        if let Ok(level) = env::var("REGION_LOG_LEVEL").or_else(|_| env::var("RUST_LOG")) {
            self.log_level = level;
        }
        if let Ok(json) = env::var("REGION_JSON_LOGS") {
            self.json_logs = json.eq_ignore_ascii_case("true") || json == "1";
        }
        self
    }
}
