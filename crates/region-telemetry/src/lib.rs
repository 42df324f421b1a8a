//! # Region Telemetry
//!
//! Logging and metrics for the region RPC broker.
//!
//! ## Components
//!
//! - **Logging**: `tracing-subscriber` fmt layer with an env filter, plain or
//!   JSON output.
//! - **Metrics**: Prometheus counters and gauges for rack connections,
//!   waiters, handshakes and registrations.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use region_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `REGION_SERVICE_NAME` | `regiond` | Service name attached to logs |
//! | `REGION_LOG_LEVEL` | `info` | Log filter directive (falls back to `RUST_LOG`) |
//! | `REGION_JSON_LOGS` | `false` | Emit JSON formatted logs |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::{init_logging, StructuredLogger};
pub use metrics::{
    encode_metrics, register_metrics, HistogramTimer, MetricsHandle, CALLS, CALL_DURATION,
    HANDSHAKE_FAILURES, PENDING_WAITERS, RACK_CONNECTIONS, REGISTRATIONS,
};

use thiserror::Error;

/// Why telemetry could not be brought up.
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Keep the returned guard alive until the daemon exits.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    let logger = init_logging(config)?;

    tracing::info!(service = %config.service_name, "Telemetry initialized");

    Ok(TelemetryGuard {
        _logger: logger,
        _metrics: metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    _logger: StructuredLogger,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry");
    }
}
