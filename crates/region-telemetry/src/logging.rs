//! Structured logging setup.
//!
//! Every crate logs through `tracing` macros with structured fields such as
//! `peer`, `identity` and `connection_id`. This module installs the global
//! subscriber that renders them.

use crate::{TelemetryConfig, TelemetryError};
use tracing_subscriber::EnvFilter;

/// Handle returned once the global subscriber is installed.
pub struct StructuredLogger {
    _initialized: bool,
}

/// Install the global `tracing` subscriber.
///
/// Fails if the filter directive is invalid or a subscriber is already set.
pub fn init_logging(config: &TelemetryConfig) -> Result<StructuredLogger, TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| TelemetryError::Config(format!("log level {:?}: {e}", config.log_level)))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    let installed = if config.json_logs {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::debug!(
        service = %config.service_name,
        json_logs = config.json_logs,
        "Structured logging configured"
    );

    Ok(StructuredLogger { _initialized: true })
}

/// Log a rack-related event with standard fields.
#[macro_export]
macro_rules! log_rack_event {
    ($level:ident, $msg:expr, $identity:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            identity = %$identity,
            $($($field)*,)?
            $msg
        )
    };
}
