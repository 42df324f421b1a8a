//! Prometheus metrics for the region RPC broker.
//!
//! All metrics follow the naming convention: `region_rpc_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Gauge**: live rack connections, callers blocked waiting for a rack
//! - **Counter**: handshake failures, registrations, calls by outcome
//! - **Histogram**: round-trip duration of outgoing calls

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, Histogram, HistogramVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Registry every broker metric is registered with
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CONNECTION METRICS
    // =========================================================================

    /// Registered rack connections
    pub static ref RACK_CONNECTIONS: IntGauge = IntGauge::new(
        "region_rpc_rack_connections",
        "Number of registered rack controller connections"
    ).expect("metric creation failed");

    /// Callers blocked in `get_client_for`
    pub static ref PENDING_WAITERS: IntGauge = IntGauge::new(
        "region_rpc_pending_waiters",
        "Number of callers waiting for a rack connection"
    ).expect("metric creation failed");

    /// Failed authentication handshakes
    pub static ref HANDSHAKE_FAILURES: CounterVec = CounterVec::new(
        Opts::new("region_rpc_handshake_failures_total", "Failed rack handshakes"),
        &["reason"]  // reason: timeout/rejected/transport
    ).expect("metric creation failed");

    /// Rack registration attempts
    pub static ref REGISTRATIONS: CounterVec = CounterVec::new(
        Opts::new("region_rpc_registrations_total", "Rack controller registrations"),
        &["outcome"]  // outcome: accepted/refused
    ).expect("metric creation failed");

    // =========================================================================
    // CALL METRICS
    // =========================================================================

    /// Outgoing calls by command and outcome
    pub static ref CALLS: CounterVec = CounterVec::new(
        Opts::new("region_rpc_calls_total", "Commands issued to rack controllers"),
        &["command", "outcome"]  // outcome: ok/remote_error/timeout/closed/cached
    ).expect("metric creation failed");

    /// Outgoing call round-trip duration
    pub static ref CALL_DURATION: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "region_rpc_call_duration_seconds",
            "Round-trip time of commands issued to rack controllers"
        ).buckets(exponential_buckets(0.0005, 2.0, 16).expect("valid buckets")),
        &["command"]
    ).expect("metric creation failed");
}

/// Handle for the registered metrics
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register the broker metrics with [`REGISTRY`].
///
/// Calling this more than once is harmless.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Connections
        Box::new(RACK_CONNECTIONS.clone()),
        Box::new(PENDING_WAITERS.clone()),
        Box::new(HANDSHAKE_FAILURES.clone()),
        Box::new(REGISTRATIONS.clone()),
        // Calls
        Box::new(CALLS.clone()),
        Box::new(CALL_DURATION.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Render [`REGISTRY`] in the Prometheus text exposition format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Observes the elapsed time into a histogram when dropped.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start timing against `histogram`.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }

    /// Start a timer for one command's call duration.
    pub fn for_command(command: &str) -> Self {
        Self::new(&CALL_DURATION.with_label_values(&[command]))
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}
