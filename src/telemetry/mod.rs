//! Telemetry module
//!
//! Structured logging, domain metrics, and the periodic heartbeat.

mod heartbeat;
mod logging;
mod metrics;

pub use heartbeat::Heartbeat;
pub use logging::init_logging;
pub use metrics::{serve_metrics, Metrics};

use crate::config::TelemetryConfig;
use std::sync::Arc;

/// Guard that owns the telemetry lifetime
pub struct TelemetryGuard {
    _priv: (),
}

/// Initialize logging and start the metrics exposition server
pub fn init_telemetry(
    config: &TelemetryConfig,
    metrics: Arc<Metrics>,
) -> anyhow::Result<TelemetryGuard> {
    init_logging(&config.log_level)?;
    serve_metrics(config.metrics_port, metrics);
    Ok(TelemetryGuard { _priv: () })
}
