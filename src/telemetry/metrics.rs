//! Domain metrics
//!
//! Counters, histograms, and gauges for intake, strategy execution,
//! signal generation, publishing, and breaker state, exposed in
//! Prometheus text format on the telemetry port.

use axum::routing::get;
use axum::Router;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge,
    IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// All domain metrics, registered on a private registry
pub struct Metrics {
    registry: Registry,

    pub messages_processed: IntCounter,
    /// reason: parse | unknown_stream | validation
    pub events_dropped: IntCounterVec,
    /// strategy, result: ok | error | skipped
    pub strategy_executions: IntCounterVec,
    /// strategy, action
    pub signals_generated: IntCounterVec,
    pub strategy_latency: HistogramVec,
    pub signals_published: IntCounter,
    pub publish_retries: IntCounter,
    pub publish_dropped: IntCounter,
    /// component: strategy id or "publisher"; 0 closed, 1 open, 2 half-open
    pub breaker_state: IntGaugeVec,
    pub last_message_timestamp: IntGauge,
    /// action: CREATE | UPDATE | DELETE
    pub config_changes: IntCounterVec,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let messages_processed = IntCounter::with_opts(Opts::new(
            "messages_processed_total",
            "Bus messages fully dispatched",
        ))
        .expect("metric opts");
        let events_dropped = IntCounterVec::new(
            Opts::new("events_dropped_total", "Events dropped at intake"),
            &["reason"],
        )
        .expect("metric opts");
        let strategy_executions = IntCounterVec::new(
            Opts::new("strategy_executions_total", "Strategy invocations"),
            &["strategy", "result"],
        )
        .expect("metric opts");
        let signals_generated = IntCounterVec::new(
            Opts::new("signals_generated_total", "Signals emitted by strategies"),
            &["strategy", "action"],
        )
        .expect("metric opts");
        let strategy_latency = HistogramVec::new(
            HistogramOpts::new(
                "strategy_latency_seconds",
                "Per-event strategy execution time",
            )
            .buckets(vec![
                1e-6, 1e-5, 1e-4, 5e-4, 1e-3, 5e-3, 1e-2, 5e-2, 1e-1,
            ]),
            &["strategy"],
        )
        .expect("metric opts");
        let signals_published = IntCounter::with_opts(Opts::new(
            "signals_published_total",
            "Signals successfully published",
        ))
        .expect("metric opts");
        let publish_retries = IntCounter::with_opts(Opts::new(
            "publish_retries_total",
            "Publish attempts beyond the first",
        ))
        .expect("metric opts");
        let publish_dropped = IntCounter::with_opts(Opts::new(
            "publish_dropped_total",
            "Signals dropped after exhausting retries",
        ))
        .expect("metric opts");
        let breaker_state = IntGaugeVec::new(
            Opts::new("breaker_state", "Circuit breaker state per component"),
            &["component"],
        )
        .expect("metric opts");
        let last_message_timestamp = IntGauge::with_opts(Opts::new(
            "last_message_timestamp_seconds",
            "Unix timestamp of the last processed message",
        ))
        .expect("metric opts");
        let config_changes = IntCounterVec::new(
            Opts::new("config_changes_total", "Configuration mutations"),
            &["action"],
        )
        .expect("metric opts");

        for collector in [
            Box::new(messages_processed.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(events_dropped.clone()),
            Box::new(strategy_executions.clone()),
            Box::new(signals_generated.clone()),
            Box::new(strategy_latency.clone()),
            Box::new(signals_published.clone()),
            Box::new(publish_retries.clone()),
            Box::new(publish_dropped.clone()),
            Box::new(breaker_state.clone()),
            Box::new(last_message_timestamp.clone()),
            Box::new(config_changes.clone()),
        ] {
            registry.register(collector).expect("metric registration");
        }

        Self {
            registry,
            messages_processed,
            events_dropped,
            strategy_executions,
            signals_generated,
            strategy_latency,
            signals_published,
            publish_retries,
            publish_dropped,
            breaker_state,
            last_message_timestamp,
            config_changes,
        }
    }

    /// Render the registry in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Metrics encoding failed");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }

    /// Sum every sample of a counter family; used by the heartbeat
    pub fn counter_total(&self, name: &str) -> u64 {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == name)
            .flat_map(|family| family.get_metric())
            .map(|metric| metric.get_counter().get_value() as u64)
            .sum()
    }

    /// Sum counter samples whose label matches the given value
    pub fn counter_total_with_label(&self, name: &str, label: &str, value: &str) -> u64 {
        self.registry
            .gather()
            .iter()
            .filter(|family| family.get_name() == name)
            .flat_map(|family| family.get_metric())
            .filter(|metric| {
                metric
                    .get_label()
                    .iter()
                    .any(|pair| pair.get_name() == label && pair.get_value() == value)
            })
            .map(|metric| metric.get_counter().get_value() as u64)
            .sum()
    }
}

/// Spawn the metrics exposition server
pub fn serve_metrics(port: u16, metrics: Arc<Metrics>) {
    tokio::spawn(async move {
        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = metrics.clone();
                async move { metrics.render() }
            }),
        );
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        tracing::info!(addr = %addr, "Starting metrics server");

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "Metrics server error");
                }
            }
            Err(e) => tracing::error!(error = %e, port, "Failed to bind metrics server"),
        }
    });
}
