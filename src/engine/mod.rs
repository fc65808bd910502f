//! Event dispatch engine
//!
//! Parses each bus payload, routes the typed event to the depth
//! analyzer and the matching strategies in a fixed order, isolates
//! strategy failures behind per-strategy circuit breakers, adapts any
//! signal, and hands it to the sink. One event is fully dispatched
//! before the next is read.

use crate::breaker::CircuitBreaker;
use crate::bus::SignalSink;
use crate::config::{BreakerConfig, Config};
use crate::depth::DepthAnalyzer;
use crate::events::{parse_envelope, MarketEvent};
use crate::params::ConfigManager;
use crate::signal::{ConfigProvenance, SignalAdapter};
use crate::strategy::{
    IcebergDetector, OrderBookSkew, SpreadLiquidity, Strategy, TickerVelocity,
    TradeMomentum,
};
use crate::telemetry::Metrics;
use chrono::Utc;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct StrategySlot {
    strategy: Box<dyn Strategy>,
    breaker: CircuitBreaker,
}

/// Single-threaded dispatcher owning the strategies
pub struct Engine {
    slots: Vec<StrategySlot>,
    analyzer: Arc<RwLock<DepthAnalyzer>>,
    config_manager: Arc<ConfigManager>,
    adapter: SignalAdapter,
    sink: Arc<dyn SignalSink>,
    metrics: Arc<Metrics>,
}

impl Engine {
    /// Build the engine with the enabled strategies in dispatch order:
    /// depth events run the analyzer, then orderbook_skew,
    /// spread_liquidity, iceberg_detector; trades run trade_momentum;
    /// tickers run ticker_velocity.
    pub fn new(
        config: &Config,
        analyzer: Arc<RwLock<DepthAnalyzer>>,
        config_manager: Arc<ConfigManager>,
        sink: Arc<dyn SignalSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let mut strategies: Vec<Box<dyn Strategy>> = Vec::new();
        if config.strategies.orderbook_skew {
            strategies.push(Box::new(OrderBookSkew::new()));
        }
        if config.strategies.spread_liquidity {
            strategies.push(Box::new(SpreadLiquidity::new()));
        }
        if config.strategies.iceberg_detector {
            strategies.push(Box::new(IcebergDetector::new()));
        }
        if config.strategies.trade_momentum {
            strategies.push(Box::new(TradeMomentum::new()));
        }
        if config.strategies.ticker_velocity {
            strategies.push(Box::new(TickerVelocity::new()));
        }

        for strategy in &strategies {
            tracing::info!(strategy = strategy.id(), "Strategy initialized");
        }

        Self::with_strategies(
            strategies,
            &config.breaker,
            analyzer,
            config_manager,
            sink,
            metrics,
        )
    }

    /// Build with an explicit strategy list (used by tests)
    pub fn with_strategies(
        strategies: Vec<Box<dyn Strategy>>,
        breaker_config: &BreakerConfig,
        analyzer: Arc<RwLock<DepthAnalyzer>>,
        config_manager: Arc<ConfigManager>,
        sink: Arc<dyn SignalSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let slots = strategies
            .into_iter()
            .map(|strategy| StrategySlot {
                strategy,
                breaker: CircuitBreaker::new(
                    breaker_config.failure_threshold,
                    Duration::from_secs(breaker_config.recovery_timeout_secs),
                ),
            })
            .collect();

        Self {
            slots,
            analyzer,
            config_manager,
            adapter: SignalAdapter::new(),
            sink,
            metrics,
        }
    }

    /// Decode and dispatch one bus payload
    pub async fn dispatch(&mut self, payload: &[u8]) {
        match parse_envelope(payload) {
            Ok(event) => self.dispatch_event(&event).await,
            Err(e) => {
                self.metrics
                    .events_dropped
                    .with_label_values(&[e.drop_reason()])
                    .inc();
                tracing::debug!(error = %e, "Dropping event");
            }
        }
    }

    /// Dispatch a typed event to the analyzer and matching strategies
    pub async fn dispatch_event(&mut self, event: &MarketEvent) {
        let now = Utc::now();
        self.metrics.messages_processed.inc();
        self.metrics.last_message_timestamp.set(now.timestamp());

        if let MarketEvent::Depth(depth) = event {
            let metrics = self.analyzer.write().await.analyze(depth);
            tracing::trace!(
                symbol = %depth.symbol,
                net_pressure = metrics.net_pressure,
                spread_bps = metrics.spread_bps,
                "Depth analyzed"
            );
        }

        let symbol = event.symbol().to_string();
        for i in 0..self.slots.len() {
            if self.slots[i].strategy.stream_kind() != event.kind() {
                continue;
            }
            let id = self.slots[i].strategy.id();

            if !self.slots[i].breaker.allow() {
                self.metrics
                    .strategy_executions
                    .with_label_values(&[id, "skipped"])
                    .inc();
                self.update_breaker_gauge(i);
                continue;
            }

            // Parameters are captured before the strategy runs and are
            // never re-read mid-dispatch; the manager's cache bounds
            // the cost and the staleness.
            let resolved = self.config_manager.get(id, Some(&symbol)).await;
            let provenance = ConfigProvenance::from(&resolved);
            let slot = &mut self.slots[i];
            slot.strategy.apply_params(&resolved);

            let started = Instant::now();
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                slot.strategy.on_event(event, now)
            }));
            self.metrics
                .strategy_latency
                .with_label_values(&[id])
                .observe(started.elapsed().as_secs_f64());

            match outcome {
                Ok(Ok(Some(signal))) => {
                    slot.breaker.record_success();
                    self.metrics
                        .strategy_executions
                        .with_label_values(&[id, "ok"])
                        .inc();

                    let wire = self.adapter.adapt(&signal, &provenance);
                    self.metrics
                        .signals_generated
                        .with_label_values(&[id, &wire.action])
                        .inc();
                    tracing::info!(
                        strategy = id,
                        symbol = %wire.symbol,
                        action = %wire.action,
                        confidence = wire.confidence,
                        "Signal generated"
                    );
                    if let Err(e) = self.sink.submit(wire).await {
                        tracing::error!(strategy = id, error = %e, "Signal submit failed");
                    }
                }
                Ok(Ok(None)) => {
                    self.slots[i].breaker.record_success();
                    self.metrics
                        .strategy_executions
                        .with_label_values(&[id, "ok"])
                        .inc();
                }
                Ok(Err(e)) => {
                    self.slots[i].breaker.record_failure();
                    self.metrics
                        .strategy_executions
                        .with_label_values(&[id, "error"])
                        .inc();
                    tracing::error!(strategy = id, error = %e, "Strategy failed");
                }
                Err(_) => {
                    self.slots[i].breaker.record_failure();
                    self.metrics
                        .strategy_executions
                        .with_label_values(&[id, "error"])
                        .inc();
                    tracing::error!(strategy = id, "Strategy panicked");
                }
            }
            self.update_breaker_gauge(i);
        }
    }

    fn update_breaker_gauge(&self, i: usize) {
        self.metrics
            .breaker_state
            .with_label_values(&[self.slots[i].strategy.id()])
            .set(self.slots[i].breaker.state().gauge_value());
    }

    pub fn strategy_count(&self) -> usize {
        self.slots.len()
    }
}
