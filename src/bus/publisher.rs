//! Outbound signal publisher with retry and circuit breaking

use super::{PublishError, SignalSink};
use crate::breaker::CircuitBreaker;
use crate::config::{BreakerConfig, PublisherConfig};
use crate::signal::TradeSignal;
use crate::telemetry::Metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Pre-publish validation: the wire contract's hard requirements
pub fn validate_signal(signal: &TradeSignal) -> Result<(), String> {
    if signal.symbol.is_empty() {
        return Err("symbol is empty".to_string());
    }
    if signal.strategy_id.is_empty() {
        return Err("strategy_id is empty".to_string());
    }
    if signal.action.is_empty() {
        return Err("action is empty".to_string());
    }
    if !(0.0..=1.0).contains(&signal.confidence) {
        return Err(format!("confidence {} outside [0, 1]", signal.confidence));
    }
    if signal.price <= rust_decimal::Decimal::ZERO {
        return Err(format!("price {} is not positive", signal.price));
    }
    Ok(())
}

/// Enqueue half handed to the engine
#[derive(Clone)]
pub struct PublisherHandle {
    tx: mpsc::Sender<TradeSignal>,
}

#[async_trait]
impl SignalSink for PublisherHandle {
    async fn submit(&self, signal: TradeSignal) -> Result<(), PublishError> {
        self.tx
            .send(signal)
            .await
            .map_err(|_| PublishError::QueueClosed)
    }
}

/// Background publisher draining the signal queue onto the bus topic
pub struct Publisher {
    client: async_nats::Client,
    topic: String,
    config: PublisherConfig,
    metrics: Arc<Metrics>,
    breaker: CircuitBreaker,
    rx: mpsc::Receiver<TradeSignal>,
}

impl Publisher {
    /// Create the publisher and its engine-facing handle
    pub fn new(
        client: async_nats::Client,
        topic: String,
        config: PublisherConfig,
        breaker_config: &BreakerConfig,
        metrics: Arc<Metrics>,
    ) -> (PublisherHandle, Self) {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let breaker = CircuitBreaker::new(
            breaker_config.failure_threshold,
            Duration::from_secs(breaker_config.recovery_timeout_secs),
        );
        (
            PublisherHandle { tx },
            Self {
                client,
                topic,
                config,
                metrics,
                breaker,
                rx,
            },
        )
    }

    /// Run the publishing loop until the queue closes
    pub async fn run(mut self) {
        tracing::info!(topic = %self.topic, "Signal publisher started");

        while let Some(signal) = self.rx.recv().await {
            if let Err(reason) = validate_signal(&signal) {
                tracing::warn!(
                    signal_id = %signal.signal_id,
                    reason,
                    "Dropping invalid signal"
                );
                self.metrics.publish_dropped.inc();
                continue;
            }

            if !self.breaker.allow() {
                tracing::warn!(
                    signal_id = %signal.signal_id,
                    "Publisher breaker open, dropping signal"
                );
                self.metrics.publish_dropped.inc();
                continue;
            }

            match self.publish_with_retry(&signal).await {
                Ok(()) => {
                    self.breaker.record_success();
                    self.metrics.signals_published.inc();
                    tracing::info!(
                        signal_id = %signal.signal_id,
                        symbol = %signal.symbol,
                        action = %signal.action,
                        strategy = %signal.strategy,
                        confidence = signal.confidence,
                        "Signal published"
                    );
                }
                Err(e) => {
                    self.breaker.record_failure();
                    self.metrics.publish_dropped.inc();
                    tracing::error!(
                        signal_id = %signal.signal_id,
                        error = %e,
                        "Signal dropped after retries"
                    );
                }
            }
            self.metrics
                .breaker_state
                .with_label_values(&["publisher"])
                .set(self.breaker.state().gauge_value());
        }

        tracing::info!("Signal publisher stopped");
    }

    /// Publish with exponential backoff, bounded by max_retries
    async fn publish_with_retry(&mut self, signal: &TradeSignal) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(signal)
            .map_err(|e| PublishError::Invalid(e.to_string()))?;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                self.metrics.publish_retries.inc();
                tokio::time::sleep(delay).await;
                delay *= 2;
            }

            let result = self
                .client
                .publish(self.topic.clone(), payload.clone().into())
                .await;
            match result {
                Ok(()) => match self.client.flush().await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "Publish flush failed");
                    }
                },
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Publish attempt failed");
                }
            }
        }

        Err(PublishError::Bus(format!(
            "exhausted {} attempts",
            self.config.max_retries + 1
        )))
    }
}

/// In-process sink capturing signals on a channel, for tests and
/// dry-run mode
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<TradeSignal>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TradeSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl SignalSink for ChannelSink {
    async fn submit(&self, signal: TradeSignal) -> Result<(), PublishError> {
        self.tx.send(signal).map_err(|_| PublishError::QueueClosed)
    }
}
