//! Periodic heartbeat logging aggregated service statistics

use super::metrics::Metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default)]
struct Snapshot {
    messages: u64,
    signals: u64,
    published: u64,
    dropped: u64,
    strategy_errors: u64,
}

/// Emits one aggregated statistics line per interval
pub struct Heartbeat {
    metrics: Arc<Metrics>,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(metrics: Arc<Metrics>, interval: Duration) -> Self {
        Self { metrics, interval }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            messages: self.metrics.counter_total("messages_processed_total"),
            signals: self.metrics.counter_total("signals_generated_total"),
            published: self.metrics.counter_total("signals_published_total"),
            dropped: self.metrics.counter_total("events_dropped_total"),
            strategy_errors: self.metrics.counter_total_with_label(
                "strategy_executions_total",
                "result",
                "error",
            ),
        }
    }

    /// Spawn the heartbeat loop
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let started = Instant::now();
            let mut previous = self.snapshot();
            let mut beat: u64 = 0;
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; skip it so deltas cover
            // a full interval
            interval.tick().await;

            loop {
                interval.tick().await;
                beat += 1;
                let current = self.snapshot();
                let secs = self.interval.as_secs_f64().max(1.0);

                tracing::info!(
                    heartbeat = beat,
                    uptime_secs = started.elapsed().as_secs(),
                    total_messages = current.messages,
                    total_signals = current.signals,
                    total_published = current.published,
                    total_dropped = current.dropped,
                    total_strategy_errors = current.strategy_errors,
                    messages_delta = current.messages - previous.messages,
                    signals_delta = current.signals - previous.signals,
                    messages_per_second =
                        (current.messages - previous.messages) as f64 / secs,
                    signals_per_second =
                        (current.signals - previous.signals) as f64 / secs,
                    "Heartbeat"
                );

                previous = current;
            }
        })
    }
}
