//! Queue-group bus consumer

use crate::config::BusConfig;
use crate::engine::Engine;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::time::sleep;

/// Maximum connection attempts before giving up at startup
const MAX_CONNECT_ATTEMPTS: u32 = 10;

/// Initial reconnection delay
const INITIAL_CONNECT_DELAY: Duration = Duration::from_secs(1);

/// Maximum reconnection delay
const MAX_CONNECT_DELAY: Duration = Duration::from_secs(60);

/// Load-balanced subscriber feeding the dispatch engine.
///
/// The queue group makes the bus deliver each message to exactly one
/// replica; every replica runs the same group name.
pub struct Consumer {
    config: BusConfig,
}

impl Consumer {
    pub fn new(config: BusConfig) -> Self {
        Self { config }
    }

    /// Connect to the bus with exponential backoff
    pub async fn connect(&self) -> anyhow::Result<async_nats::Client> {
        let mut attempts = 0;
        let mut delay = INITIAL_CONNECT_DELAY;

        loop {
            tracing::info!(url = %self.config.url, "Connecting to bus");
            match async_nats::ConnectOptions::new()
                .name(&self.config.consumer_name)
                .connect(self.config.url.as_str())
                .await
            {
                Ok(client) => {
                    tracing::info!(url = %self.config.url, "Connected to bus");
                    return Ok(client);
                }
                Err(e) => {
                    attempts += 1;
                    tracing::warn!(
                        error = %e,
                        attempt = attempts,
                        "Bus connection failed, retrying..."
                    );
                    if attempts >= MAX_CONNECT_ATTEMPTS {
                        anyhow::bail!(
                            "bus unreachable after {} attempts",
                            MAX_CONNECT_ATTEMPTS
                        );
                    }
                    sleep(delay).await;
                    delay = (delay * 2).min(MAX_CONNECT_DELAY);
                }
            }
        }
    }

    /// Subscribe and dispatch until the subscription ends.
    ///
    /// A message is fully dispatched before the next is read; there is
    /// no internal queueing, so a slow strategy naturally pushes back
    /// on the bus receive window.
    pub async fn run(
        &self,
        client: &async_nats::Client,
        engine: &mut Engine,
    ) -> anyhow::Result<()> {
        let mut subscription = client
            .queue_subscribe(
                self.config.consumer_topic.clone(),
                self.config.queue_group.clone(),
            )
            .await
            .map_err(|e| anyhow::anyhow!("subscribe failed: {}", e))?;

        tracing::info!(
            topic = %self.config.consumer_topic,
            queue_group = %self.config.queue_group,
            "Subscribed to market events"
        );

        while let Some(message) = subscription.next().await {
            engine.dispatch(&message.payload).await;
        }

        tracing::warn!("Bus subscription ended");
        Ok(())
    }

    /// Consume forever, resubscribing after subscription loss and
    /// restarting the loop after a dispatch panic
    pub async fn run_forever(
        &self,
        client: async_nats::Client,
        mut engine: Engine,
    ) -> anyhow::Result<()> {
        loop {
            match self.run(&client, &mut engine).await {
                Ok(()) => {
                    tracing::warn!("Consume loop ended, resubscribing");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Consume loop failed, restarting");
                }
            }
            sleep(INITIAL_CONNECT_DELAY).await;
        }
    }
}
