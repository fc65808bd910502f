//! Run command implementation: wires the bus, store, engine, and API

use crate::api::{self, AppState};
use crate::bus::{Consumer, Publisher};
use crate::config::Config;
use crate::depth::DepthAnalyzer;
use crate::engine::Engine;
use crate::params::{ConfigManager, ConfigStore, MemoryStore, MongoStore};
use crate::telemetry::{Heartbeat, Metrics};
use anyhow::Result;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Cadence of the depth analyzer TTL sweep
const ANALYZER_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Use an in-process configuration store instead of MongoDB
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: Config, metrics: Arc<Metrics>) -> Result<()> {
        tracing::info!(
            consumer_topic = %config.bus.consumer_topic,
            publisher_topic = %config.bus.publisher_topic,
            queue_group = %config.bus.queue_group,
            strategies = ?config.enabled_strategies(),
            "Starting realtime-strategies"
        );

        // Configuration store; the service degrades to env/defaults
        // when the document store is unreachable
        let store: Option<Arc<dyn ConfigStore>> = if self.dry_run {
            tracing::info!("Dry run: using in-process configuration store");
            Some(Arc::new(MemoryStore::new()))
        } else {
            match MongoStore::connect(
                &config.store.mongodb_uri,
                &config.store.database,
                config.store_timeout(),
            )
            .await
            {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "Configuration store unreachable, continuing with env/defaults"
                    );
                    None
                }
            }
        };

        let config_manager = Arc::new(ConfigManager::new(store, config.cache_ttl()));
        let _cache_sweeper = config_manager.spawn_cache_sweeper();

        // Depth analyzer with its periodic TTL sweep
        let analyzer = Arc::new(RwLock::new(DepthAnalyzer::new()));
        let sweeper_analyzer = analyzer.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(ANALYZER_SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                sweeper_analyzer.write().await.cleanup_expired();
            }
        });

        // Bus connection shared by consumer and publisher
        let consumer = Consumer::new(config.bus.clone());
        let client = consumer.connect().await?;

        let (sink, publisher) = Publisher::new(
            client.clone(),
            config.bus.publisher_topic.clone(),
            config.publisher.clone(),
            &config.breaker,
            metrics.clone(),
        );
        tokio::spawn(publisher.run());

        let engine = Engine::new(
            &config,
            analyzer.clone(),
            config_manager.clone(),
            Arc::new(sink),
            metrics.clone(),
        );

        // Configuration and metrics REST surface
        api::serve(
            config.api.port,
            AppState {
                config_manager: config_manager.clone(),
                analyzer: analyzer.clone(),
                metrics: metrics.clone(),
            },
        );

        // Periodic aggregated statistics
        Heartbeat::new(
            metrics.clone(),
            Duration::from_secs(config.telemetry.heartbeat_interval_secs),
        )
        .spawn();

        tracing::info!("All services started");

        tokio::select! {
            result = consumer.run_forever(client, engine) => {
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Consumer terminated");
                }
                result
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received, stopping");
                Ok(())
            }
        }
    }
}
