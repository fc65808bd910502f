use clap::Parser;
use realtime_strategies::cli::{Cli, Commands};
use realtime_strategies::config::Config;
use realtime_strategies::telemetry::{self, Metrics};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration, falling back to the compiled defaults
    let config = Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: could not load config from {}: {}", cli.config, e);
        eprintln!("Using default configuration");
        Config::default_config()
    });

    match cli.command {
        Commands::Run(args) => {
            let metrics = Arc::new(Metrics::new());
            let _guard = telemetry::init_telemetry(&config.telemetry, metrics.clone())?;
            args.execute(config, metrics).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Bus: {}", config.bus.url);
            println!("  Consumer topic: {}", config.bus.consumer_topic);
            println!("  Publisher topic: {}", config.bus.publisher_topic);
            println!("  Queue group: {}", config.bus.queue_group);
            println!("  Store: {}", config.store.mongodb_uri);
            println!("  Cache TTL: {}s", config.store.cache_ttl_secs);
            println!("  Strategies: {}", config.enabled_strategies().join(", "));
            println!("  API port: {}", config.api.port);
            println!("  Metrics port: {}", config.telemetry.metrics_port);
        }
        Commands::Version => {
            println!(
                "realtime-strategies v{}",
                env!("CARGO_PKG_VERSION")
            );
        }
    }

    Ok(())
}
