//! CLI interface for realtime-strategies
//!
//! Provides subcommands for:
//! - `run`: consume market events and publish signals
//! - `config`: show the effective service configuration
//! - `version`: show version information

mod run;

pub use run::RunArgs;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "realtime-strategies")]
#[command(about = "Real-time market-microstructure signal engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consume market events and publish signals
    Run(RunArgs),
    /// Show the effective configuration
    Config,
    /// Show version information
    Version,
}
