//! realtime-strategies: real-time market-microstructure signal engine
//!
//! This library provides the core components for:
//! - Bus intake of normalized exchange events (depth, trade, ticker)
//! - Five quantitative strategies with bounded in-memory state
//! - Per-symbol depth metrics with rolling pressure history
//! - Runtime per-strategy/per-symbol configuration with audit trail
//! - Signal adaptation to the execution-engine contract
//! - Outbound publishing with retry and circuit breaking
//! - REST surface for configuration and depth metrics
//! - Full observability stack

pub mod api;
pub mod breaker;
pub mod bus;
pub mod cli;
pub mod config;
pub mod depth;
pub mod engine;
pub mod events;
pub mod orderbook;
pub mod params;
pub mod signal;
pub mod strategy;
pub mod telemetry;
