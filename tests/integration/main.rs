//! End-to-end integration tests

mod config_resolution;
mod engine_scenarios;

/// Serializes tests that touch process environment variables
pub static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
