//! Depth metrics sidecar
//!
//! Computes per-symbol microstructure metrics on every depth event and
//! maintains a rolling pressure history for trend queries.

mod analyzer;

pub use analyzer::{
    DepthAnalyzer, DepthMetrics, MarketSummary, PressureHistory, Timeframe, Trend,
};
