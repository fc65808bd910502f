//! Bounded order-book history structures
//!
//! Supporting state for the two stateful depth strategies: per-level
//! quantity histories for iceberg detection and a rolling spread buffer
//! for liquidity-event detection.

mod spread;
mod tracker;

pub use spread::{SpreadHistory, SpreadTick};
pub use tracker::{BookSide, IcebergPattern, OrderBookTracker, PatternKind, TrackerConfig};
