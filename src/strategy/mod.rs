//! Quantitative strategies
//!
//! Each strategy consumes one stream kind and emits at most one signal
//! per event. Strategies are independent: none shares state with
//! another, and all state is process-local and bounded.

mod iceberg_detector;
mod orderbook_skew;
mod spread_liquidity;
mod ticker_velocity;
mod trade_momentum;

pub use iceberg_detector::IcebergDetector;
pub use orderbook_skew::OrderBookSkew;
pub use spread_liquidity::SpreadLiquidity;
pub use ticker_velocity::TickerVelocity;
pub use trade_momentum::TradeMomentum;

use crate::events::{MarketEvent, StreamKind};
use crate::params::ResolvedConfig;
use crate::signal::Signal;
use chrono::{DateTime, Utc};

/// Strategy execution failure, isolated by the dispatcher's breaker
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct StrategyError(pub String);

/// A per-event signal generator
pub trait Strategy: Send {
    /// Stable identifier, also the configuration key
    fn id(&self) -> &'static str;

    /// The stream kind this strategy consumes
    fn stream_kind(&self) -> StreamKind;

    /// Swap in freshly resolved parameters.
    ///
    /// Called by the dispatcher between events, never mid-dispatch.
    fn apply_params(&mut self, config: &ResolvedConfig);

    /// Process one event. `now` is the dispatch timestamp; passing it
    /// in keeps window arithmetic deterministic under test.
    fn on_event(
        &mut self,
        event: &MarketEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<Signal>, StrategyError>;
}

/// Shared clamp for confidence scores
pub(crate) fn clamp_confidence(score: f64) -> f64 {
    score.min(0.95)
}
