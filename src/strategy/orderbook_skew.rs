//! Order book skew strategy (stateless)
//!
//! Compares summed bid and ask quantities over the top K levels. A
//! heavily bid-skewed book is bought, an ask-skewed book is sold. Books
//! with a wide spread are skipped: a wide spread makes the top-of-book
//! imbalance unreliable.

use super::{clamp_confidence, Strategy, StrategyError};
use crate::events::{DepthLevel, DepthSnapshot, MarketEvent, StreamKind};
use crate::params::ResolvedConfig;
use crate::signal::{Signal, SignalAction, SignalType};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;

#[derive(Debug, Clone)]
struct SkewParams {
    top_levels: usize,
    buy_threshold: f64,
    sell_threshold: f64,
    min_spread_percent: f64,
    base_confidence: f64,
}

impl Default for SkewParams {
    fn default() -> Self {
        Self {
            top_levels: 5,
            buy_threshold: 1.2,
            sell_threshold: 0.8,
            min_spread_percent: 0.1,
            base_confidence: 0.70,
        }
    }
}

impl SkewParams {
    fn from_config(config: &ResolvedConfig) -> Self {
        let defaults = Self::default();
        Self {
            top_levels: config.usize("top_levels").unwrap_or(defaults.top_levels),
            buy_threshold: config.f64("buy_threshold").unwrap_or(defaults.buy_threshold),
            sell_threshold: config
                .f64("sell_threshold")
                .unwrap_or(defaults.sell_threshold),
            min_spread_percent: config
                .f64("min_spread_percent")
                .unwrap_or(defaults.min_spread_percent),
            base_confidence: config
                .f64("base_confidence")
                .unwrap_or(defaults.base_confidence),
        }
    }
}

/// Stateless bid/ask volume ratio strategy
pub struct OrderBookSkew {
    params: SkewParams,
}

impl Default for OrderBookSkew {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBookSkew {
    pub fn new() -> Self {
        Self {
            params: SkewParams::default(),
        }
    }

    fn analyze(&self, depth: &DepthSnapshot) -> Option<Signal> {
        let top = self.params.top_levels;
        let bid_volume = top_volume(&depth.bids, top);
        let ask_volume = top_volume(&depth.asks, top);
        if ask_volume <= 0.0 {
            return None;
        }

        let best_bid = depth.best_bid()?;
        let best_ask = depth.best_ask()?;
        let best_bid_f = best_bid.price.to_f64()?;
        if best_bid_f <= 0.0 {
            return None;
        }

        let spread_percent =
            (best_ask.price - best_bid.price).to_f64()? / best_bid_f * 100.0;
        if spread_percent > self.params.min_spread_percent {
            return None;
        }

        let ratio = bid_volume / ask_volume;
        let (signal_type, action, price, threshold) = if ratio > self.params.buy_threshold
        {
            (
                SignalType::Buy,
                SignalAction::OpenLong,
                best_bid.price,
                self.params.buy_threshold,
            )
        } else if ratio < self.params.sell_threshold {
            (
                SignalType::Sell,
                SignalAction::OpenShort,
                best_ask.price,
                self.params.sell_threshold,
            )
        } else {
            return None;
        };

        let confidence = clamp_confidence(
            self.params.base_confidence + (ratio - threshold).abs() * 0.5,
        );

        Some(
            Signal::new(
                depth.symbol.clone(),
                signal_type,
                action,
                confidence,
                price,
                "orderbook_skew",
            )
            .with_indicator("bid_volume", bid_volume)
            .with_indicator("ask_volume", ask_volume)
            .with_indicator("ratio", ratio)
            .with_indicator("spread_percent", spread_percent),
        )
    }
}

fn top_volume(levels: &[DepthLevel], top: usize) -> f64 {
    levels
        .iter()
        .take(top)
        .map(|l| l.quantity.to_f64().unwrap_or(0.0))
        .sum()
}

impl Strategy for OrderBookSkew {
    fn id(&self) -> &'static str {
        "orderbook_skew"
    }

    fn stream_kind(&self) -> StreamKind {
        StreamKind::Depth
    }

    fn apply_params(&mut self, config: &ResolvedConfig) {
        self.params = SkewParams::from_config(config);
    }

    fn on_event(
        &mut self,
        event: &MarketEvent,
        _now: DateTime<Utc>,
    ) -> Result<Option<Signal>, StrategyError> {
        match event {
            MarketEvent::Depth(depth) => Ok(self.analyze(depth)),
            _ => Ok(None),
        }
    }
}
