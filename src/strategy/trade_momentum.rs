//! Trade momentum strategy
//!
//! Scores each trade by three components: price move against the
//! previous trade, size against the trailing average, and aggressor
//! side. The previous price and average quantity come from a small
//! per-symbol trailing cache.

use super::{clamp_confidence, Strategy, StrategyError};
use crate::events::{MarketEvent, StreamKind, Trade};
use crate::params::ResolvedConfig;
use crate::signal::{Signal, SignalAction, SignalType};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

/// Quantities kept per symbol for the trailing average
const QUANTITY_WINDOW: usize = 20;

#[derive(Debug, Clone)]
struct MomentumParams {
    price_weight: f64,
    quantity_weight: f64,
    maker_weight: f64,
    buy_threshold: f64,
    sell_threshold: f64,
    min_quantity: f64,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            price_weight: 0.4,
            quantity_weight: 0.3,
            maker_weight: 0.3,
            buy_threshold: 0.7,
            sell_threshold: -0.7,
            min_quantity: 0.001,
        }
    }
}

impl MomentumParams {
    fn from_config(config: &ResolvedConfig) -> Self {
        let defaults = Self::default();
        Self {
            price_weight: config.f64("price_weight").unwrap_or(defaults.price_weight),
            quantity_weight: config
                .f64("quantity_weight")
                .unwrap_or(defaults.quantity_weight),
            maker_weight: config.f64("maker_weight").unwrap_or(defaults.maker_weight),
            buy_threshold: config.f64("buy_threshold").unwrap_or(defaults.buy_threshold),
            sell_threshold: config
                .f64("sell_threshold")
                .unwrap_or(defaults.sell_threshold),
            min_quantity: config.f64("min_quantity").unwrap_or(defaults.min_quantity),
        }
    }
}

#[derive(Debug, Default)]
struct SymbolState {
    prev_price: Option<Decimal>,
    quantities: VecDeque<Decimal>,
}

impl SymbolState {
    fn avg_quantity(&self) -> Option<f64> {
        if self.quantities.is_empty() {
            return None;
        }
        let sum: f64 = self
            .quantities
            .iter()
            .filter_map(|q| q.to_f64())
            .sum();
        Some(sum / self.quantities.len() as f64)
    }

    fn record(&mut self, price: Decimal, quantity: Decimal) {
        self.prev_price = Some(price);
        if self.quantities.len() == QUANTITY_WINDOW {
            self.quantities.pop_front();
        }
        self.quantities.push_back(quantity);
    }
}

/// Weighted per-trade momentum score
pub struct TradeMomentum {
    params: MomentumParams,
    state: HashMap<String, SymbolState>,
}

impl Default for TradeMomentum {
    fn default() -> Self {
        Self::new()
    }
}

impl TradeMomentum {
    pub fn new() -> Self {
        Self {
            params: MomentumParams::default(),
            state: HashMap::new(),
        }
    }

    fn analyze(&mut self, trade: &Trade) -> Option<Signal> {
        let quantity = trade.quantity.to_f64()?;
        if quantity < self.params.min_quantity {
            return None;
        }

        let state = self.state.entry(trade.symbol.clone()).or_default();

        let price_momentum = match state.prev_price {
            Some(prev) if !prev.is_zero() => {
                ((trade.price - prev) / prev).to_f64().unwrap_or(0.0)
            }
            _ => 0.0,
        };
        let quantity_score = match state.avg_quantity() {
            Some(avg) if avg > 0.0 => (quantity / avg).min(1.0),
            _ => 1.0,
        };
        let maker_score = if trade.is_buyer_maker { -1.0 } else { 1.0 };

        let momentum = self.params.price_weight * price_momentum
            + self.params.quantity_weight * quantity_score
            + self.params.maker_weight * maker_score;

        state.record(trade.price, trade.quantity);

        let (signal_type, action) = if momentum > self.params.buy_threshold {
            (SignalType::Buy, SignalAction::OpenLong)
        } else if momentum < self.params.sell_threshold {
            (SignalType::Sell, SignalAction::OpenShort)
        } else {
            return None;
        };

        let confidence = clamp_confidence(0.65 + momentum.abs() * 0.2);

        Some(
            Signal::new(
                trade.symbol.clone(),
                signal_type,
                action,
                confidence,
                trade.price,
                "trade_momentum",
            )
            .with_indicator("momentum", momentum)
            .with_indicator("price_momentum", price_momentum)
            .with_indicator("quantity_score", quantity_score)
            .with_indicator("maker_score", maker_score),
        )
    }
}

impl Strategy for TradeMomentum {
    fn id(&self) -> &'static str {
        "trade_momentum"
    }

    fn stream_kind(&self) -> StreamKind {
        StreamKind::Trade
    }

    fn apply_params(&mut self, config: &ResolvedConfig) {
        self.params = MomentumParams::from_config(config);
    }

    fn on_event(
        &mut self,
        event: &MarketEvent,
        _now: DateTime<Utc>,
    ) -> Result<Option<Signal>, StrategyError> {
        match event {
            MarketEvent::Trade(trade) => Ok(self.analyze(trade)),
            _ => Ok(None),
        }
    }
}
