//! Spread liquidity strategy
//!
//! Watches the bid-ask spread per symbol against its rolling average.
//! A tight spread widening rapidly while depth drains reads as
//! liquidity withdrawal (sell); a long-lived wide spread snapping back
//! reads as liquidity returning (buy).

use super::{Strategy, StrategyError};
use crate::events::{DepthLevel, DepthSnapshot, MarketEvent, StreamKind};
use crate::orderbook::{SpreadHistory, SpreadTick};
use crate::params::ResolvedConfig;
use crate::signal::{Signal, SignalAction, SignalType};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct SpreadParams {
    spread_threshold_bps: f64,
    spread_ratio_threshold: f64,
    velocity_threshold: f64,
    persistence_threshold_seconds: f64,
    min_depth_reduction_pct: f64,
    base_confidence: f64,
    lookback_ticks: usize,
    min_signal_interval_seconds: f64,
}

impl Default for SpreadParams {
    fn default() -> Self {
        Self {
            spread_threshold_bps: 10.0,
            spread_ratio_threshold: 2.5,
            velocity_threshold: 0.5,
            persistence_threshold_seconds: 30.0,
            min_depth_reduction_pct: 0.5,
            base_confidence: 0.70,
            lookback_ticks: 20,
            min_signal_interval_seconds: 60.0,
        }
    }
}

impl SpreadParams {
    fn from_config(config: &ResolvedConfig) -> Self {
        let defaults = Self::default();
        Self {
            spread_threshold_bps: config
                .f64("spread_threshold_bps")
                .unwrap_or(defaults.spread_threshold_bps),
            spread_ratio_threshold: config
                .f64("spread_ratio_threshold")
                .unwrap_or(defaults.spread_ratio_threshold),
            velocity_threshold: config
                .f64("velocity_threshold")
                .unwrap_or(defaults.velocity_threshold),
            persistence_threshold_seconds: config
                .f64("persistence_threshold_seconds")
                .unwrap_or(defaults.persistence_threshold_seconds),
            min_depth_reduction_pct: config
                .f64("min_depth_reduction_pct")
                .unwrap_or(defaults.min_depth_reduction_pct),
            base_confidence: config
                .f64("base_confidence")
                .unwrap_or(defaults.base_confidence),
            lookback_ticks: config
                .usize("lookback_ticks")
                .unwrap_or(defaults.lookback_ticks),
            min_signal_interval_seconds: config
                .f64("min_signal_interval_seconds")
                .unwrap_or(defaults.min_signal_interval_seconds),
        }
    }
}

/// Liquidity-event detector over rolling spread state
pub struct SpreadLiquidity {
    params: SpreadParams,
    history: HashMap<String, SpreadHistory>,
    /// When the current wide regime began, per symbol
    wide_since: HashMap<String, DateTime<Utc>>,
    last_signal: HashMap<String, DateTime<Utc>>,
}

impl Default for SpreadLiquidity {
    fn default() -> Self {
        Self::new()
    }
}

impl SpreadLiquidity {
    pub fn new() -> Self {
        Self {
            params: SpreadParams::default(),
            history: HashMap::new(),
            wide_since: HashMap::new(),
            last_signal: HashMap::new(),
        }
    }

    fn analyze(&mut self, depth: &DepthSnapshot, now: DateTime<Utc>) -> Option<Signal> {
        let tick = spread_tick(depth, now)?;
        let lookback = self.params.lookback_ticks;
        let history = self
            .history
            .entry(depth.symbol.clone())
            .or_insert_with(|| SpreadHistory::new(lookback));

        // Velocity relative to the previous snapshot and averages over
        // the buffer before this tick
        let prev = history.latest().copied();
        let avg_spread = history.avg_spread_bps();
        let avg_depth = history.avg_total_depth();
        history.push(tick);

        if history.len() < 3 {
            return None;
        }
        let (prev, avg_spread, avg_depth) = (prev?, avg_spread?, avg_depth?);

        let spread_ratio = if avg_spread > 0.0 {
            tick.spread_bps / avg_spread
        } else {
            1.0
        };
        let spread_velocity = if prev.spread_bps > 0.0 {
            (tick.spread_bps - prev.spread_bps) / prev.spread_bps
        } else {
            0.0
        };
        let depth_reduction = if avg_depth > 0.0 {
            (1.0 - tick.total_depth() / avg_depth).max(0.0)
        } else {
            0.0
        };

        // Narrowing out of a persistent wide regime is bullish
        if let Some(&since) = self.wide_since.get(&depth.symbol) {
            let persistence = (now - since).num_milliseconds() as f64 / 1000.0;
            if spread_ratio > self.params.spread_ratio_threshold
                && spread_velocity < -self.params.velocity_threshold
                && persistence >= self.params.persistence_threshold_seconds
            {
                self.wide_since.remove(&depth.symbol);
                return self.emit(
                    depth,
                    &tick,
                    SignalType::Buy,
                    narrowing_confidence(
                        self.params.base_confidence,
                        spread_ratio,
                        self.params.spread_ratio_threshold,
                        persistence,
                    ),
                    "narrowing",
                    spread_ratio,
                    spread_velocity,
                    depth_reduction,
                    persistence,
                    now,
                );
            }
        }

        // Track wide regimes; a regime ends quietly when the spread
        // returns under the bps threshold without a narrowing event
        if spread_ratio > self.params.spread_ratio_threshold
            && tick.spread_bps > self.params.spread_threshold_bps
        {
            self.wide_since.entry(depth.symbol.clone()).or_insert(now);
        } else if tick.spread_bps < self.params.spread_threshold_bps {
            self.wide_since.remove(&depth.symbol);
        }

        // Rapid widening from a tight book with depth draining is bearish
        let was_tight = prev.spread_bps < self.params.spread_threshold_bps;
        if was_tight
            && spread_ratio > self.params.spread_ratio_threshold
            && spread_velocity > self.params.velocity_threshold
            && depth_reduction > self.params.min_depth_reduction_pct
        {
            return self.emit(
                depth,
                &tick,
                SignalType::Sell,
                widening_confidence(
                    self.params.base_confidence,
                    spread_velocity,
                    depth_reduction,
                ),
                "widening",
                spread_ratio,
                spread_velocity,
                depth_reduction,
                0.0,
                now,
            );
        }

        None
    }

    #[allow(clippy::too_many_arguments)]
    fn emit(
        &mut self,
        depth: &DepthSnapshot,
        tick: &SpreadTick,
        signal_type: SignalType,
        confidence: f64,
        event_kind: &str,
        spread_ratio: f64,
        spread_velocity: f64,
        depth_reduction: f64,
        persistence: f64,
        now: DateTime<Utc>,
    ) -> Option<Signal> {
        // Per-symbol rate limit
        if let Some(&last) = self.last_signal.get(&depth.symbol) {
            let since = (now - last).num_milliseconds() as f64 / 1000.0;
            if since < self.params.min_signal_interval_seconds {
                tracing::debug!(symbol = %depth.symbol, since, "Spread signal rate limited");
                return None;
            }
        }
        self.last_signal.insert(depth.symbol.clone(), now);

        let action = match signal_type {
            SignalType::Buy => SignalAction::OpenLong,
            SignalType::Sell => SignalAction::OpenShort,
            SignalType::Hold => SignalAction::Hold,
        };

        let mid = tick.mid_price;
        let (stop_loss, take_profit) = match signal_type {
            // Strategy defaults: 0.5% stop, 1.0% target, symmetric
            SignalType::Buy => (mid * dec!(0.995), mid * dec!(1.01)),
            _ => (mid * dec!(1.005), mid * dec!(0.99)),
        };

        tracing::info!(
            symbol = %depth.symbol,
            event = event_kind,
            spread_bps = tick.spread_bps,
            spread_ratio,
            confidence,
            "Spread liquidity signal"
        );

        Some(
            Signal::new(
                depth.symbol.clone(),
                signal_type,
                action,
                confidence,
                mid,
                "spread_liquidity",
            )
            .with_risk_levels(stop_loss, take_profit)
            .with_indicator("spread_bps", tick.spread_bps)
            .with_indicator("spread_ratio", spread_ratio)
            .with_indicator("spread_velocity", spread_velocity)
            .with_indicator("depth_reduction_pct", depth_reduction)
            .with_indicator("total_depth", tick.total_depth())
            .with_metadata("event_type", serde_json::Value::from(event_kind))
            .with_metadata(
                "persistence_seconds",
                serde_json::Value::from(persistence),
            ),
        )
    }
}

/// Spread observation from one snapshot; None when the book is crossed
/// or degenerate
fn spread_tick(depth: &DepthSnapshot, now: DateTime<Utc>) -> Option<SpreadTick> {
    let best_bid = depth.best_bid()?.price;
    let best_ask = depth.best_ask()?.price;
    if best_bid <= Decimal::ZERO || best_ask <= best_bid {
        return None;
    }
    let mid = (best_bid + best_ask) / Decimal::TWO;
    let spread_bps = ((best_ask - best_bid) / mid).to_f64()? * 10_000.0;

    let top5 = |levels: &[DepthLevel]| -> f64 {
        levels
            .iter()
            .take(5)
            .map(|l| l.quantity.to_f64().unwrap_or(0.0))
            .sum()
    };

    Some(SpreadTick {
        timestamp: now,
        spread_bps,
        mid_price: mid,
        depth_bid_top5: top5(&depth.bids),
        depth_ask_top5: top5(&depth.asks),
    })
}

/// Confidence for a narrowing (bullish) event: grows with how abnormal
/// the spread still is and how long the regime persisted
fn narrowing_confidence(
    base: f64,
    spread_ratio: f64,
    ratio_threshold: f64,
    persistence: f64,
) -> f64 {
    (base + (spread_ratio - ratio_threshold) * 0.05 + (persistence / 300.0 * 0.10).min(0.10))
        .min(0.95)
}

/// Confidence for a widening (bearish) event: grows with the widening
/// speed and the share of depth that vanished
fn widening_confidence(base: f64, spread_velocity: f64, depth_reduction: f64) -> f64 {
    (base + spread_velocity.abs() * 0.10 + depth_reduction * 0.15).min(0.95)
}

impl Strategy for SpreadLiquidity {
    fn id(&self) -> &'static str {
        "spread_liquidity"
    }

    fn stream_kind(&self) -> StreamKind {
        StreamKind::Depth
    }

    fn apply_params(&mut self, config: &ResolvedConfig) {
        self.params = SpreadParams::from_config(config);
    }

    fn on_event(
        &mut self,
        event: &MarketEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<Signal>, StrategyError> {
        match event {
            MarketEvent::Depth(depth) => Ok(self.analyze(depth, now)),
            _ => Ok(None),
        }
    }
}
