//! Iceberg detector strategy
//!
//! Feeds depth snapshots into the per-level tracker and turns detected
//! hidden-size patterns into directional signals: a hidden bid near the
//! mid is support (buy), a hidden ask is resistance (sell).

use super::{Strategy, StrategyError};
use crate::events::{DepthSnapshot, MarketEvent, StreamKind};
use crate::orderbook::{BookSide, IcebergPattern, OrderBookTracker, TrackerConfig};
use crate::params::ResolvedConfig;
use crate::signal::{Signal, SignalAction, SignalType};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct IcebergParams {
    level_proximity_pct: f64,
    min_signal_interval_seconds: f64,
    max_symbols: usize,
}

impl Default for IcebergParams {
    fn default() -> Self {
        Self {
            level_proximity_pct: 1.0,
            min_signal_interval_seconds: 120.0,
            max_symbols: 100,
        }
    }
}

/// Hidden-order detector over tracked book levels
pub struct IcebergDetector {
    params: IcebergParams,
    tracker: OrderBookTracker,
    last_signal: HashMap<String, DateTime<Utc>>,
}

impl Default for IcebergDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl IcebergDetector {
    pub fn new() -> Self {
        let params = IcebergParams::default();
        Self {
            tracker: OrderBookTracker::new(TrackerConfig::default(), params.max_symbols),
            params,
            last_signal: HashMap::new(),
        }
    }

    fn analyze(&mut self, depth: &DepthSnapshot, now: DateTime<Utc>) -> Option<Signal> {
        self.tracker.update(&depth.symbol, &depth.bids, &depth.asks, now);

        let mid = depth.mid_price()?;
        if mid <= Decimal::ZERO {
            return None;
        }

        let patterns = self.tracker.detect(
            &depth.symbol,
            mid,
            self.params.level_proximity_pct,
            now,
        );
        let strongest = patterns
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))?;

        // Per-symbol rate limit
        if let Some(&last) = self.last_signal.get(&depth.symbol) {
            let since = (now - last).num_milliseconds() as f64 / 1000.0;
            if since < self.params.min_signal_interval_seconds {
                tracing::debug!(
                    symbol = %depth.symbol,
                    since,
                    "Iceberg signal rate limited"
                );
                return None;
            }
        }

        let signal = self.build_signal(&depth.symbol, &strongest, mid);
        if signal.is_some() {
            self.last_signal.insert(depth.symbol.clone(), now);
        }
        signal
    }

    fn build_signal(
        &self,
        symbol: &str,
        pattern: &IcebergPattern,
        mid: Decimal,
    ) -> Option<Signal> {
        let (signal_type, action) = match pattern.side {
            // Hidden buyer under the price is support
            BookSide::Bid => (SignalType::Buy, SignalAction::OpenLong),
            // Hidden seller above the price is resistance
            BookSide::Ask => (SignalType::Sell, SignalAction::OpenShort),
        };

        // Distance to the level as an ATR proxy, floored at 0.5% of mid
        let atr_proxy = (mid - pattern.price).abs().max(mid * dec!(0.005));
        let (stop_loss, take_profit) = match signal_type {
            SignalType::Buy => (
                pattern.price - atr_proxy,
                mid + atr_proxy * dec!(2.5),
            ),
            _ => (
                pattern.price + atr_proxy,
                mid - atr_proxy * dec!(2.5),
            ),
        };

        let distance_pct = ((mid - pattern.price).abs() / mid)
            .to_f64()
            .unwrap_or(0.0)
            * 100.0;

        tracing::info!(
            symbol = %symbol,
            level = %pattern.price,
            side = pattern.side.as_str(),
            pattern = pattern.kind.as_str(),
            confidence = pattern.confidence,
            refills = pattern.refill_count,
            "Iceberg signal"
        );

        Some(
            Signal::new(
                symbol.to_string(),
                signal_type,
                action,
                pattern.confidence,
                mid,
                "iceberg_detector",
            )
            .with_risk_levels(stop_loss, take_profit)
            .with_indicator("refill_count", pattern.refill_count as f64)
            .with_indicator("consistency_score", pattern.consistency_score)
            .with_indicator("persistence_seconds", pattern.persistence_seconds)
            .with_indicator("distance_to_level_pct", distance_pct)
            .with_metadata(
                "pattern_type",
                serde_json::Value::from(pattern.kind.as_str()),
            )
            .with_metadata(
                "iceberg_side",
                serde_json::Value::from(pattern.side.as_str()),
            )
            .with_metadata(
                "iceberg_level",
                serde_json::Value::from(pattern.price.to_string()),
            ),
        )
    }
}

impl Strategy for IcebergDetector {
    fn id(&self) -> &'static str {
        "iceberg_detector"
    }

    fn stream_kind(&self) -> StreamKind {
        StreamKind::Depth
    }

    fn apply_params(&mut self, config: &ResolvedConfig) {
        let defaults = TrackerConfig::default();
        self.tracker.set_config(TrackerConfig {
            history_window_seconds: config
                .i64("history_window_seconds")
                .unwrap_or(defaults.history_window_seconds),
            refill_speed_threshold_seconds: config
                .f64("refill_speed_threshold_seconds")
                .unwrap_or(defaults.refill_speed_threshold_seconds),
            consistency_threshold: config
                .f64("consistency_threshold")
                .unwrap_or(defaults.consistency_threshold),
            persistence_threshold_seconds: config
                .f64("persistence_threshold_seconds")
                .unwrap_or(defaults.persistence_threshold_seconds),
            min_refill_count: config
                .i64("min_refill_count")
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(defaults.min_refill_count),
            base_confidence: config
                .f64("base_confidence")
                .unwrap_or(defaults.base_confidence),
        });

        let param_defaults = IcebergParams::default();
        self.params = IcebergParams {
            level_proximity_pct: config
                .f64("level_proximity_pct")
                .unwrap_or(param_defaults.level_proximity_pct),
            min_signal_interval_seconds: config
                .f64("min_signal_interval_seconds")
                .unwrap_or(param_defaults.min_signal_interval_seconds),
            max_symbols: config
                .usize("max_symbols")
                .unwrap_or(param_defaults.max_symbols),
        };
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
