//! Ticker velocity strategy
//!
//! Tracks (timestamp, price) per symbol over a sliding window and
//! signals when the price velocity in percent per minute crosses a
//! threshold.

use super::{clamp_confidence, Strategy, StrategyError};
use crate::events::{MarketEvent, StreamKind, TickerUpdate};
use crate::params::ResolvedConfig;
use crate::signal::{Signal, SignalAction, SignalType};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone)]
struct VelocityParams {
    time_window_secs: i64,
    buy_threshold: f64,
    sell_threshold: f64,
    min_price_change: f64,
}

impl Default for VelocityParams {
    fn default() -> Self {
        Self {
            time_window_secs: 60,
            buy_threshold: 0.5,
            sell_threshold: -0.5,
            min_price_change: 0.1,
        }
    }
}

impl VelocityParams {
    fn from_config(config: &ResolvedConfig) -> Self {
        let defaults = Self::default();
        Self {
            time_window_secs: config
                .i64("time_window")
                .unwrap_or(defaults.time_window_secs),
            buy_threshold: config.f64("buy_threshold").unwrap_or(defaults.buy_threshold),
            sell_threshold: config
                .f64("sell_threshold")
                .unwrap_or(defaults.sell_threshold),
            min_price_change: config
                .f64("min_price_change")
                .unwrap_or(defaults.min_price_change),
        }
    }
}

/// Per-symbol price velocity over a sliding ticker window
pub struct TickerVelocity {
    params: VelocityParams,
    prices: HashMap<String, VecDeque<(DateTime<Utc>, Decimal)>>,
}

impl Default for TickerVelocity {
    fn default() -> Self {
        Self::new()
    }
}

impl TickerVelocity {
    pub fn new() -> Self {
        Self {
            params: VelocityParams::default(),
            prices: HashMap::new(),
        }
    }

    pub fn window_len(&self, symbol: &str) -> usize {
        self.prices.get(symbol).map(VecDeque::len).unwrap_or(0)
    }

    fn analyze(&mut self, ticker: &TickerUpdate, now: DateTime<Utc>) -> Option<Signal> {
        let window = self.prices.entry(ticker.symbol.clone()).or_default();
        window.push_back((now, ticker.last_price));

        // The window is bounded by age, not count
        let cutoff = now - Duration::seconds(self.params.time_window_secs);
        while let Some((ts, _)) = window.front() {
            if *ts < cutoff {
                window.pop_front();
            } else {
                break;
            }
        }

        if window.len() < 2 {
            return None;
        }

        let (oldest_ts, oldest_price) = *window.front()?;
        let elapsed_minutes = (now - oldest_ts).num_milliseconds() as f64 / 60_000.0;
        if elapsed_minutes <= 0.0 || oldest_price.is_zero() {
            return None;
        }

        let change_percent = ((ticker.last_price - oldest_price) / oldest_price)
            .to_f64()?
            * 100.0;
        if change_percent.abs() < self.params.min_price_change {
            return None;
        }
        let velocity = change_percent / elapsed_minutes;

        let (signal_type, action) = if velocity > self.params.buy_threshold {
            (SignalType::Buy, SignalAction::OpenLong)
        } else if velocity < self.params.sell_threshold {
            (SignalType::Sell, SignalAction::OpenShort)
        } else {
            return None;
        };

        let confidence = clamp_confidence(0.6 + velocity.abs() / 10.0);

        Some(
            Signal::new(
                ticker.symbol.clone(),
                signal_type,
                action,
                confidence,
                ticker.last_price,
                "ticker_velocity",
            )
            .with_indicator("velocity", velocity)
            .with_indicator("change_percent", change_percent)
            .with_indicator("elapsed_minutes", elapsed_minutes)
            .with_indicator("window_samples", window.len() as f64),
        )
    }
}

impl Strategy for TickerVelocity {
    fn id(&self) -> &'static str {
        "ticker_velocity"
    }

    fn stream_kind(&self) -> StreamKind {
        StreamKind::Ticker
    }

    fn apply_params(&mut self, config: &ResolvedConfig) {
        self.params = VelocityParams::from_config(config);
    }

    fn on_event(
        &mut self,
        event: &MarketEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<Signal>, StrategyError> {
        match event {
            MarketEvent::Ticker(ticker) => Ok(self.analyze(ticker, now)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ticker(price: Decimal) -> MarketEvent {
        MarketEvent::Ticker(TickerUpdate {
            symbol: "ETHUSDT".to_string(),
            last_price: price,
            volume: None,
            price_change_percent: None,
            event_time: Utc::now(),
        })
    }

    /// 0.2% over one minute stays below the threshold,
    /// 0.667% crosses it
    #[test]
    fn test_velocity_threshold() {
        let mut strategy = TickerVelocity::new();
        let t0 = Utc::now();

        assert!(strategy.on_event(&ticker(dec!(3000)), t0).unwrap().is_none());
        assert!(strategy
            .on_event(&ticker(dec!(3003)), t0 + Duration::seconds(30))
            .unwrap()
            .is_none());

        // velocity = 0.2 %/min, below 0.5
        let signal = strategy
            .on_event(&ticker(dec!(3006)), t0 + Duration::seconds(60))
            .unwrap();
        assert!(signal.is_none());

        // Fresh run with a stronger move
        let mut strategy = TickerVelocity::new();
        let t0 = Utc::now();
        strategy.on_event(&ticker(dec!(3000)), t0).unwrap();
        strategy
            .on_event(&ticker(dec!(3003)), t0 + Duration::seconds(30))
            .unwrap();
        let signal = strategy
            .on_event(&ticker(dec!(3020)), t0 + Duration::seconds(60))
            .unwrap()
            .expect("buy signal");

        assert_eq!(signal.signal_type, SignalType::Buy);
        let velocity = signal.indicators["velocity"];
        assert!((velocity - 2.0 / 3.0).abs() < 1e-9);
        assert!((signal.confidence_score - (0.6 + velocity / 10.0)).abs() < 1e-9);
    }

    #[test]
    fn test_single_entry_no_signal() {
        let mut strategy = TickerVelocity::new();
        assert!(strategy
            .on_event(&ticker(dec!(3000)), Utc::now())
            .unwrap()
            .is_none());
        assert_eq!(strategy.window_len("ETHUSDT"), 1);
    }

    #[test]
    fn test_window_eviction_by_age() {
        let mut strategy = TickerVelocity::new();
        let t0 = Utc::now();
        strategy.on_event(&ticker(dec!(3000)), t0).unwrap();
        strategy
            .on_event(&ticker(dec!(3010)), t0 + Duration::seconds(30))
            .unwrap();

        // 90 seconds later the two old entries fall out of the window
        strategy
            .on_event(&ticker(dec!(3020)), t0 + Duration::seconds(120))
            .unwrap();
        assert_eq!(strategy.window_len("ETHUSDT"), 1);
    }

    #[test]
    fn test_sell_on_fast_drop() {
        let mut strategy = TickerVelocity::new();
        let t0 = Utc::now();
        strategy.on_event(&ticker(dec!(3000)), t0).unwrap();
        let signal = strategy
            .on_event(&ticker(dec!(2950)), t0 + Duration::seconds(60))
            .unwrap()
            .expect("sell signal");

        assert_eq!(signal.signal_type, SignalType::Sell);
        assert_eq!(signal.signal_action, SignalAction::OpenShort);
        assert!(signal.indicators["velocity"] < -0.5);
    }

    #[test]
    fn test_min_price_change_guard() {
        let mut strategy = TickerVelocity::new();
        let t0 = Utc::now();
        strategy.on_event(&ticker(dec!(3000)), t0).unwrap();
        // 0.05% over a tenth of a minute is 0.5 %/min, but below the
        // 0.1% minimum absolute change
        let signal = strategy
            .on_event(&ticker(dec!(3001.5)), t0 + Duration::seconds(6))
            .unwrap();
        assert!(signal.is_none());
    }

    #[test]
    fn test_zero_elapsed_guard() {
        let mut strategy = TickerVelocity::new();
        let t0 = Utc::now();
        strategy.on_event(&ticker(dec!(3000)), t0).unwrap();
        assert!(strategy.on_event(&ticker(dec!(3100)), t0).unwrap().is_none());
    }
}
