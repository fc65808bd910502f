//! Real-time order book depth analysis

use crate::events::{DepthLevel, DepthSnapshot};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Pressure samples kept per symbol (15 minutes at one update/second)
const MAX_PRESSURE_SAMPLES: usize = 900;

/// Symbols idle longer than this are evicted
const METRICS_TTL: Duration = Duration::from_secs(300);

/// Metrics calculated from one order book snapshot
#[derive(Debug, Clone, Serialize)]
pub struct DepthMetrics {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,

    pub bid_volume: f64,
    pub ask_volume: f64,
    /// (bid - ask) / total, range [-1, 1]
    pub imbalance_ratio: f64,
    pub imbalance_percent: f64,

    /// 0-100 scale
    pub buy_pressure: f64,
    pub sell_pressure: f64,
    /// buy_pressure - sell_pressure, range [-100, 100]
    pub net_pressure: f64,

    pub total_liquidity: f64,
    pub bid_depth_5: f64,
    pub ask_depth_5: f64,
    pub bid_depth_10: f64,
    pub ask_depth_10: f64,

    pub best_bid: f64,
    pub best_ask: f64,
    pub spread_abs: f64,
    pub spread_bps: f64,
    pub mid_price: f64,

    pub vwap_bid: f64,
    pub vwap_ask: f64,

    pub bid_levels: usize,
    pub ask_levels: usize,
    pub total_levels: usize,

    /// Largest level by quantity: (price, quantity)
    pub strongest_bid_level: Option<(f64, f64)>,
    pub strongest_ask_level: Option<(f64, f64)>,
}

/// Pressure trend classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

/// Query window over the pressure ring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    OneMinute,
    FiveMinutes,
    FifteenMinutes,
}

impl Timeframe {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Timeframe::OneMinute),
            "5m" => Some(Timeframe::FiveMinutes),
            "15m" => Some(Timeframe::FifteenMinutes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1m",
            Timeframe::FiveMinutes => "5m",
            Timeframe::FifteenMinutes => "15m",
        }
    }

    /// Samples covered at one update per second
    fn sample_count(&self) -> usize {
        match self {
            Timeframe::OneMinute => 60,
            Timeframe::FiveMinutes => 300,
            Timeframe::FifteenMinutes => 900,
        }
    }
}

/// Historical market pressure for one symbol and window
#[derive(Debug, Clone, Serialize)]
pub struct PressureHistory {
    pub symbol: String,
    pub timeframe: &'static str,
    pub pressure_history: Vec<(DateTime<Utc>, f64)>,
    pub imbalance_history: Vec<(DateTime<Utc>, f64)>,
    pub avg_pressure: f64,
    pub max_pressure: f64,
    pub min_pressure: f64,
    pub trend: Trend,
    pub trend_strength: f64,
}

/// Aggregated view across every tracked symbol
#[derive(Debug, Clone, Serialize)]
pub struct MarketSummary {
    pub timestamp: DateTime<Utc>,
    pub symbols_tracked: usize,
    pub bullish_symbols: usize,
    pub bearish_symbols: usize,
    pub neutral_symbols: usize,
    pub avg_net_pressure: f64,
    pub avg_imbalance_ratio: f64,
    pub avg_spread_bps: f64,
    pub total_liquidity: f64,
    pub highest_buy_pressure: Vec<String>,
    pub highest_sell_pressure: Vec<String>,
}

/// Per-symbol depth metrics engine with a bounded pressure history
pub struct DepthAnalyzer {
    current: HashMap<String, DepthMetrics>,
    pressure: HashMap<String, VecDeque<(DateTime<Utc>, f64)>>,
    imbalance: HashMap<String, VecDeque<(DateTime<Utc>, f64)>>,
    last_update: HashMap<String, Instant>,
    metrics_ttl: Duration,
}

impl Default for DepthAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthAnalyzer {
    pub fn new() -> Self {
        Self::with_ttl(METRICS_TTL)
    }

    pub fn with_ttl(metrics_ttl: Duration) -> Self {
        Self {
            current: HashMap::new(),
            pressure: HashMap::new(),
            imbalance: HashMap::new(),
            last_update: HashMap::new(),
            metrics_ttl,
        }
    }

    /// Analyze a depth snapshot, store the metrics, and extend the
    /// pressure history
    pub fn analyze(&mut self, snapshot: &DepthSnapshot) -> DepthMetrics {
        let metrics = compute_metrics(snapshot);

        let pressure = self.pressure.entry(metrics.symbol.clone()).or_default();
        if pressure.len() == MAX_PRESSURE_SAMPLES {
            pressure.pop_front();
        }
        pressure.push_back((metrics.timestamp, metrics.net_pressure));

        let imbalance = self.imbalance.entry(metrics.symbol.clone()).or_default();
        if imbalance.len() == MAX_PRESSURE_SAMPLES {
            imbalance.pop_front();
        }
        imbalance.push_back((metrics.timestamp, metrics.imbalance_ratio));

        self.last_update.insert(metrics.symbol.clone(), Instant::now());
        self.current.insert(metrics.symbol.clone(), metrics.clone());
        metrics
    }

    /// Current metrics for one symbol
    pub fn current(&self, symbol: &str) -> Option<&DepthMetrics> {
        self.current.get(symbol)
    }

    /// Current metrics for every tracked symbol
    pub fn all(&self) -> &HashMap<String, DepthMetrics> {
        &self.current
    }

    pub fn pressure_samples(&self, symbol: &str) -> usize {
        self.pressure.get(symbol).map(VecDeque::len).unwrap_or(0)
    }

    /// Pressure history over the requested window with trend
    /// classification over the last ten samples
    pub fn pressure_history(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Option<PressureHistory> {
        let pressure = self.pressure.get(symbol)?;
        if pressure.is_empty() {
            return None;
        }
        let n = timeframe.sample_count();

        let window =
            |ring: &VecDeque<(DateTime<Utc>, f64)>| -> Vec<(DateTime<Utc>, f64)> {
                let skip = ring.len().saturating_sub(n);
                ring.iter().skip(skip).copied().collect()
            };

        let pressure_window = window(pressure);
        let imbalance_window = self
            .imbalance
            .get(symbol)
            .map(window)
            .unwrap_or_default();

        let values: Vec<f64> = pressure_window.iter().map(|(_, p)| *p).collect();
        let avg = values.iter().sum::<f64>() / values.len() as f64;
        let max = values.iter().copied().fold(f64::MIN, f64::max);
        let min = values.iter().copied().fold(f64::MAX, f64::min);

        let (trend, trend_strength) = classify_trend(&values);

        Some(PressureHistory {
            symbol: symbol.to_string(),
            timeframe: timeframe.as_str(),
            pressure_history: pressure_window,
            imbalance_history: imbalance_window,
            avg_pressure: avg,
            max_pressure: max,
            min_pressure: min,
            trend,
            trend_strength,
        })
    }

    /// Aggregate sentiment across all tracked symbols
    pub fn summary(&self) -> MarketSummary {
        let count = self.current.len();
        if count == 0 {
            return MarketSummary {
                timestamp: Utc::now(),
                symbols_tracked: 0,
                bullish_symbols: 0,
                bearish_symbols: 0,
                neutral_symbols: 0,
                avg_net_pressure: 0.0,
                avg_imbalance_ratio: 0.0,
                avg_spread_bps: 0.0,
                total_liquidity: 0.0,
                highest_buy_pressure: Vec::new(),
                highest_sell_pressure: Vec::new(),
            };
        }

        let bullish = self
            .current
            .values()
            .filter(|m| m.net_pressure > 20.0)
            .count();
        let bearish = self
            .current
            .values()
            .filter(|m| m.net_pressure < -20.0)
            .count();

        let avg_pressure =
            self.current.values().map(|m| m.net_pressure).sum::<f64>() / count as f64;
        let avg_imbalance =
            self.current.values().map(|m| m.imbalance_ratio).sum::<f64>() / count as f64;
        let avg_spread_bps =
            self.current.values().map(|m| m.spread_bps).sum::<f64>() / count as f64;
        let total_liquidity = self.current.values().map(|m| m.total_liquidity).sum();

        MarketSummary {
            timestamp: Utc::now(),
            symbols_tracked: count,
            bullish_symbols: bullish,
            bearish_symbols: bearish,
            neutral_symbols: count - bullish - bearish,
            avg_net_pressure: avg_pressure,
            avg_imbalance_ratio: avg_imbalance,
            avg_spread_bps,
            total_liquidity,
            highest_buy_pressure: self.top_symbols_by(|m| m.buy_pressure),
            highest_sell_pressure: self.top_symbols_by(|m| m.sell_pressure),
        }
    }

    fn top_symbols_by(&self, key: impl Fn(&DepthMetrics) -> f64) -> Vec<String> {
        let mut entries: Vec<(&String, f64)> = self
            .current
            .iter()
            .map(|(symbol, m)| (symbol, key(m)))
            .collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        entries
            .into_iter()
            .take(5)
            .map(|(symbol, _)| symbol.clone())
            .collect()
    }

    /// Evict symbols with no updates inside the TTL. Returns how many
    /// were dropped.
    pub fn cleanup_expired(&mut self) -> usize {
        let ttl = self.metrics_ttl;
        let expired: Vec<String> = self
            .last_update
            .iter()
            .filter(|(_, at)| at.elapsed() > ttl)
            .map(|(symbol, _)| symbol.clone())
            .collect();

        for symbol in &expired {
            self.current.remove(symbol);
            self.pressure.remove(symbol);
            self.imbalance.remove(symbol);
            self.last_update.remove(symbol);
        }
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "Evicted idle symbols from depth analyzer");
        }
        expired.len()
    }
}

/// Pure metric computation over one snapshot
pub(crate) fn compute_metrics(snapshot: &DepthSnapshot) -> DepthMetrics {
    let sum_qty = |levels: &[DepthLevel]| -> f64 {
        levels
            .iter()
            .map(|l| l.quantity.to_f64().unwrap_or(0.0))
            .sum()
    };

    let bid_volume = sum_qty(&snapshot.bids);
    let ask_volume = sum_qty(&snapshot.asks);
    let total_volume = bid_volume + ask_volume;

    let imbalance_ratio = if total_volume > 0.0 {
        (bid_volume - ask_volume) / total_volume
    } else {
        0.0
    };

    let buy_pressure = if total_volume > 0.0 {
        bid_volume / total_volume * 100.0
    } else {
        0.0
    };
    let sell_pressure = if total_volume > 0.0 {
        ask_volume / total_volume * 100.0
    } else {
        0.0
    };

    let depth_at = |levels: &[DepthLevel], n: usize| -> f64 {
        sum_qty(&levels[..levels.len().min(n)])
    };

    let best_bid = snapshot
        .best_bid()
        .and_then(|l| l.price.to_f64())
        .unwrap_or(0.0);
    let best_ask = snapshot
        .best_ask()
        .and_then(|l| l.price.to_f64())
        .unwrap_or(0.0);
    let spread_abs = if best_bid > 0.0 && best_ask > 0.0 {
        best_ask - best_bid
    } else {
        0.0
    };
    let mid_price = if best_bid > 0.0 && best_ask > 0.0 {
        (best_bid + best_ask) / 2.0
    } else {
        0.0
    };
    let spread_bps = if mid_price > 0.0 {
        spread_abs / mid_price * 10_000.0
    } else {
        0.0
    };

    let strongest = |levels: &[DepthLevel]| -> Option<(f64, f64)> {
        levels
            .iter()
            .max_by(|a, b| a.quantity.cmp(&b.quantity))
            .and_then(|l| Some((l.price.to_f64()?, l.quantity.to_f64()?)))
    };

    DepthMetrics {
        symbol: snapshot.symbol.clone(),
        timestamp: snapshot.event_time,
        bid_volume,
        ask_volume,
        imbalance_ratio,
        imbalance_percent: imbalance_ratio * 100.0,
        buy_pressure,
        sell_pressure,
        net_pressure: buy_pressure - sell_pressure,
        total_liquidity: total_volume,
        bid_depth_5: depth_at(&snapshot.bids, 5),
        ask_depth_5: depth_at(&snapshot.asks, 5),
        bid_depth_10: depth_at(&snapshot.bids, 10),
        ask_depth_10: depth_at(&snapshot.asks, 10),
        best_bid,
        best_ask,
        spread_abs,
        spread_bps,
        mid_price,
        vwap_bid: vwap(&snapshot.bids),
        vwap_ask: vwap(&snapshot.asks),
        bid_levels: snapshot.bids.len(),
        ask_levels: snapshot.asks.len(),
        total_levels: snapshot.bids.len() + snapshot.asks.len(),
        strongest_bid_level: strongest(&snapshot.bids),
        strongest_ask_level: strongest(&snapshot.asks),
    }
}

fn vwap(levels: &[DepthLevel]) -> f64 {
    let mut value = 0.0;
    let mut volume = 0.0;
    for level in levels {
        let price = level.price.to_f64().unwrap_or(0.0);
        let qty = level.quantity.to_f64().unwrap_or(0.0);
        value += price * qty;
        volume += qty;
    }
    if volume > 0.0 {
        value / volume
    } else {
        0.0
    }
}

/// Trend over the last ten samples: mean above +20 is bullish, below
/// -20 bearish, otherwise neutral
fn classify_trend(values: &[f64]) -> (Trend, f64) {
    if values.len() < 10 {
        return (Trend::Neutral, 0.5);
    }
    let recent = &values[values.len() - 10..];
    let mean = recent.iter().sum::<f64>() / 10.0;
    if mean > 20.0 {
        (Trend::Bullish, (mean / 50.0).min(1.0))
    } else if mean < -20.0 {
        (Trend::Bearish, (mean.abs() / 50.0).min(1.0))
    } else {
        (Trend::Neutral, 1.0 - mean.abs() / 20.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snapshot(bids: Vec<(f64, f64)>, asks: Vec<(f64, f64)>) -> DepthSnapshot {
        let to_levels = |side: Vec<(f64, f64)>| {
            side.into_iter()
                .map(|(p, q)| {
                    DepthLevel::new(
                        rust_decimal::Decimal::try_from(p).unwrap(),
                        rust_decimal::Decimal::try_from(q).unwrap(),
                    )
                })
                .collect()
        };
        DepthSnapshot {
            symbol: "BTCUSDT".to_string(),
            last_update_id: 1,
            bids: to_levels(bids),
            asks: to_levels(asks),
            event_time: Utc::now(),
        }
    }

    #[test]
    fn test_basic_metrics() {
        let snap = snapshot(
            vec![(50000.0, 3.0), (49999.0, 2.0)],
            vec![(50002.0, 1.0), (50003.0, 4.0)],
        );
        let metrics = compute_metrics(&snap);

        assert_eq!(metrics.bid_volume, 5.0);
        assert_eq!(metrics.ask_volume, 5.0);
        assert_eq!(metrics.imbalance_ratio, 0.0);
        assert_eq!(metrics.buy_pressure, 50.0);
        assert_eq!(metrics.net_pressure, 0.0);
        assert_eq!(metrics.best_bid, 50000.0);
        assert_eq!(metrics.best_ask, 50002.0);
        assert_eq!(metrics.spread_abs, 2.0);
        assert_eq!(metrics.mid_price, 50001.0);
        assert!((metrics.spread_bps - 2.0 / 50001.0 * 10000.0).abs() < 1e-9);
        assert_eq!(metrics.strongest_bid_level, Some((50000.0, 3.0)));
        assert_eq!(metrics.strongest_ask_level, Some((50003.0, 4.0)));
    }

    #[test]
    fn test_imbalance_and_pressure() {
        let snap = snapshot(vec![(100.0, 8.0)], vec![(101.0, 2.0)]);
        let metrics = compute_metrics(&snap);

        assert!((metrics.imbalance_ratio - 0.6).abs() < 1e-9);
        assert!((metrics.buy_pressure - 80.0).abs() < 1e-9);
        assert!((metrics.sell_pressure - 20.0).abs() < 1e-9);
        assert!((metrics.net_pressure - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_vwap() {
        let snap = snapshot(vec![(100.0, 1.0), (99.0, 3.0)], vec![(101.0, 2.0)]);
        let metrics = compute_metrics(&snap);
        // (100*1 + 99*3) / 4 = 99.25
        assert!((metrics.vwap_bid - 99.25).abs() < 1e-9);
        assert!((metrics.vwap_ask - 101.0).abs() < 1e-9);
    }

    #[test]
    fn test_depth_at_levels() {
        let bids: Vec<(f64, f64)> = (0..12).map(|i| (100.0 - i as f64, 1.0)).collect();
        let snap = snapshot(bids, vec![(101.0, 1.0)]);
        let metrics = compute_metrics(&snap);

        assert_eq!(metrics.bid_depth_5, 5.0);
        assert_eq!(metrics.bid_depth_10, 10.0);
        assert_eq!(metrics.bid_volume, 12.0);
        assert_eq!(metrics.bid_levels, 12);
    }

    #[test]
    fn test_pressure_ring_bounded() {
        let mut analyzer = DepthAnalyzer::new();
        for _ in 0..1000 {
            analyzer.analyze(&snapshot(vec![(100.0, 2.0)], vec![(101.0, 1.0)]));
        }
        assert_eq!(analyzer.pressure_samples("BTCUSDT"), 900);
    }

    #[test]
    fn test_pressure_history_trend_bullish() {
        let mut analyzer = DepthAnalyzer::new();
        // Heavy bid side: net pressure +60
        for _ in 0..20 {
            analyzer.analyze(&snapshot(vec![(100.0, 8.0)], vec![(101.0, 2.0)]));
        }

        let history = analyzer
            .pressure_history("BTCUSDT", Timeframe::OneMinute)
            .unwrap();
        assert_eq!(history.trend, Trend::Bullish);
        assert!((history.avg_pressure - 60.0).abs() < 1e-9);
        assert!((history.trend_strength - 1.0).abs() < 1e-9);
        assert_eq!(history.timeframe, "1m");
        assert_eq!(history.pressure_history.len(), 20);
        assert_eq!(history.imbalance_history.len(), 20);
    }

    #[test]
    fn test_pressure_history_neutral_with_few_samples() {
        let mut analyzer = DepthAnalyzer::new();
        for _ in 0..3 {
            analyzer.analyze(&snapshot(vec![(100.0, 8.0)], vec![(101.0, 2.0)]));
        }
        let history = analyzer
            .pressure_history("BTCUSDT", Timeframe::FiveMinutes)
            .unwrap();
        assert_eq!(history.trend, Trend::Neutral);
        assert_eq!(history.trend_strength, 0.5);
    }

    #[test]
    fn test_pressure_history_unknown_symbol() {
        let analyzer = DepthAnalyzer::new();
        assert!(analyzer
            .pressure_history("NOPE", Timeframe::OneMinute)
            .is_none());
    }

    #[test]
    fn test_ttl_eviction() {
        let mut analyzer = DepthAnalyzer::with_ttl(Duration::from_millis(0));
        analyzer.analyze(&snapshot(vec![(100.0, 1.0)], vec![(101.0, 1.0)]));
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(analyzer.cleanup_expired(), 1);
        assert!(analyzer.current("BTCUSDT").is_none());
        assert_eq!(analyzer.pressure_samples("BTCUSDT"), 0);
    }

    #[test]
    fn test_summary() {
        let mut analyzer = DepthAnalyzer::new();
        analyzer.analyze(&snapshot(vec![(100.0, 8.0)], vec![(101.0, 2.0)]));

        let mut bearish = snapshot(vec![(200.0, 1.0)], vec![(201.0, 9.0)]);
        bearish.symbol = "ETHUSDT".to_string();
        analyzer.analyze(&bearish);

        let summary = analyzer.summary();
        assert_eq!(summary.symbols_tracked, 2);
        assert_eq!(summary.bullish_symbols, 1);
        assert_eq!(summary.bearish_symbols, 1);
        assert_eq!(summary.neutral_symbols, 0);
        assert_eq!(summary.highest_buy_pressure[0], "BTCUSDT");
        assert_eq!(summary.highest_sell_pressure[0], "ETHUSDT");
    }

    #[test]
    fn test_timeframe_parse() {
        assert_eq!(Timeframe::parse("1m"), Some(Timeframe::OneMinute));
        assert_eq!(Timeframe::parse("5m"), Some(Timeframe::FiveMinutes));
        assert_eq!(Timeframe::parse("15m"), Some(Timeframe::FifteenMinutes));
        assert_eq!(Timeframe::parse("2h"), None);
    }

    #[test]
    fn test_zero_volume_book() {
        let snap = snapshot(vec![(100.0, 0.0)], vec![(101.0, 0.0)]);
        let metrics = compute_metrics(&snap);
        assert_eq!(metrics.imbalance_ratio, 0.0);
        assert_eq!(metrics.buy_pressure, 0.0);
        assert_eq!(metrics.vwap_bid, 0.0);
    }

    #[test]
    fn test_decimal_inputs() {
        let snap = DepthSnapshot {
            symbol: "XRPUSDT".to_string(),
            last_update_id: 7,
            bids: vec![DepthLevel::new(dec!(0.5000), dec!(2.0))],
            asks: vec![DepthLevel::new(dec!(0.5004), dec!(1.0))],
            event_time: Utc::now(),
        };
        let metrics = compute_metrics(&snap);
        assert!((metrics.mid_price - 0.5002).abs() < 1e-9);
    }
}
