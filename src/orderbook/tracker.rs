//! Per-level order book tracking for iceberg detection
//!
//! Tracks (timestamp, quantity) samples for each observed price level
//! inside a sliding time window, and recognizes three hidden-size
//! patterns: fast refills, tight size consistency, and long persistence
//! at a single price.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

use crate::events::DepthLevel;

/// Which side of the book a level sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookSide {
    Bid,
    Ask,
}

impl BookSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookSide::Bid => "bid",
            BookSide::Ask => "ask",
        }
    }
}

/// Detected iceberg pattern kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    Refill,
    ConsistentSize,
    Anchor,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Refill => "refill",
            PatternKind::ConsistentSize => "consistent_size",
            PatternKind::Anchor => "anchor",
        }
    }
}

/// A detected hidden-size pattern at one price level
#[derive(Debug, Clone)]
pub struct IcebergPattern {
    pub price: Decimal,
    pub side: BookSide,
    pub kind: PatternKind,
    pub confidence: f64,
    pub refill_count: u32,
    pub consistency_score: f64,
    pub persistence_seconds: f64,
}

/// Tracker thresholds
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub history_window_seconds: i64,
    pub refill_speed_threshold_seconds: f64,
    pub consistency_threshold: f64,
    pub persistence_threshold_seconds: f64,
    pub min_refill_count: u32,
    pub base_confidence: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_window_seconds: 300,
            refill_speed_threshold_seconds: 5.0,
            consistency_threshold: 0.1,
            persistence_threshold_seconds: 120.0,
            min_refill_count: 3,
            base_confidence: 0.70,
        }
    }
}

/// History for one tracked price level
#[derive(Debug)]
struct LevelHistory {
    samples: Vec<(DateTime<Utc>, Decimal)>,
    refill_count: u32,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl LevelHistory {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            samples: Vec::new(),
            refill_count: 0,
            first_seen: now,
            last_seen: now,
        }
    }

    fn push(&mut self, now: DateTime<Utc>, quantity: Decimal, window: Duration) {
        self.samples.push((now, quantity));
        self.last_seen = now;
        let cutoff = now - window;
        self.samples.retain(|(ts, _)| *ts >= cutoff);
    }

    /// Refill pattern over the last three samples: deplete below half,
    /// then restore above 80% of the original size with the restore leg
    /// completing inside the speed threshold.
    fn is_refill(&self, speed_threshold_seconds: f64) -> bool {
        if self.samples.len() < 3 {
            return false;
        }
        let window = &self.samples[self.samples.len() - 3..];
        let (_, v0) = window[0];
        let (t1, v1) = window[1];
        let (t2, v2) = window[2];

        if v0.is_zero() {
            return false;
        }
        let half = v0 * Decimal::new(5, 1);
        let restore = v0 * Decimal::new(8, 1);
        let restore_secs = (t2 - t1).num_milliseconds() as f64 / 1000.0;

        v1 < half && v2 > restore && restore_secs < speed_threshold_seconds
    }

    /// Coefficient of variation of the quantity samples
    fn coefficient_of_variation(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let values: Vec<f64> = self
            .samples
            .iter()
            .filter_map(|(_, q)| q.to_f64())
            .collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        if mean <= 0.0 {
            return None;
        }
        let variance =
            values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        Some(variance.sqrt() / mean)
    }

    fn persistence_seconds(&self, now: DateTime<Utc>) -> f64 {
        (now - self.first_seen).num_milliseconds() as f64 / 1000.0
    }
}

/// State for one symbol: level histories keyed by price, per side
#[derive(Debug, Default)]
struct SymbolLevels {
    bids: HashMap<Decimal, LevelHistory>,
    asks: HashMap<Decimal, LevelHistory>,
    last_update: Option<DateTime<Utc>>,
}

/// Tracks order book levels over time to detect iceberg patterns
#[derive(Debug)]
pub struct OrderBookTracker {
    config: TrackerConfig,
    max_symbols: usize,
    symbols: HashMap<String, SymbolLevels>,
}

impl OrderBookTracker {
    pub fn new(config: TrackerConfig, max_symbols: usize) -> Self {
        Self {
            config,
            max_symbols,
            symbols: HashMap::new(),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: TrackerConfig) {
        self.config = config;
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn level_count(&self, symbol: &str) -> usize {
        self.symbols
            .get(symbol)
            .map(|s| s.bids.len() + s.asks.len())
            .unwrap_or(0)
    }

    /// Record a depth snapshot into the per-level histories
    pub fn update(
        &mut self,
        symbol: &str,
        bids: &[DepthLevel],
        asks: &[DepthLevel],
        now: DateTime<Utc>,
    ) {
        self.evict_for(symbol);

        let window = Duration::seconds(self.config.history_window_seconds);
        let speed = self.config.refill_speed_threshold_seconds;
        let entry = self.symbols.entry(symbol.to_string()).or_default();
        entry.last_update = Some(now);

        for level in bids {
            Self::update_level(&mut entry.bids, level, now, window, speed);
        }
        for level in asks {
            Self::update_level(&mut entry.asks, level, now, window, speed);
        }

        // Prune levels that fell out of the window entirely
        let cutoff = now - window;
        entry.bids.retain(|_, h| h.last_seen >= cutoff);
        entry.asks.retain(|_, h| h.last_seen >= cutoff);
    }

    fn update_level(
        levels: &mut HashMap<Decimal, LevelHistory>,
        level: &DepthLevel,
        now: DateTime<Utc>,
        window: Duration,
        speed_threshold: f64,
    ) {
        let history = levels
            .entry(level.price)
            .or_insert_with(|| LevelHistory::new(now));
        history.push(now, level.quantity, window);
        if history.is_refill(speed_threshold) {
            history.refill_count += 1;
        }
    }

    /// Drop the least recently updated symbols once the cap is reached
    fn evict_for(&mut self, incoming: &str) {
        if self.symbols.contains_key(incoming) || self.symbols.len() < self.max_symbols {
            return;
        }
        if let Some(oldest) = self
            .symbols
            .iter()
            .min_by_key(|(_, s)| s.last_update)
            .map(|(symbol, _)| symbol.clone())
        {
            tracing::debug!(symbol = %oldest, "Evicting least recent symbol from tracker");
            self.symbols.remove(&oldest);
        }
    }

    /// Detect iceberg patterns within `proximity_pct` percent of the
    /// given mid price
    pub fn detect(
        &self,
        symbol: &str,
        mid_price: Decimal,
        proximity_pct: f64,
        now: DateTime<Utc>,
    ) -> Vec<IcebergPattern> {
        let Some(levels) = self.symbols.get(symbol) else {
            return Vec::new();
        };
        let range = mid_price
            * Decimal::from_f64_retain(proximity_pct / 100.0).unwrap_or_default();
        let min_price = mid_price - range;
        let max_price = mid_price + range;

        let mut patterns = Vec::new();
        for (price, history) in &levels.bids {
            if *price >= min_price && *price <= max_price {
                if let Some(p) = self.check_level(*price, BookSide::Bid, history, now) {
                    patterns.push(p);
                }
            }
        }
        for (price, history) in &levels.asks {
            if *price >= min_price && *price <= max_price {
                if let Some(p) = self.check_level(*price, BookSide::Ask, history, now) {
                    patterns.push(p);
                }
            }
        }
        patterns
    }

    fn check_level(
        &self,
        price: Decimal,
        side: BookSide,
        history: &LevelHistory,
        now: DateTime<Utc>,
    ) -> Option<IcebergPattern> {
        let persistence = history.persistence_seconds(now);
        let cv = history.coefficient_of_variation();
        let consistency_score = cv.map(|cv| (1.0 - cv).max(0.0)).unwrap_or(0.0);

        // Repeated refills: the strongest evidence
        if history.refill_count >= self.config.min_refill_count {
            let extra = history.refill_count.saturating_sub(3) as f64;
            return Some(IcebergPattern {
                price,
                side,
                kind: PatternKind::Refill,
                confidence: (0.65 + extra * 0.05).min(0.85),
                refill_count: history.refill_count,
                consistency_score,
                persistence_seconds: persistence,
            });
        }

        // Tight size consistency with enough samples
        if let Some(cv) = cv {
            if cv < self.config.consistency_threshold
                && history.samples.len() >= self.config.min_refill_count as usize
            {
                return Some(IcebergPattern {
                    price,
                    side,
                    kind: PatternKind::ConsistentSize,
                    confidence: self.config.base_confidence * (1.0 - cv),
                    refill_count: history.refill_count,
                    consistency_score,
                    persistence_seconds: persistence,
                });
            }
        }

        // Long-lived level despite market movement
        if persistence >= self.config.persistence_threshold_seconds {
            return Some(IcebergPattern {
                price,
                side,
                kind: PatternKind::Anchor,
                confidence: (0.75 + persistence / 600.0 * 0.10).min(0.85),
                refill_count: history.refill_count,
                consistency_score,
                persistence_seconds: persistence,
            });
        }

        None
    }
}
