//! Rolling spread history for liquidity-event detection

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// One spread observation taken from a depth snapshot
#[derive(Debug, Clone, Copy)]
pub struct SpreadTick {
    pub timestamp: DateTime<Utc>,
    pub spread_bps: f64,
    pub mid_price: Decimal,
    pub depth_bid_top5: f64,
    pub depth_ask_top5: f64,
}

impl SpreadTick {
    pub fn total_depth(&self) -> f64 {
        self.depth_bid_top5 + self.depth_ask_top5
    }
}

/// Bounded ring of the last N spread observations for one symbol
#[derive(Debug)]
pub struct SpreadHistory {
    ticks: VecDeque<SpreadTick>,
    capacity: usize,
}

impl SpreadHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            ticks: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, tick: SpreadTick) {
        if self.ticks.len() == self.capacity {
            self.ticks.pop_front();
        }
        self.ticks.push_back(tick);
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn latest(&self) -> Option<&SpreadTick> {
        self.ticks.back()
    }

    /// The observation immediately before the latest
    pub fn previous(&self) -> Option<&SpreadTick> {
        if self.ticks.len() < 2 {
            return None;
        }
        self.ticks.get(self.ticks.len() - 2)
    }

    /// Rolling average spread in bps, excluding the latest observation
    pub fn avg_spread_bps(&self) -> Option<f64> {
        if self.ticks.len() < 2 {
            return None;
        }
        let n = self.ticks.len() - 1;
        let sum: f64 = self.ticks.iter().take(n).map(|t| t.spread_bps).sum();
        Some(sum / n as f64)
    }

    /// Rolling average top-5 depth, excluding the latest observation
    pub fn avg_total_depth(&self) -> Option<f64> {
        if self.ticks.len() < 2 {
            return None;
        }
        let n = self.ticks.len() - 1;
        let sum: f64 = self.ticks.iter().take(n).map(|t| t.total_depth()).sum();
        Some(sum / n as f64)
    }
}
