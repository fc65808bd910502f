//! Typed market event model
//!
//! Events arrive on the bus as JSON wrapped in a transport envelope
//! carrying a `stream` tag (e.g. `btcusdt@depth20@100ms`). Parsing is
//! one-pass at intake: payloads with missing or mis-typed fields are
//! rejected with a typed error and never propagate further.

mod parse;

pub use parse::{parse_envelope, ParseError};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Stream kind extracted from the envelope tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Depth,
    Trade,
    Ticker,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Depth => "depth",
            StreamKind::Trade => "trade",
            StreamKind::Ticker => "ticker",
        }
    }
}

/// A single order book level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl DepthLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Order book depth snapshot
///
/// Bids are ordered descending by price, asks ascending. Intake rejects
/// snapshots with zero levels on either side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    pub symbol: String,
    pub last_update_id: u64,
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
    pub event_time: DateTime<Utc>,
}

impl DepthSnapshot {
    pub fn best_bid(&self) -> Option<&DepthLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&DepthLevel> {
        self.asks.first()
    }

    /// Mid price, None when either side is empty
    pub fn mid_price(&self) -> Option<Decimal> {
        let bid = self.best_bid()?.price;
        let ask = self.best_ask()?.price;
        Some((bid + ask) / Decimal::TWO)
    }
}

/// A single executed trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub trade_id: u64,
    pub price: Decimal,
    pub quantity: Decimal,
    pub buyer_order_id: u64,
    pub seller_order_id: u64,
    pub trade_time: DateTime<Utc>,
    /// True when the buyer was the resting order (seller was the aggressor)
    pub is_buyer_maker: bool,
    pub event_time: DateTime<Utc>,
}

/// 24-hour ticker update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerUpdate {
    pub symbol: String,
    pub last_price: Decimal,
    pub volume: Option<Decimal>,
    pub price_change_percent: Option<Decimal>,
    pub event_time: DateTime<Utc>,
}

/// A parsed market event, tagged by stream kind
#[derive(Debug, Clone, PartialEq)]
pub enum MarketEvent {
    Depth(DepthSnapshot),
    Trade(Trade),
    Ticker(TickerUpdate),
}

impl MarketEvent {
    pub fn kind(&self) -> StreamKind {
        match self {
            MarketEvent::Depth(_) => StreamKind::Depth,
            MarketEvent::Trade(_) => StreamKind::Trade,
            MarketEvent::Ticker(_) => StreamKind::Ticker,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            MarketEvent::Depth(d) => &d.symbol,
            MarketEvent::Trade(t) => &t.symbol,
            MarketEvent::Ticker(t) => &t.symbol,
        }
    }
}
