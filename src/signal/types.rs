//! Internal signal types

use crate::params::ConfigSource;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Signal direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalType {
    Buy,
    Sell,
    Hold,
}

impl SignalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Buy => "BUY",
            SignalType::Sell => "SELL",
            SignalType::Hold => "HOLD",
        }
    }
}

/// Position action requested by the strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalAction {
    OpenLong,
    OpenShort,
    CloseLong,
    CloseShort,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::OpenLong => "OPEN_LONG",
            SignalAction::OpenShort => "OPEN_SHORT",
            SignalAction::CloseLong => "CLOSE_LONG",
            SignalAction::CloseShort => "CLOSE_SHORT",
            SignalAction::Hold => "HOLD",
        }
    }
}

/// Categorical confidence level
///
/// Deliberately a separate type from the numeric `confidence_score`:
/// the two must never be compared against each other, and neither
/// implements an ordering against floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalConfidence {
    High,
    Medium,
    Low,
}

impl SignalConfidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalConfidence::High => "HIGH",
            SignalConfidence::Medium => "MEDIUM",
            SignalConfidence::Low => "LOW",
        }
    }

    /// Categorical level for a numeric score, used when a strategy only
    /// computes the number
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            SignalConfidence::High
        } else if score >= 0.6 {
            SignalConfidence::Medium
        } else {
            SignalConfidence::Low
        }
    }
}

/// Provenance of the configuration a signal was generated under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigProvenance {
    pub source: ConfigSource,
    pub version: i64,
    pub is_override: bool,
}

impl Default for ConfigProvenance {
    fn default() -> Self {
        Self {
            source: ConfigSource::Default,
            version: 0,
            is_override: false,
        }
    }
}

impl From<&crate::params::ResolvedConfig> for ConfigProvenance {
    fn from(resolved: &crate::params::ResolvedConfig) -> Self {
        Self {
            source: resolved.source,
            version: resolved.version,
            is_override: resolved.is_override,
        }
    }
}

/// Internal trading signal emitted by a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    pub signal_type: SignalType,
    pub signal_action: SignalAction,
    pub confidence: SignalConfidence,
    pub confidence_score: f64,
    /// Reference entry price
    pub price: Decimal,
    /// Strategy short name (e.g. "orderbook_skew")
    pub strategy_name: String,
    /// Strategy-supplied risk levels; the adapter fills in defaults
    /// from the confidence band when these are None
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    /// Strategy-specific explainability values
    pub indicators: BTreeMap<String, f64>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl Signal {
    /// Create a signal with the categorical confidence derived from
    /// the numeric score
    pub fn new(
        symbol: impl Into<String>,
        signal_type: SignalType,
        signal_action: SignalAction,
        confidence_score: f64,
        price: Decimal,
        strategy_name: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            signal_type,
            signal_action,
            confidence: SignalConfidence::from_score(confidence_score),
            confidence_score,
            price,
            strategy_name: strategy_name.into(),
            stop_loss: None,
            take_profit: None,
            indicators: BTreeMap::new(),
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_risk_levels(mut self, stop_loss: Decimal, take_profit: Decimal) -> Self {
        self.stop_loss = Some(stop_loss);
        self.take_profit = Some(take_profit);
        self
    }

    pub fn with_indicator(mut self, name: impl Into<String>, value: f64) -> Self {
        self.indicators.insert(name.into(), value);
        self
    }

    pub fn with_metadata(
        mut self,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.metadata.insert(name.into(), value);
        self
    }
}
