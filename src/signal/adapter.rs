//! Adapter from the internal signal to the execution-engine contract
//!
//! This is the only place where the categorical confidence is mapped to
//! the numeric wire field. The wire `confidence` is always numeric.

use super::types::{ConfigProvenance, Signal, SignalAction, SignalConfidence, SignalType};
use crate::params::ConfigSource;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Constant `source` field on every published signal
pub const SIGNAL_SOURCE: &str = "realtime-strategies";

/// Wire-level trading signal, field names exactly as the execution
/// engine expects them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub id: String,
    pub signal_id: String,
    pub correlation_id: String,
    pub strategy_id: String,
    pub symbol: String,
    pub signal_type: String,
    pub action: String,
    pub confidence: f64,
    pub strength: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub current_price: Decimal,
    pub source: String,
    pub strategy: String,
    pub indicators: BTreeMap<String, f64>,
    pub metadata: BTreeMap<String, Value>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub order_type: String,
    pub time_in_force: String,
    pub timeframe: String,
    pub timestamp: DateTime<Utc>,
}

/// Pure transformation from internal signals to [`TradeSignal`]
#[derive(Debug, Clone, Default)]
pub struct SignalAdapter;

impl SignalAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Transform an internal signal into the wire contract
    pub fn adapt(&self, signal: &Signal, provenance: &ConfigProvenance) -> TradeSignal {
        let signal_id = Uuid::new_v4().to_string();
        let action = map_action(signal.signal_action);
        let confidence = effective_confidence(signal);
        let (stop_loss, take_profit, stop_loss_pct, take_profit_pct) =
            resolve_risk_levels(signal, action, confidence);

        let strategy_id = signal
            .metadata
            .get("strategy_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}_{}", signal.strategy_name, signal.symbol));

        let timeframe = signal
            .metadata
            .get("timeframe")
            .and_then(Value::as_str)
            .unwrap_or("tick")
            .to_string();

        let mut metadata = signal.metadata.clone();
        metadata.insert(
            "original_signal_type".to_string(),
            Value::from(signal.signal_type.as_str()),
        );
        metadata.insert(
            "original_signal_action".to_string(),
            Value::from(signal.signal_action.as_str()),
        );
        metadata.insert(
            "original_confidence".to_string(),
            Value::from(signal.confidence.as_str()),
        );
        metadata.insert(
            "config_source".to_string(),
            Value::from(provenance.source.as_str()),
        );
        metadata.insert("config_version".to_string(), Value::from(provenance.version));
        metadata.insert(
            "config_is_override".to_string(),
            Value::from(provenance.is_override),
        );

        TradeSignal {
            id: signal_id.clone(),
            signal_id: signal_id.clone(),
            correlation_id: signal_id,
            strategy_id,
            symbol: signal.symbol.clone(),
            signal_type: action.to_string(),
            action: action.to_string(),
            confidence,
            strength: map_strength(confidence).to_string(),
            price: signal.price,
            quantity: default_quantity(signal.price, confidence),
            current_price: signal.price,
            source: SIGNAL_SOURCE.to_string(),
            strategy: signal.strategy_name.clone(),
            indicators: signal.indicators.clone(),
            metadata,
            stop_loss,
            take_profit,
            stop_loss_pct,
            take_profit_pct,
            order_type: "market".to_string(),
            time_in_force: "GTC".to_string(),
            timeframe,
            timestamp: signal.timestamp,
        }
    }

    /// Rebuild the internal representation of an already-adapted signal
    /// from the original enums it carries in its metadata.
    ///
    /// Returns None when the wire object lacks the provenance metadata
    /// (i.e. it did not come out of this adapter).
    pub fn internalize(&self, wire: &TradeSignal) -> Option<(Signal, ConfigProvenance)> {
        let signal_type = match wire.metadata.get("original_signal_type")?.as_str()? {
            "BUY" => SignalType::Buy,
            "SELL" => SignalType::Sell,
            _ => SignalType::Hold,
        };
        let signal_action = match wire.metadata.get("original_signal_action")?.as_str()? {
            "OPEN_LONG" => SignalAction::OpenLong,
            "OPEN_SHORT" => SignalAction::OpenShort,
            "CLOSE_LONG" => SignalAction::CloseLong,
            "CLOSE_SHORT" => SignalAction::CloseShort,
            _ => SignalAction::Hold,
        };
        let confidence = match wire.metadata.get("original_confidence")?.as_str()? {
            "HIGH" => SignalConfidence::High,
            "MEDIUM" => SignalConfidence::Medium,
            _ => SignalConfidence::Low,
        };
        let provenance = ConfigProvenance {
            source: wire
                .metadata
                .get("config_source")
                .and_then(Value::as_str)
                .and_then(ConfigSource::parse)
                .unwrap_or(ConfigSource::Default),
            version: wire
                .metadata
                .get("config_version")
                .and_then(Value::as_i64)
                .unwrap_or(0),
            is_override: wire
                .metadata
                .get("config_is_override")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        };

        let mut metadata = wire.metadata.clone();
        for key in [
            "original_signal_type",
            "original_signal_action",
            "original_confidence",
            "config_source",
            "config_version",
            "config_is_override",
        ] {
            metadata.remove(key);
        }

        let signal = Signal {
            symbol: wire.symbol.clone(),
            signal_type,
            signal_action,
            confidence,
            confidence_score: wire.confidence,
            price: wire.price,
            strategy_name: wire.strategy.clone(),
            stop_loss: wire.stop_loss,
            take_profit: wire.take_profit,
            indicators: wire.indicators.clone(),
            metadata,
            timestamp: wire.timestamp,
        };
        Some((signal, provenance))
    }
}

/// Map the internal action enum onto the lowercase wire action
fn map_action(action: SignalAction) -> &'static str {
    match action {
        SignalAction::OpenLong => "buy",
        SignalAction::OpenShort => "sell",
        SignalAction::CloseLong | SignalAction::CloseShort => "close",
        SignalAction::Hold => "hold",
    }
}

/// Numeric confidence for the wire: the score when the strategy set
/// one, otherwise the categorical default
fn effective_confidence(signal: &Signal) -> f64 {
    if signal.confidence_score > 0.0 {
        signal.confidence_score
    } else {
        match signal.confidence {
            SignalConfidence::High => 0.85,
            SignalConfidence::Medium => 0.65,
            SignalConfidence::Low => 0.35,
        }
    }
}

fn map_strength(confidence: f64) -> &'static str {
    if confidence >= 0.9 {
        "extreme"
    } else if confidence >= 0.7 {
        "strong"
    } else if confidence >= 0.5 {
        "medium"
    } else {
        "weak"
    }
}

/// Quantity sized from price band and confidence: a notional base of
/// $100 / $50 / $20 worth depending on the price range, scaled by the
/// confidence score
fn default_quantity(price: Decimal, confidence: f64) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    let confidence = Decimal::from_f64(confidence).unwrap_or(Decimal::ONE);
    let (notional, dp) = if price > dec!(10000) {
        (dec!(100), 4)
    } else if price > dec!(100) {
        (dec!(50), 2)
    } else {
        (dec!(20), 2)
    };
    ((notional / price) * confidence).round_dp(dp)
}

/// Stop-loss / take-profit resolution.
///
/// Strategy-supplied absolute levels pass through; otherwise the
/// confidence band picks the percentages and the absolutes follow from
/// the price and side. Hold/close actions carry no absolute levels.
fn resolve_risk_levels(
    signal: &Signal,
    action: &str,
    confidence: f64,
) -> (Option<Decimal>, Option<Decimal>, f64, f64) {
    if let (Some(stop_loss), Some(take_profit)) = (signal.stop_loss, signal.take_profit) {
        let sl_pct = pct_distance(signal.price, stop_loss);
        let tp_pct = pct_distance(signal.price, take_profit);
        return (Some(stop_loss), Some(take_profit), sl_pct, tp_pct);
    }

    let (sl_pct, tp_pct) = if confidence >= 0.8 {
        (0.02, 0.05)
    } else if confidence >= 0.6 {
        (0.03, 0.04)
    } else {
        (0.05, 0.03)
    };

    let sl = Decimal::from_f64(sl_pct).unwrap_or_default();
    let tp = Decimal::from_f64(tp_pct).unwrap_or_default();

    match action {
        "buy" => (
            Some(signal.price * (Decimal::ONE - sl)),
            Some(signal.price * (Decimal::ONE + tp)),
            sl_pct,
            tp_pct,
        ),
        "sell" => (
            Some(signal.price * (Decimal::ONE + sl)),
            Some(signal.price * (Decimal::ONE - tp)),
            sl_pct,
            tp_pct,
        ),
        _ => (None, None, sl_pct, tp_pct),
    }
}

fn pct_distance(price: Decimal, level: Decimal) -> f64 {
    use rust_decimal::prelude::ToPrimitive;
    if price.is_zero() {
        return 0.0;
    }
    ((level - price).abs() / price).to_f64().unwrap_or(0.0)
}
