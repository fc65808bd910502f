//! Strategy parameter registry: defaults, schemas, validation, and the
//! environment-variable fallback layer

use super::types::{ParamMap, ParamValue};
use serde::Serialize;

/// Schema for one strategy parameter
#[derive(Debug, Clone, Serialize)]
pub struct ParameterSchema {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub param_type: &'static str,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub allowed: Option<&'static [&'static str]>,
    pub default: ParamValue,
    pub description: &'static str,
}

impl ParameterSchema {
    const fn float(
        name: &'static str,
        default: f64,
        min: f64,
        max: f64,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            param_type: "float",
            min: Some(min),
            max: Some(max),
            allowed: None,
            default: ParamValue::Float(default),
            description,
        }
    }

    const fn int(
        name: &'static str,
        default: i64,
        min: f64,
        max: f64,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            param_type: "int",
            min: Some(min),
            max: Some(max),
            allowed: None,
            default: ParamValue::Int(default),
            description,
        }
    }
}

/// All registered strategy identifiers, in dispatch order
pub const STRATEGY_IDS: &[&str] = &[
    "orderbook_skew",
    "spread_liquidity",
    "iceberg_detector",
    "trade_momentum",
    "ticker_velocity",
];

/// Human-readable strategy metadata
pub fn strategy_metadata(strategy_id: &str) -> (&'static str, &'static str) {
    match strategy_id {
        "orderbook_skew" => (
            "Order Book Skew",
            "Detects bid/ask volume imbalance in the top of the book",
        ),
        "trade_momentum" => (
            "Trade Momentum",
            "Scores individual trades by price move, size, and aggressor side",
        ),
        "ticker_velocity" => (
            "Ticker Velocity",
            "Measures price velocity over a sliding ticker window",
        ),
        "spread_liquidity" => (
            "Spread Liquidity",
            "Detects liquidity withdrawal and return from spread dynamics",
        ),
        "iceberg_detector" => (
            "Iceberg Detector",
            "Recognizes hidden size via refills, consistency, and anchoring",
        ),
        _ => ("Unknown", "No description available"),
    }
}

/// Parameter schemas for a strategy
pub fn parameter_schemas(strategy_id: &str) -> &'static [ParameterSchema] {
    match strategy_id {
        "orderbook_skew" => &ORDERBOOK_SKEW_SCHEMA,
        "trade_momentum" => &TRADE_MOMENTUM_SCHEMA,
        "ticker_velocity" => &TICKER_VELOCITY_SCHEMA,
        "spread_liquidity" => &SPREAD_LIQUIDITY_SCHEMA,
        "iceberg_detector" => &ICEBERG_DETECTOR_SCHEMA,
        _ => &[],
    }
}

static ORDERBOOK_SKEW_SCHEMA: [ParameterSchema; 5] = [
    ParameterSchema::int("top_levels", 5, 1.0, 50.0, "Book levels summed per side"),
    ParameterSchema::float(
        "buy_threshold",
        1.2,
        1.0,
        10.0,
        "Bid/ask volume ratio above which to buy",
    ),
    ParameterSchema::float(
        "sell_threshold",
        0.8,
        0.0,
        1.0,
        "Bid/ask volume ratio below which to sell",
    ),
    ParameterSchema::float(
        "min_spread_percent",
        0.1,
        0.0,
        5.0,
        "Maximum spread percent for a signal to be trusted",
    ),
    ParameterSchema::float("base_confidence", 0.70, 0.0, 1.0, "Starting confidence"),
];

static TRADE_MOMENTUM_SCHEMA: [ParameterSchema; 6] = [
    ParameterSchema::float("price_weight", 0.4, 0.0, 1.0, "Weight of price momentum"),
    ParameterSchema::float("quantity_weight", 0.3, 0.0, 1.0, "Weight of quantity score"),
    ParameterSchema::float("maker_weight", 0.3, 0.0, 1.0, "Weight of aggressor side"),
    ParameterSchema::float(
        "buy_threshold",
        0.7,
        0.0,
        2.0,
        "Momentum above which to buy",
    ),
    ParameterSchema::float(
        "sell_threshold",
        -0.7,
        -2.0,
        0.0,
        "Momentum below which to sell",
    ),
    ParameterSchema::float(
        "min_quantity",
        0.001,
        0.0,
        1000.0,
        "Ignore trades smaller than this",
    ),
];

static TICKER_VELOCITY_SCHEMA: [ParameterSchema; 4] = [
    ParameterSchema::int("time_window", 60, 5.0, 3600.0, "Sliding window in seconds"),
    ParameterSchema::float(
        "buy_threshold",
        0.5,
        0.0,
        20.0,
        "Velocity in %/min above which to buy",
    ),
    ParameterSchema::float(
        "sell_threshold",
        -0.5,
        -20.0,
        0.0,
        "Velocity in %/min below which to sell",
    ),
    ParameterSchema::float(
        "min_price_change",
        0.1,
        0.0,
        10.0,
        "Minimum absolute change percent over the window",
    ),
];

static SPREAD_LIQUIDITY_SCHEMA: [ParameterSchema; 8] = [
    ParameterSchema::float(
        "spread_threshold_bps",
        10.0,
        0.1,
        500.0,
        "Spread in bps above which a regime counts as wide",
    ),
    ParameterSchema::float(
        "spread_ratio_threshold",
        2.5,
        1.0,
        20.0,
        "Spread vs rolling average ratio threshold",
    ),
    ParameterSchema::float(
        "velocity_threshold",
        0.5,
        0.01,
        10.0,
        "Relative spread change per snapshot threshold",
    ),
    ParameterSchema::float(
        "persistence_threshold_seconds",
        30.0,
        1.0,
        3600.0,
        "How long a wide regime must persist before narrowing is bullish",
    ),
    ParameterSchema::float(
        "min_depth_reduction_pct",
        0.5,
        0.0,
        1.0,
        "Depth loss vs rolling mean required for a widening signal",
    ),
    ParameterSchema::float("base_confidence", 0.70, 0.0, 1.0, "Starting confidence"),
    ParameterSchema::int("lookback_ticks", 20, 3.0, 500.0, "Spread history length"),
    ParameterSchema::float(
        "min_signal_interval_seconds",
        60.0,
        1.0,
        86400.0,
        "Per-symbol rate limit",
    ),
];

static ICEBERG_DETECTOR_SCHEMA: [ParameterSchema; 9] = [
    ParameterSchema::int(
        "min_refill_count",
        3,
        1.0,
        50.0,
        "Refills required before the pattern fires",
    ),
    ParameterSchema::float(
        "refill_speed_threshold_seconds",
        5.0,
        0.1,
        120.0,
        "Maximum duration of the restore leg of a refill",
    ),
    ParameterSchema::float(
        "consistency_threshold",
        0.1,
        0.0,
        1.0,
        "Coefficient-of-variation ceiling for consistent sizing",
    ),
    ParameterSchema::float(
        "persistence_threshold_seconds",
        120.0,
        10.0,
        3600.0,
        "Level age required for the anchoring pattern",
    ),
    ParameterSchema::float(
        "level_proximity_pct",
        1.0,
        0.01,
        10.0,
        "Only signal when mid is within this percent of the level",
    ),
    ParameterSchema::float("base_confidence", 0.70, 0.0, 1.0, "Starting confidence"),
    ParameterSchema::int(
        "history_window_seconds",
        300,
        30.0,
        3600.0,
        "Sliding window for level histories",
    ),
    ParameterSchema::int("max_symbols", 100, 1.0, 10000.0, "Symbol cap for the tracker"),
    ParameterSchema::float(
        "min_signal_interval_seconds",
        120.0,
        1.0,
        86400.0,
        "Per-symbol rate limit",
    ),
];

/// Compiled default parameters for a strategy
pub fn strategy_defaults(strategy_id: &str) -> ParamMap {
    parameter_schemas(strategy_id)
        .iter()
        .map(|schema| (schema.name.to_string(), schema.default.clone()))
        .collect()
}

/// Validate a parameter map against the strategy schema.
///
/// Returns one message per offending parameter; an empty list means the
/// map is valid. Unknown strategies accept nothing.
pub fn validate_parameters(strategy_id: &str, parameters: &ParamMap) -> Vec<String> {
    let schemas = parameter_schemas(strategy_id);
    if schemas.is_empty() {
        return vec![format!("unknown strategy: {strategy_id}")];
    }

    let mut errors = Vec::new();
    for (name, value) in parameters {
        let Some(schema) = schemas.iter().find(|s| s.name == name) else {
            errors.push(format!("unknown parameter: {name}"));
            continue;
        };

        match schema.param_type {
            "int" => {
                if value.as_i64().is_none() {
                    errors.push(format!("{name} must be an integer"));
                    continue;
                }
            }
            "float" => {
                if value.as_f64().is_none() {
                    errors.push(format!("{name} must be a number"));
                    continue;
                }
            }
            "bool" => {
                if value.as_bool().is_none() {
                    errors.push(format!("{name} must be a boolean"));
                    continue;
                }
            }
            "string" | "enum" => {
                if value.as_str().is_none() {
                    errors.push(format!("{name} must be a string"));
                    continue;
                }
            }
            _ => {}
        }

        if let Some(numeric) = value.as_f64() {
            if let Some(min) = schema.min {
                if numeric < min {
                    errors.push(format!("{name} must be >= {min}, got {numeric}"));
                }
            }
            if let Some(max) = schema.max {
                if numeric > max {
                    errors.push(format!("{name} must be <= {max}, got {numeric}"));
                }
            }
        }
        if let (Some(allowed), Some(s)) = (schema.allowed, value.as_str()) {
            if !allowed.contains(&s) {
                errors.push(format!("{name} must be one of {allowed:?}"));
            }
        }
    }
    errors
}

/// Environment-variable fallback layer.
///
/// Variables are named `{STRATEGY_ID}_{PARAM}` in SCREAMING_SNAKE_CASE
/// (e.g. `ORDERBOOK_SKEW_BUY_THRESHOLD`). Returns None when no variable
/// for the strategy is set; otherwise the defaults overlaid with every
/// parseable environment value.
pub fn env_parameters(strategy_id: &str) -> Option<ParamMap> {
    let schemas = parameter_schemas(strategy_id);
    let prefix = strategy_id.to_uppercase();

    let mut parameters = strategy_defaults(strategy_id);
    let mut any_set = false;

    for schema in schemas {
        let var = format!("{}_{}", prefix, schema.name.to_uppercase());
        let Ok(raw) = std::env::var(&var) else {
            continue;
        };
        let parsed = match schema.param_type {
            "int" => raw.parse::<i64>().ok().map(ParamValue::Int),
            "float" => raw.parse::<f64>().ok().map(ParamValue::Float),
            "bool" => raw.parse::<bool>().ok().map(ParamValue::Bool),
            _ => Some(ParamValue::Str(raw.clone())),
        };
        match parsed {
            Some(value) => {
                parameters.insert(schema.name.to_string(), value);
                any_set = true;
            }
            None => {
                tracing::warn!(var = %var, value = %raw, "Ignoring unparseable environment parameter");
            }
        }
    }

    any_set.then_some(parameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_all_strategies() {
        for id in STRATEGY_IDS {
            let defaults = strategy_defaults(id);
            assert!(!defaults.is_empty(), "no defaults for {id}");
        }
    }

    #[test]
    fn test_skew_defaults() {
        let defaults = strategy_defaults("orderbook_skew");
        assert_eq!(defaults.get("top_levels"), Some(&ParamValue::Int(5)));
        assert_eq!(defaults.get("buy_threshold"), Some(&ParamValue::Float(1.2)));
        assert_eq!(defaults.get("sell_threshold"), Some(&ParamValue::Float(0.8)));
    }

    #[test]
    fn test_validate_accepts_defaults() {
        for id in STRATEGY_IDS {
            let errors = validate_parameters(id, &strategy_defaults(id));
            assert!(errors.is_empty(), "{id} defaults invalid: {errors:?}");
        }
    }

    #[test]
    fn test_validate_unknown_parameter() {
        let mut params = ParamMap::new();
        params.insert("bogus".to_string(), ParamValue::Int(1));
        let errors = validate_parameters("orderbook_skew", &params);
        assert_eq!(errors, vec!["unknown parameter: bogus"]);
    }

    #[test]
    fn test_validate_type_mismatch() {
        let mut params = ParamMap::new();
        params.insert("top_levels".to_string(), ParamValue::Float(2.5));
        let errors = validate_parameters("orderbook_skew", &params);
        assert_eq!(errors, vec!["top_levels must be an integer"]);
    }

    #[test]
    fn test_validate_range() {
        let mut params = ParamMap::new();
        params.insert("buy_threshold".to_string(), ParamValue::Float(50.0));
        let errors = validate_parameters("orderbook_skew", &params);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("must be <= 10"));
    }

    #[test]
    fn test_validate_unknown_strategy() {
        let errors = validate_parameters("mystery", &ParamMap::new());
        assert_eq!(errors, vec!["unknown strategy: mystery"]);
    }

    #[test]
    fn test_env_parameters_absent() {
        std::env::remove_var("TICKER_VELOCITY_BUY_THRESHOLD");
        std::env::remove_var("TICKER_VELOCITY_TIME_WINDOW");
        std::env::remove_var("TICKER_VELOCITY_SELL_THRESHOLD");
        std::env::remove_var("TICKER_VELOCITY_MIN_PRICE_CHANGE");
        assert!(env_parameters("ticker_velocity").is_none());
    }

    #[test]
    fn test_env_parameters_overlay() {
        std::env::set_var("TRADE_MOMENTUM_BUY_THRESHOLD", "0.9");
        let params = env_parameters("trade_momentum").unwrap();
        assert_eq!(params.get("buy_threshold"), Some(&ParamValue::Float(0.9)));
        // Untouched values come from the defaults
        assert_eq!(params.get("maker_weight"), Some(&ParamValue::Float(0.3)));
        std::env::remove_var("TRADE_MOMENTUM_BUY_THRESHOLD");
    }
}
