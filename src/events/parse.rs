//! Envelope parsing for incoming bus payloads

use super::{DepthLevel, DepthSnapshot, MarketEvent, StreamKind, Trade, TickerUpdate};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Intake parse failure
///
/// `UnknownStream` is counted separately from malformed payloads so the
/// two failure modes stay distinguishable in metrics.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("envelope is missing the stream tag")]
    MissingStream,
    #[error("envelope is missing the data object")]
    MissingData,
    #[error("unknown stream kind: {0}")]
    UnknownStream(String),
    #[error("missing or mis-typed field: {0}")]
    InvalidField(&'static str),
    #[error("depth snapshot has an empty {0} side")]
    EmptySide(&'static str),
}

impl ParseError {
    /// True when the failure should be counted as an unknown stream
    /// rather than a malformed payload
    pub fn is_unknown_stream(&self) -> bool {
        matches!(self, ParseError::UnknownStream(_))
    }

    /// Metric label for the drop counter
    pub fn drop_reason(&self) -> &'static str {
        match self {
            ParseError::InvalidJson(_)
            | ParseError::MissingStream
            | ParseError::MissingData => "parse",
            ParseError::UnknownStream(_) => "unknown_stream",
            ParseError::InvalidField(_) | ParseError::EmptySide(_) => "validation",
        }
    }
}

/// Classify a stream tag by substring match
fn classify_stream(stream: &str) -> Option<StreamKind> {
    if stream.contains("@depth") {
        Some(StreamKind::Depth)
    } else if stream.contains("@trade") {
        Some(StreamKind::Trade)
    } else if stream.contains("@ticker") {
        Some(StreamKind::Ticker)
    } else {
        None
    }
}

/// Symbol is the stream prefix before `@`, uppercased; the payload's
/// own `s` field wins when present.
fn extract_symbol(stream: &str, data: &Value) -> String {
    if let Some(s) = data.get("s").and_then(Value::as_str) {
        if !s.is_empty() {
            return s.to_uppercase();
        }
    }
    stream
        .split('@')
        .next()
        .unwrap_or(stream)
        .to_uppercase()
}

/// Decode a bus payload into a typed market event
pub fn parse_envelope(payload: &[u8]) -> Result<MarketEvent, ParseError> {
    let envelope: Value = serde_json::from_slice(payload)?;

    let stream = envelope
        .get("stream")
        .and_then(Value::as_str)
        .ok_or(ParseError::MissingStream)?;
    let data = envelope.get("data").ok_or(ParseError::MissingData)?;

    let kind = classify_stream(stream)
        .ok_or_else(|| ParseError::UnknownStream(stream.to_string()))?;
    let symbol = extract_symbol(stream, data);

    match kind {
        StreamKind::Depth => parse_depth(symbol, data).map(MarketEvent::Depth),
        StreamKind::Trade => parse_trade(symbol, data).map(MarketEvent::Trade),
        StreamKind::Ticker => parse_ticker(symbol, data).map(MarketEvent::Ticker),
    }
}

fn parse_depth(symbol: String, data: &Value) -> Result<DepthSnapshot, ParseError> {
    let bids = parse_levels(data.get("bids"), "bids")?;
    let asks = parse_levels(data.get("asks"), "asks")?;

    if bids.is_empty() {
        return Err(ParseError::EmptySide("bid"));
    }
    if asks.is_empty() {
        return Err(ParseError::EmptySide("ask"));
    }

    Ok(DepthSnapshot {
        symbol,
        last_update_id: data
            .get("lastUpdateId")
            .or_else(|| data.get("u"))
            .and_then(Value::as_u64)
            .unwrap_or(0),
        bids,
        asks,
        event_time: field_millis(data, "E").unwrap_or_else(Utc::now),
    })
}

/// Levels arrive as `["price", "qty"]` string pairs
fn parse_levels(
    value: Option<&Value>,
    field: &'static str,
) -> Result<Vec<DepthLevel>, ParseError> {
    let raw = match value.and_then(Value::as_array) {
        Some(raw) => raw,
        None => return Err(ParseError::InvalidField(field)),
    };

    let mut levels = Vec::with_capacity(raw.len());
    for entry in raw {
        let pair = entry.as_array().ok_or(ParseError::InvalidField(field))?;
        if pair.len() < 2 {
            return Err(ParseError::InvalidField(field));
        }
        let price = decimal_value(&pair[0]).ok_or(ParseError::InvalidField(field))?;
        let quantity = decimal_value(&pair[1]).ok_or(ParseError::InvalidField(field))?;
        if price.is_sign_negative() || quantity.is_sign_negative() {
            return Err(ParseError::InvalidField(field));
        }
        levels.push(DepthLevel::new(price, quantity));
    }
    Ok(levels)
}

fn parse_trade(symbol: String, data: &Value) -> Result<Trade, ParseError> {
    Ok(Trade {
        symbol,
        trade_id: data
            .get("t")
            .and_then(Value::as_u64)
            .ok_or(ParseError::InvalidField("t"))?,
        price: field_decimal(data, "p")?,
        quantity: field_decimal(data, "q")?,
        buyer_order_id: data.get("b").and_then(Value::as_u64).unwrap_or(0),
        seller_order_id: data.get("a").and_then(Value::as_u64).unwrap_or(0),
        trade_time: field_millis(data, "T").ok_or(ParseError::InvalidField("T"))?,
        is_buyer_maker: data
            .get("m")
            .and_then(Value::as_bool)
            .ok_or(ParseError::InvalidField("m"))?,
        event_time: field_millis(data, "E").unwrap_or_else(Utc::now),
    })
}

fn parse_ticker(symbol: String, data: &Value) -> Result<TickerUpdate, ParseError> {
    Ok(TickerUpdate {
        symbol,
        last_price: field_decimal(data, "c")?,
        volume: data.get("v").and_then(decimal_value),
        price_change_percent: data.get("P").and_then(decimal_value),
        event_time: field_millis(data, "E").unwrap_or_else(Utc::now),
    })
}

/// Numeric fields arrive as strings on most streams, numbers on some
fn decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn field_decimal(data: &Value, field: &'static str) -> Result<Decimal, ParseError> {
    data.get(field)
        .and_then(decimal_value)
        .ok_or(ParseError::InvalidField(field))
}

fn field_millis(data: &Value, field: &str) -> Option<DateTime<Utc>> {
    let millis = data.get(field)?.as_i64()?;
    Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn depth_payload() -> Vec<u8> {
        br#"{
            "stream": "btcusdt@depth20@100ms",
            "data": {
                "lastUpdateId": 12345,
                "E": 1704067200000,
                "bids": [["50000.00", "3.0"], ["49999.00", "2.0"]],
                "asks": [["50001.00", "0.5"], ["50002.00", "0.4"]]
            }
        }"#
        .to_vec()
    }

    #[test]
    fn test_parse_depth() {
        let event = parse_envelope(&depth_payload()).unwrap();
        let MarketEvent::Depth(depth) = event else {
            panic!("expected depth event");
        };

        assert_eq!(depth.symbol, "BTCUSDT");
        assert_eq!(depth.last_update_id, 12345);
        assert_eq!(depth.bids.len(), 2);
        assert_eq!(depth.bids[0].price, dec!(50000.00));
        assert_eq!(depth.asks[0].quantity, dec!(0.5));
    }

    #[test]
    fn test_parse_depth_empty_side_rejected() {
        let payload = br#"{
            "stream": "btcusdt@depth20",
            "data": {"bids": [], "asks": [["50001.00", "0.5"]]}
        }"#;

        let err = parse_envelope(payload).unwrap_err();
        assert!(matches!(err, ParseError::EmptySide("bid")));
    }

    #[test]
    fn test_parse_trade() {
        let payload = br#"{
            "stream": "ethusdt@trade",
            "data": {
                "s": "ETHUSDT",
                "t": 98765,
                "p": "3000.50",
                "q": "1.25",
                "b": 111,
                "a": 222,
                "T": 1704067200123,
                "m": true,
                "E": 1704067200125
            }
        }"#;

        let event = parse_envelope(payload).unwrap();
        let MarketEvent::Trade(trade) = event else {
            panic!("expected trade event");
        };

        assert_eq!(trade.symbol, "ETHUSDT");
        assert_eq!(trade.price, dec!(3000.50));
        assert_eq!(trade.quantity, dec!(1.25));
        assert!(trade.is_buyer_maker);
    }

    #[test]
    fn test_parse_ticker() {
        let payload = br#"{
            "stream": "btcusdt@ticker",
            "data": {
                "s": "BTCUSDT",
                "c": "50000.00",
                "v": "12345.6",
                "P": "2.5",
                "E": 1704067200000
            }
        }"#;

        let event = parse_envelope(payload).unwrap();
        let MarketEvent::Ticker(ticker) = event else {
            panic!("expected ticker event");
        };

        assert_eq!(ticker.last_price, dec!(50000.00));
        assert_eq!(ticker.volume, Some(dec!(12345.6)));
        assert_eq!(ticker.price_change_percent, Some(dec!(2.5)));
    }

    #[test]
    fn test_parse_ticker_optional_fields_absent() {
        let payload = br#"{
            "stream": "btcusdt@ticker",
            "data": {"c": "50000.00"}
        }"#;

        let event = parse_envelope(payload).unwrap();
        let MarketEvent::Ticker(ticker) = event else {
            panic!("expected ticker event");
        };
        assert!(ticker.volume.is_none());
        assert!(ticker.price_change_percent.is_none());
    }

    #[test]
    fn test_unknown_stream() {
        let payload = br#"{"stream": "btcusdt@kline_1m", "data": {}}"#;
        let err = parse_envelope(payload).unwrap_err();
        assert!(err.is_unknown_stream());
    }

    #[test]
    fn test_missing_stream() {
        let payload = br#"{"data": {}}"#;
        let err = parse_envelope(payload).unwrap_err();
        assert!(matches!(err, ParseError::MissingStream));
        assert!(!err.is_unknown_stream());
    }

    #[test]
    fn test_invalid_json() {
        let err = parse_envelope(b"not json").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    #[test]
    fn test_mistyped_trade_field() {
        let payload = br#"{
            "stream": "ethusdt@trade",
            "data": {"t": 1, "p": "not_a_number", "q": "1.0", "T": 1704067200123, "m": false}
        }"#;

        let err = parse_envelope(payload).unwrap_err();
        assert!(matches!(err, ParseError::InvalidField("p")));
    }

    #[test]
    fn test_symbol_from_stream_prefix() {
        let payload = br#"{
            "stream": "xrpusdt@trade",
            "data": {"t": 1, "p": "0.5", "q": "100", "T": 1704067200123, "m": false}
        }"#;

        let event = parse_envelope(payload).unwrap();
        assert_eq!(event.symbol(), "XRPUSDT");
    }
}
