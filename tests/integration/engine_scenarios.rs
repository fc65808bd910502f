//! End-to-end dispatch scenarios: bus payload in, wire signal out

use realtime_strategies::bus::{validate_signal, ChannelSink};
use realtime_strategies::config::Config;
use realtime_strategies::depth::DepthAnalyzer;
use realtime_strategies::engine::Engine;
use realtime_strategies::params::{ConfigManager, ConfigStore, MemoryStore, ParamValue};
use realtime_strategies::signal::TradeSignal;
use realtime_strategies::telemetry::Metrics;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::RwLock;

fn test_config() -> Config {
    toml::from_str(realtime_strategies::config::DEFAULT_CONFIG).unwrap()
}

struct Harness {
    engine: Engine,
    rx: UnboundedReceiver<TradeSignal>,
    manager: Arc<ConfigManager>,
    analyzer: Arc<RwLock<DepthAnalyzer>>,
    metrics: Arc<Metrics>,
}

fn harness(store: Option<Arc<MemoryStore>>) -> Harness {
    let (sink, rx) = ChannelSink::new();
    let config = test_config();
    let manager = Arc::new(ConfigManager::new(
        store.map(|s| s as Arc<dyn ConfigStore>),
        Duration::from_secs(60),
    ));
    let analyzer = Arc::new(RwLock::new(DepthAnalyzer::new()));
    let metrics = Arc::new(Metrics::new());
    let engine = Engine::new(
        &config,
        analyzer.clone(),
        manager.clone(),
        Arc::new(sink),
        metrics.clone(),
    );
    Harness {
        engine,
        rx,
        manager,
        analyzer,
        metrics,
    }
}

fn skewed_depth_payload(best_ask: &str) -> Vec<u8> {
    serde_json::json!({
        "stream": "btcusdt@depth20@100ms",
        "data": {
            "lastUpdateId": 42,
            "E": 1704067200000u64,
            "bids": [["50000", "3"], ["49999", "2"], ["49998", "1"],
                     ["49997", "1"], ["49996", "1"]],
            "asks": [[best_ask, "0.5"], ["50102", "0.4"], ["50103", "0.3"],
                     ["50104", "0.2"], ["50105", "0.1"]]
        }
    })
    .to_string()
    .into_bytes()
}

/// A bid-skewed book with a tight spread produces one BUY
/// signal on the wire contract
#[tokio::test]
async fn test_orderbook_skew_buy_end_to_end() {
    let mut h = harness(None);
    h.engine.dispatch(&skewed_depth_payload("50001")).await;

    let wire = h.rx.recv().await.expect("one signal");
    assert_eq!(wire.action, "buy");
    assert_eq!(wire.signal_type, "buy");
    assert_eq!(wire.symbol, "BTCUSDT");
    assert_eq!(wire.strategy_id, "orderbook_skew_BTCUSDT");
    assert_eq!(wire.strategy, "orderbook_skew");
    assert_eq!(wire.source, "realtime-strategies");
    assert_eq!(wire.price, dec!(50000));
    assert_eq!(wire.confidence, 0.95);
    assert_eq!(wire.strength, "extreme");
    // Confidence 0.95 is in the >= 0.8 risk band: SL 2%, TP 5%
    assert_eq!(wire.stop_loss, Some(dec!(49000)));
    assert_eq!(wire.take_profit, Some(dec!(52500)));
    assert!(validate_signal(&wire).is_ok());

    // No further signal for this event from the skew strategy
    assert!(h.rx.try_recv().is_err());
}

/// The same bids with a wide spread are suppressed
#[tokio::test]
async fn test_orderbook_skew_spread_guard_end_to_end() {
    let mut h = harness(None);
    // spread = 100 / 50000 * 100 = 0.2% > 0.1%
    h.engine.dispatch(&skewed_depth_payload("50100")).await;
    assert!(h.rx.try_recv().is_err());
    assert_eq!(h.metrics.counter_total("messages_processed_total"), 1);
}

/// Universal invariants over a stream of mixed events: at most one
/// signal per strategy per event, confidence in [0, 1], positive
/// price, strength band consistent, SL/TP bracket the price
#[tokio::test]
async fn test_signal_invariants_over_mixed_stream() {
    let mut h = harness(None);
    let strategies = h.engine.strategy_count();

    let payloads: Vec<Vec<u8>> = vec![
        skewed_depth_payload("50001"),
        serde_json::json!({
            "stream": "btcusdt@trade",
            "data": {"t": 1, "p": "50000", "q": "5", "T": 1704067200000u64, "m": false}
        })
        .to_string()
        .into_bytes(),
        serde_json::json!({
            "stream": "btcusdt@ticker",
            "data": {"c": "50000", "v": "1000", "P": "1.0"}
        })
        .to_string()
        .into_bytes(),
        skewed_depth_payload("50001"),
    ];

    for payload in &payloads {
        let before = h.metrics.counter_total("signals_generated_total");
        h.engine.dispatch(payload).await;
        let emitted = h.metrics.counter_total("signals_generated_total") - before;
        assert!(emitted as usize <= strategies);
    }

    while let Ok(wire) = h.rx.try_recv() {
        assert!((0.0..=1.0).contains(&wire.confidence));
        assert!(wire.price > dec!(0));

        let expected_strength = if wire.confidence >= 0.9 {
            "extreme"
        } else if wire.confidence >= 0.7 {
            "strong"
        } else if wire.confidence >= 0.5 {
            "medium"
        } else {
            "weak"
        };
        assert_eq!(wire.strength, expected_strength);

        if wire.action == "buy" || wire.action == "sell" {
            let (sl, tp) = (wire.stop_loss, wire.take_profit);
            assert_eq!(sl.is_some(), tp.is_some());
            if let (Some(sl), Some(tp)) = (sl, tp) {
                if wire.action == "buy" {
                    assert!(sl < wire.price && wire.price < tp);
                } else {
                    assert!(tp < wire.price && wire.price < sl);
                }
            }
        }
        assert!(validate_signal(&wire).is_ok());
    }
}

/// A symbol-specific override changes strategy behavior after the
/// cache is refreshed, and its provenance lands in the signal metadata
#[tokio::test]
async fn test_symbol_override_propagates_to_strategy() {
    let _env = crate::ENV_LOCK.lock().unwrap();
    let store = Arc::new(MemoryStore::new());
    let mut h = harness(Some(store));

    // Raise the buy threshold above the book's ratio for BTCUSDT only
    let mut params = realtime_strategies::params::ParamMap::new();
    params.insert("buy_threshold".to_string(), ParamValue::Float(9.0));
    h.manager
        .set(
            "orderbook_skew",
            Some("BTCUSDT"),
            params,
            "test",
            None,
            false,
        )
        .await
        .unwrap();

    // ratio = 8 / 1.5 = 5.33 < 9: suppressed under the override
    h.engine.dispatch(&skewed_depth_payload("50001")).await;
    assert!(h.rx.try_recv().is_err());

    // Remove the override; the default threshold applies again
    h.manager
        .delete("orderbook_skew", Some("BTCUSDT"), "test", None)
        .await
        .unwrap();
    h.engine.dispatch(&skewed_depth_payload("50001")).await;

    let wire = h.rx.recv().await.expect("signal after override removal");
    assert_eq!(wire.action, "buy");
    assert_eq!(wire.metadata.get("config_source").unwrap(), "default");
}

/// Depth events populate the analyzer queried by the API layer
#[tokio::test]
async fn test_depth_metrics_available_after_dispatch() {
    let mut h = harness(None);
    h.engine.dispatch(&skewed_depth_payload("50001")).await;

    let analyzer = h.analyzer.read().await;
    let metrics = analyzer.current("BTCUSDT").expect("metrics");
    assert_eq!(metrics.bid_volume, 8.0);
    assert_eq!(metrics.ask_volume, 1.5);
    assert!(metrics.net_pressure > 0.0);
    assert_eq!(analyzer.pressure_samples("BTCUSDT"), 1);
}

/// Re-adapting a published signal
/// reproduces it modulo identifiers
#[tokio::test]
async fn test_adapter_idempotence_on_published_signal() {
    use realtime_strategies::signal::SignalAdapter;

    let mut h = harness(None);
    h.engine.dispatch(&skewed_depth_payload("50001")).await;
    let first = h.rx.recv().await.expect("signal");

    let adapter = SignalAdapter::new();
    let (signal, provenance) = adapter.internalize(&first).expect("internalize");
    let second = adapter.adapt(&signal, &provenance);

    assert_eq!(second.action, first.action);
    assert_eq!(second.confidence, first.confidence);
    assert_eq!(second.strength, first.strength);
    assert_eq!(second.price, first.price);
    assert_eq!(second.quantity, first.quantity);
    assert_eq!(second.stop_loss, first.stop_loss);
    assert_eq!(second.take_profit, first.take_profit);
    assert_eq!(second.metadata, first.metadata);
    assert_ne!(second.signal_id, first.signal_id);
}
