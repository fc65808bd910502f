//! Configuration resolution fallthrough across the full priority chain

use realtime_strategies::params::{
    ConfigManager, ConfigSource, ConfigStore, MemoryStore, ParamMap, ParamValue,
};
use std::sync::Arc;
use std::time::Duration;

const ENV_VAR: &str = "ORDERBOOK_SKEW_BUY_THRESHOLD";

fn params(threshold: f64) -> ParamMap {
    let mut map = ParamMap::new();
    map.insert("buy_threshold".to_string(), ParamValue::Float(threshold));
    map
}

/// Symbol override beats global beats environment beats the
/// compiled default, and each deletion falls through one layer
#[tokio::test]
async fn test_resolution_fallthrough() {
    let _env = crate::ENV_LOCK.lock().unwrap();
    std::env::set_var(ENV_VAR, "1.25");

    let store = Arc::new(MemoryStore::new());
    let manager = ConfigManager::new(
        Some(store.clone() as Arc<dyn ConfigStore>),
        Duration::from_secs(60),
    );

    // Global config in the store wins over the environment
    manager
        .set("orderbook_skew", None, params(1.3), "admin", None, false)
        .await
        .unwrap();
    let resolved = manager.get("orderbook_skew", Some("BTCUSDT")).await;
    assert_eq!(resolved.f64("buy_threshold"), Some(1.3));
    assert_eq!(resolved.source, ConfigSource::DbGlobal);
    assert!(!resolved.is_override);

    // Symbol override wins over the global record
    manager
        .set(
            "orderbook_skew",
            Some("BTCUSDT"),
            params(1.5),
            "admin",
            Some("experiment".to_string()),
            false,
        )
        .await
        .unwrap();
    manager.refresh();
    let resolved = manager.get("orderbook_skew", Some("BTCUSDT")).await;
    assert_eq!(resolved.f64("buy_threshold"), Some(1.5));
    assert_eq!(resolved.source, ConfigSource::DbSymbol);
    assert!(resolved.is_override);

    // Deleting the override falls back to the global record
    manager
        .delete("orderbook_skew", Some("BTCUSDT"), "admin", None)
        .await
        .unwrap();
    let resolved = manager.get("orderbook_skew", Some("BTCUSDT")).await;
    assert_eq!(resolved.f64("buy_threshold"), Some(1.3));
    assert_eq!(resolved.source, ConfigSource::DbGlobal);

    // Deleting the global record falls back to the environment
    manager
        .delete("orderbook_skew", None, "admin", None)
        .await
        .unwrap();
    let resolved = manager.get("orderbook_skew", Some("BTCUSDT")).await;
    assert_eq!(resolved.f64("buy_threshold"), Some(1.25));
    assert_eq!(resolved.source, ConfigSource::Env);

    // Unsetting the environment falls back to the compiled default
    std::env::remove_var(ENV_VAR);
    manager.refresh();
    let resolved = manager.get("orderbook_skew", Some("BTCUSDT")).await;
    assert_eq!(resolved.f64("buy_threshold"), Some(1.2));
    assert_eq!(resolved.source, ConfigSource::Default);

    // Every mutation left exactly one audit record
    assert_eq!(store.audit_len().await, 4);
}

/// Audit trail pages most-recent-first with monotonic timestamps
#[tokio::test]
async fn test_audit_trail_pagination() {
    let store = Arc::new(MemoryStore::new());
    let manager = ConfigManager::new(
        Some(store as Arc<dyn ConfigStore>),
        Duration::from_secs(60),
    );

    for threshold in [1.3, 1.4, 1.5, 1.6] {
        manager
            .set(
                "iceberg_detector",
                None,
                {
                    let mut map = ParamMap::new();
                    map.insert(
                        "level_proximity_pct".to_string(),
                        ParamValue::Float(threshold),
                    );
                    map
                },
                "admin",
                None,
                false,
            )
            .await
            .unwrap();
    }

    let page = manager.audit("iceberg_detector", None, 2).await;
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].version, Some(4));
    assert_eq!(page[1].version, Some(3));
    assert!(page[0].changed_at >= page[1].changed_at);

    let all = manager.audit("iceberg_detector", None, 100).await;
    assert_eq!(all.len(), 4);
}
