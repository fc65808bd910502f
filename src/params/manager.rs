//! Runtime configuration manager
//!
//! Resolution priority, highest first: fresh cache entry, store
//! symbol-specific config, store global config, environment variables,
//! compiled defaults. `get` never errors; writes require the store.

use super::defaults::{
    env_parameters, parameter_schemas, strategy_defaults, strategy_metadata,
    validate_parameters, STRATEGY_IDS,
};
use super::store::{ConfigStore, StoreError, StoredConfig};
use super::types::{
    AuditAction, ConfigSource, ParamMap, ResolvedConfig, StrategyConfig,
    StrategyConfigAudit,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Configuration write failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("validation failed")]
    Validation(Vec<String>),
    #[error("configuration store unavailable")]
    Unavailable,
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Strategy listing entry
#[derive(Debug, Clone, Serialize)]
pub struct StrategyInfo {
    pub strategy_id: String,
    pub name: String,
    pub description: String,
    pub has_global_config: bool,
    pub symbol_overrides: Vec<String>,
    pub parameter_count: usize,
}

type CacheEntry = (ResolvedConfig, Instant);

/// Priority-resolved strategy parameter store
pub struct ConfigManager {
    store: Option<Arc<dyn ConfigStore>>,
    cache: Mutex<HashMap<String, CacheEntry>>,
    cache_ttl: Duration,
}

impl ConfigManager {
    pub fn new(store: Option<Arc<dyn ConfigStore>>, cache_ttl: Duration) -> Self {
        if store.is_none() {
            tracing::warn!(
                "Configuration manager running without a store (env + defaults only)"
            );
        }
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
            cache_ttl,
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    fn cache_key(strategy_id: &str, symbol: Option<&str>) -> String {
        format!("{}:{}", strategy_id, symbol.unwrap_or("global"))
    }

    fn cache_get(&self, key: &str) -> Option<ResolvedConfig> {
        let cache = self.cache.lock().expect("config cache poisoned");
        cache.get(key).and_then(|(config, stored_at)| {
            (stored_at.elapsed() < self.cache_ttl).then(|| config.clone())
        })
    }

    fn cache_put(&self, key: String, config: ResolvedConfig) {
        let mut cache = self.cache.lock().expect("config cache poisoned");
        cache.insert(key, (config, Instant::now()));
    }

    fn cache_invalidate(&self, strategy_id: &str, symbol: Option<&str>) {
        let key = Self::cache_key(strategy_id, symbol);
        let mut cache = self.cache.lock().expect("config cache poisoned");
        cache.remove(&key);
        // A global change shadows every symbol resolution for the
        // strategy that fell through to it
        if symbol.is_none() {
            let prefix = format!("{strategy_id}:");
            cache.retain(|k, _| !k.starts_with(&prefix));
        }
    }

    /// Resolve parameters for a strategy, falling through the priority
    /// chain. Never errors; store failures degrade to env/defaults.
    pub async fn get(&self, strategy_id: &str, symbol: Option<&str>) -> ResolvedConfig {
        let key = Self::cache_key(strategy_id, symbol);
        if let Some(cached) = self.cache_get(&key) {
            return cached;
        }

        if let Some(store) = &self.store {
            if let Some(symbol) = symbol {
                match store.get(strategy_id, Some(symbol)).await {
                    Ok(Some(stored)) => {
                        let resolved = ResolvedConfig {
                            parameters: stored.parameters,
                            version: stored.version,
                            source: ConfigSource::DbSymbol,
                            is_override: true,
                        };
                        self.cache_put(key, resolved.clone());
                        return resolved;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(strategy = %strategy_id, error = %e,
                            "Store read failed, falling through");
                    }
                }
            }

            match store.get(strategy_id, None).await {
                Ok(Some(stored)) => {
                    let resolved = ResolvedConfig {
                        parameters: stored.parameters,
                        version: stored.version,
                        source: ConfigSource::DbGlobal,
                        is_override: false,
                    };
                    self.cache_put(key, resolved.clone());
                    return resolved;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(strategy = %strategy_id, error = %e,
                        "Store read failed, falling through");
                }
            }
        }

        if let Some(parameters) = env_parameters(strategy_id) {
            let resolved = ResolvedConfig {
                parameters,
                version: 0,
                source: ConfigSource::Env,
                is_override: false,
            };
            self.cache_put(key, resolved.clone());
            return resolved;
        }

        let resolved = ResolvedConfig {
            parameters: strategy_defaults(strategy_id),
            version: 0,
            source: ConfigSource::Default,
            is_override: false,
        };
        self.cache_put(key, resolved.clone());
        resolved
    }

    /// Persist a configuration after schema validation.
    ///
    /// Returns the saved record, or None for a validate-only call.
    /// Every successful save appends exactly one audit record and
    /// invalidates the affected cache keys.
    pub async fn set(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        parameters: ParamMap,
        changed_by: &str,
        reason: Option<String>,
        validate_only: bool,
    ) -> Result<Option<StrategyConfig>, ConfigError> {
        let errors = validate_parameters(strategy_id, &parameters);
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }
        if validate_only {
            return Ok(None);
        }

        let store = self.store.as_ref().ok_or(ConfigError::Unavailable)?;
        let existing = store.get(strategy_id, symbol).await?;
        let version = existing.as_ref().map(|c| c.version + 1).unwrap_or(1);
        let now = Utc::now();

        let stored = StoredConfig {
            parameters: parameters.clone(),
            version,
            updated_at: now,
            updated_by: changed_by.to_string(),
        };
        store.upsert(strategy_id, symbol, &stored).await?;

        let action = if existing.is_some() {
            AuditAction::Update
        } else {
            AuditAction::Create
        };
        store
            .append_audit(&StrategyConfigAudit {
                id: None,
                strategy_id: strategy_id.to_string(),
                symbol: symbol.map(str::to_string),
                action,
                old_parameters: existing.map(|c| c.parameters),
                new_parameters: Some(parameters.clone()),
                version: Some(version),
                changed_by: changed_by.to_string(),
                changed_at: now,
                reason,
            })
            .await?;

        self.cache_invalidate(strategy_id, symbol);

        tracing::info!(
            strategy = %strategy_id,
            symbol = symbol.unwrap_or("global"),
            version,
            changed_by,
            "Configuration updated"
        );

        Ok(Some(StrategyConfig {
            strategy_id: strategy_id.to_string(),
            symbol: symbol.map(str::to_string),
            parameters,
            version,
            updated_at: now,
            updated_by: changed_by.to_string(),
            source: if symbol.is_some() {
                ConfigSource::DbSymbol
            } else {
                ConfigSource::DbGlobal
            },
        }))
    }

    /// Delete a configuration, auditing the removal
    pub async fn delete(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        changed_by: &str,
        reason: Option<String>,
    ) -> Result<(), ConfigError> {
        let store = self.store.as_ref().ok_or(ConfigError::Unavailable)?;
        let existing = store.get(strategy_id, symbol).await?;
        let deleted = store.delete(strategy_id, symbol).await?;
        if !deleted {
            return Err(ConfigError::NotFound(format!(
                "no configuration for {strategy_id} ({})",
                symbol.unwrap_or("global")
            )));
        }

        store
            .append_audit(&StrategyConfigAudit {
                id: None,
                strategy_id: strategy_id.to_string(),
                symbol: symbol.map(str::to_string),
                action: AuditAction::Delete,
                old_parameters: existing.map(|c| c.parameters),
                new_parameters: None,
                version: None,
                changed_by: changed_by.to_string(),
                changed_at: Utc::now(),
                reason,
            })
            .await?;

        self.cache_invalidate(strategy_id, symbol);

        tracing::info!(
            strategy = %strategy_id,
            symbol = symbol.unwrap_or("global"),
            changed_by,
            "Configuration deleted"
        );
        Ok(())
    }

    /// Restore a previous parameter set from the audit trail.
    ///
    /// With a target version, restores exactly that version; otherwise
    /// the set in effect before the most recent change.
    pub async fn rollback(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        target_version: Option<i64>,
        changed_by: &str,
        reason: Option<String>,
    ) -> Result<StrategyConfig, ConfigError> {
        let store = self.store.as_ref().ok_or(ConfigError::Unavailable)?;

        let parameters = match target_version {
            Some(version) => store
                .audit_trail(strategy_id, symbol, 1000)
                .await?
                .into_iter()
                .find(|a| a.version == Some(version))
                .and_then(|a| a.new_parameters)
                .ok_or_else(|| {
                    ConfigError::NotFound(format!(
                        "version {version} not found for {strategy_id}"
                    ))
                })?,
            None => {
                let trail = store.audit_trail(strategy_id, symbol, 2).await?;
                let latest = trail.first().ok_or_else(|| {
                    ConfigError::NotFound(format!("no history for {strategy_id}"))
                })?;
                if latest.action == AuditAction::Update {
                    latest.old_parameters.clone()
                } else {
                    trail.get(1).and_then(|a| a.new_parameters.clone())
                }
                .ok_or_else(|| {
                    ConfigError::NotFound(format!(
                        "no previous configuration for {strategy_id}"
                    ))
                })?
            }
        };

        let rollback_reason = reason.unwrap_or_else(|| match target_version {
            Some(v) => format!("Rollback to version {v}"),
            None => "Rollback to previous configuration".to_string(),
        });

        let saved = self
            .set(
                strategy_id,
                symbol,
                parameters,
                changed_by,
                Some(rollback_reason),
                false,
            )
            .await?;
        saved.ok_or(ConfigError::Unavailable)
    }

    /// Enumerate registered strategies with their override status
    pub async fn list_strategies(&self) -> Vec<StrategyInfo> {
        let mut result = Vec::with_capacity(STRATEGY_IDS.len());
        for strategy_id in STRATEGY_IDS {
            let (name, description) = strategy_metadata(strategy_id);
            let mut has_global = false;
            let mut overrides = Vec::new();
            if let Some(store) = &self.store {
                has_global = matches!(store.get(strategy_id, None).await, Ok(Some(_)));
                overrides = store
                    .symbol_overrides(strategy_id)
                    .await
                    .unwrap_or_default();
            }
            result.push(StrategyInfo {
                strategy_id: strategy_id.to_string(),
                name: name.to_string(),
                description: description.to_string(),
                has_global_config: has_global,
                symbol_overrides: overrides,
                parameter_count: parameter_schemas(strategy_id).len(),
            });
        }
        result
    }

    /// Paginated change history, most recent first. Empty when the
    /// store is unreachable.
    pub async fn audit(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        limit: i64,
    ) -> Vec<StrategyConfigAudit> {
        let Some(store) = &self.store else {
            return Vec::new();
        };
        match store.audit_trail(strategy_id, symbol, limit).await {
            Ok(trail) => trail,
            Err(e) => {
                tracing::warn!(strategy = %strategy_id, error = %e, "Audit read failed");
                Vec::new()
            }
        }
    }

    /// Force cache invalidation for every key
    pub fn refresh(&self) {
        self.cache.lock().expect("config cache poisoned").clear();
        tracing::info!("Configuration cache cleared");
    }

    /// Periodic sweep dropping expired cache entries
    pub fn spawn_cache_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.cache_ttl);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let mut cache = manager.cache.lock().expect("config cache poisoned");
                let before = cache.len();
                cache.retain(|_, (_, stored_at)| stored_at.elapsed() < manager.cache_ttl);
                let dropped = before - cache.len();
                drop(cache);
                if dropped > 0 {
                    tracing::debug!(dropped, "Expired configuration cache entries");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::store::MemoryStore;
    use crate::params::types::ParamValue;

    fn manager_with_store() -> (Arc<MemoryStore>, ConfigManager) {
        let store = Arc::new(MemoryStore::new());
        let manager = ConfigManager::new(
            Some(store.clone() as Arc<dyn ConfigStore>),
            Duration::from_secs(60),
        );
        (store, manager)
    }

    fn params(threshold: f64) -> ParamMap {
        let mut map = ParamMap::new();
        map.insert("buy_threshold".to_string(), ParamValue::Float(threshold));
        map
    }

    #[tokio::test]
    async fn test_get_falls_to_defaults() {
        let manager = ConfigManager::new(None, Duration::from_secs(60));
        let resolved = manager.get("orderbook_skew", None).await;
        assert_eq!(resolved.source, ConfigSource::Default);
        assert_eq!(resolved.f64("buy_threshold"), Some(1.2));
        assert_eq!(resolved.version, 0);
        assert!(!resolved.is_override);
    }

    #[tokio::test]
    async fn test_global_beats_defaults_and_symbol_beats_global() {
        let (_, manager) = manager_with_store();

        manager
            .set("orderbook_skew", None, params(1.3), "test", None, false)
            .await
            .unwrap();
        let resolved = manager.get("orderbook_skew", Some("BTCUSDT")).await;
        assert_eq!(resolved.source, ConfigSource::DbGlobal);
        assert_eq!(resolved.f64("buy_threshold"), Some(1.3));

        manager
            .set(
                "orderbook_skew",
                Some("BTCUSDT"),
                params(1.5),
                "test",
                None,
                false,
            )
            .await
            .unwrap();
        let resolved = manager.get("orderbook_skew", Some("BTCUSDT")).await;
        assert_eq!(resolved.source, ConfigSource::DbSymbol);
        assert!(resolved.is_override);
        assert_eq!(resolved.f64("buy_threshold"), Some(1.5));

        // Other symbols still resolve from the global record
        let other = manager.get("orderbook_skew", Some("ETHUSDT")).await;
        assert_eq!(other.source, ConfigSource::DbGlobal);
    }

    #[tokio::test]
    async fn test_env_beats_defaults() {
        std::env::set_var("SPREAD_LIQUIDITY_BASE_CONFIDENCE", "0.8");
        let manager = ConfigManager::new(None, Duration::from_secs(60));
        let resolved = manager.get("spread_liquidity", None).await;
        assert_eq!(resolved.source, ConfigSource::Env);
        assert_eq!(resolved.f64("base_confidence"), Some(0.8));
        std::env::remove_var("SPREAD_LIQUIDITY_BASE_CONFIDENCE");
    }

    #[tokio::test]
    async fn test_set_validates() {
        let (_, manager) = manager_with_store();
        let mut bad = ParamMap::new();
        bad.insert("buy_threshold".to_string(), ParamValue::Float(99.0));

        let err = manager
            .set("orderbook_skew", None, bad, "test", None, false)
            .await
            .unwrap_err();
        let ConfigError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 1);
    }

    #[tokio::test]
    async fn test_validate_only_writes_nothing() {
        let (store, manager) = manager_with_store();
        let saved = manager
            .set("orderbook_skew", None, params(1.4), "test", None, true)
            .await
            .unwrap();
        assert!(saved.is_none());
        assert_eq!(store.audit_len().await, 0);
        assert!(store.get("orderbook_skew", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_bumps_version_and_audits_once() {
        let (store, manager) = manager_with_store();

        let first = manager
            .set("orderbook_skew", None, params(1.3), "alice", None, false)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(store.audit_len().await, 1);

        let second = manager
            .set(
                "orderbook_skew",
                None,
                params(1.4),
                "bob",
                Some("tighter".to_string()),
                false,
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(store.audit_len().await, 2);

        let trail = manager.audit("orderbook_skew", None, 10).await;
        assert_eq!(trail[0].action, AuditAction::Update);
        assert_eq!(trail[0].changed_by, "bob");
        assert_eq!(trail[1].action, AuditAction::Create);
        assert!(trail[0].changed_at >= trail[1].changed_at);
    }

    #[tokio::test]
    async fn test_delete_audits_and_falls_back() {
        let (store, manager) = manager_with_store();
        manager
            .set("orderbook_skew", None, params(1.3), "test", None, false)
            .await
            .unwrap();

        manager
            .delete("orderbook_skew", None, "test", None)
            .await
            .unwrap();
        assert_eq!(store.audit_len().await, 2);

        let resolved = manager.get("orderbook_skew", None).await;
        assert_eq!(resolved.source, ConfigSource::Default);

        // Deleting again reports not found
        assert!(matches!(
            manager.delete("orderbook_skew", None, "test", None).await,
            Err(ConfigError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_writes_without_store_are_transient_errors() {
        let manager = ConfigManager::new(None, Duration::from_secs(60));
        assert!(matches!(
            manager
                .set("orderbook_skew", None, params(1.3), "test", None, false)
                .await,
            Err(ConfigError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_reads_degrade_when_store_down() {
        let (store, manager) = manager_with_store();
        store.set_available(false).await;
        let resolved = manager.get("orderbook_skew", None).await;
        assert_eq!(resolved.source, ConfigSource::Default);
    }

    #[tokio::test]
    async fn test_rollback_to_previous() {
        let (_, manager) = manager_with_store();
        manager
            .set("orderbook_skew", None, params(1.3), "test", None, false)
            .await
            .unwrap();
        manager
            .set("orderbook_skew", None, params(1.6), "test", None, false)
            .await
            .unwrap();

        let restored = manager
            .rollback("orderbook_skew", None, None, "ops", None)
            .await
            .unwrap();
        assert_eq!(restored.version, 3);
        assert_eq!(
            restored.parameters.get("buy_threshold"),
            Some(&ParamValue::Float(1.3))
        );
    }

    #[tokio::test]
    async fn test_rollback_to_version() {
        let (_, manager) = manager_with_store();
        for threshold in [1.3, 1.4, 1.5] {
            manager
                .set("orderbook_skew", None, params(threshold), "test", None, false)
                .await
                .unwrap();
        }

        let restored = manager
            .rollback("orderbook_skew", None, Some(1), "ops", None)
            .await
            .unwrap();
        assert_eq!(
            restored.parameters.get("buy_threshold"),
            Some(&ParamValue::Float(1.3))
        );

        assert!(matches!(
            manager
                .rollback("orderbook_skew", None, Some(99), "ops", None)
                .await,
            Err(ConfigError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_strategies() {
        let (_, manager) = manager_with_store();
        manager
            .set("orderbook_skew", None, params(1.3), "test", None, false)
            .await
            .unwrap();
        manager
            .set(
                "iceberg_detector",
                Some("BTCUSDT"),
                {
                    let mut map = ParamMap::new();
                    map.insert("min_refill_count".to_string(), ParamValue::Int(4));
                    map
                },
                "test",
                None,
                false,
            )
            .await
            .unwrap();

        let list = manager.list_strategies().await;
        assert_eq!(list.len(), STRATEGY_IDS.len());

        let skew = list.iter().find(|s| s.strategy_id == "orderbook_skew").unwrap();
        assert!(skew.has_global_config);
        assert!(skew.symbol_overrides.is_empty());

        let iceberg = list
            .iter()
            .find(|s| s.strategy_id == "iceberg_detector")
            .unwrap();
        assert!(!iceberg.has_global_config);
        assert_eq!(iceberg.symbol_overrides, vec!["BTCUSDT"]);
    }

    #[tokio::test]
    async fn test_cache_serves_until_invalidated() {
        let (store, manager) = manager_with_store();
        manager
            .set("orderbook_skew", None, params(1.3), "test", None, false)
            .await
            .unwrap();

        // Prime the cache, then take the store down: reads still serve
        let resolved = manager.get("orderbook_skew", None).await;
        assert_eq!(resolved.f64("buy_threshold"), Some(1.3));
        store.set_available(false).await;
        let cached = manager.get("orderbook_skew", None).await;
        assert_eq!(cached.f64("buy_threshold"), Some(1.3));

        // Explicit refresh drops the entry and the read now degrades
        manager.refresh();
        let degraded = manager.get("orderbook_skew", None).await;
        assert_eq!(degraded.source, ConfigSource::Default);
    }
}
