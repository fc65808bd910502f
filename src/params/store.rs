//! Configuration persistence
//!
//! The [`ConfigStore`] trait abstracts the document store so the
//! manager can run against MongoDB in production and an in-process
//! store in tests and dry-run mode.

use super::types::{AuditAction, ParamMap, StrategyConfigAudit};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use mongodb::bson::{self, doc, Bson, Document};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

/// Document store failure
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("document store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),
    #[error("serialization failure: {0}")]
    Serialization(String),
}

/// A stored configuration document
#[derive(Debug, Clone, PartialEq)]
pub struct StoredConfig {
    pub parameters: ParamMap,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
}

/// Persistence operations used by the configuration manager
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the live config; `symbol` None addresses the global record
    async fn get(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
    ) -> Result<Option<StoredConfig>, StoreError>;

    async fn upsert(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        config: &StoredConfig,
    ) -> Result<(), StoreError>;

    /// Returns true when a record existed and was removed
    async fn delete(&self, strategy_id: &str, symbol: Option<&str>)
        -> Result<bool, StoreError>;

    async fn append_audit(&self, audit: &StrategyConfigAudit) -> Result<(), StoreError>;

    /// Most recent first
    async fn audit_trail(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        limit: i64,
    ) -> Result<Vec<StrategyConfigAudit>, StoreError>;

    /// Symbols with an override for this strategy
    async fn symbol_overrides(&self, strategy_id: &str) -> Result<Vec<String>, StoreError>;
}

// ---------------------------------------------------------------------
// MongoDB implementation
// ---------------------------------------------------------------------

const GLOBAL_COLLECTION: &str = "strategy_configs_global";
const SYMBOL_COLLECTION: &str = "strategy_configs_symbol";
const AUDIT_COLLECTION: &str = "strategy_config_audit";

/// MongoDB-backed configuration store
pub struct MongoStore {
    global: Collection<Document>,
    symbol: Collection<Document>,
    audit: Collection<Document>,
}

impl MongoStore {
    /// Connect and ensure indexes exist
    pub async fn connect(
        uri: &str,
        database: &str,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(uri).await?;
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);
        options.app_name = Some("realtime-strategies".to_string());

        let client = Client::with_options(options)?;
        let db = client.database(database);
        let store = Self {
            global: db.collection(GLOBAL_COLLECTION),
            symbol: db.collection(SYMBOL_COLLECTION),
            audit: db.collection(AUDIT_COLLECTION),
        };
        store.ensure_indexes().await?;
        tracing::info!(database = %database, "Connected to configuration store");
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique = IndexOptions::builder().unique(true).build();
        self.global
            .create_index(
                IndexModel::builder()
                    .keys(doc! {"strategy_id": 1})
                    .options(unique.clone())
                    .build(),
            )
            .await?;
        self.symbol
            .create_index(
                IndexModel::builder()
                    .keys(doc! {"strategy_id": 1, "symbol": 1})
                    .options(unique)
                    .build(),
            )
            .await?;
        self.audit
            .create_index(
                IndexModel::builder()
                    .keys(doc! {"strategy_id": 1, "symbol": 1, "changed_at": -1})
                    .build(),
            )
            .await?;
        Ok(())
    }

    fn collection_for(&self, symbol: Option<&str>) -> &Collection<Document> {
        if symbol.is_some() {
            &self.symbol
        } else {
            &self.global
        }
    }

    fn filter_for(strategy_id: &str, symbol: Option<&str>) -> Document {
        match symbol {
            Some(symbol) => doc! {"strategy_id": strategy_id, "symbol": symbol},
            None => doc! {"strategy_id": strategy_id},
        }
    }

    fn params_to_bson(parameters: &ParamMap) -> Result<Document, StoreError> {
        bson::to_document(parameters).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn params_from_bson(doc: &Document) -> Result<ParamMap, StoreError> {
        bson::from_bson(Bson::Document(doc.clone()))
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn config_from_doc(doc: &Document) -> Result<StoredConfig, StoreError> {
        let parameters = doc
            .get_document("parameters")
            .map_err(|e| StoreError::Serialization(e.to_string()))
            .and_then(Self::params_from_bson)?;
        let version = doc.get_i64("version").unwrap_or_else(|_| {
            doc.get_i32("version").map(i64::from).unwrap_or(1)
        });
        let updated_at = doc
            .get_datetime("updated_at")
            .map(|dt| dt.to_chrono())
            .unwrap_or_else(|_| Utc::now());
        let updated_by = doc.get_str("updated_by").unwrap_or("unknown").to_string();

        Ok(StoredConfig {
            parameters,
            version,
            updated_at,
            updated_by,
        })
    }

    fn audit_from_doc(doc: &Document) -> Result<StrategyConfigAudit, StoreError> {
        let action = match doc.get_str("action").unwrap_or("UPDATE") {
            "CREATE" => AuditAction::Create,
            "DELETE" => AuditAction::Delete,
            _ => AuditAction::Update,
        };
        let params_at = |field: &str| -> Option<ParamMap> {
            doc.get_document(field)
                .ok()
                .and_then(|d| Self::params_from_bson(d).ok())
        };

        Ok(StrategyConfigAudit {
            id: doc.get_object_id("_id").ok().map(|id| id.to_hex()),
            strategy_id: doc.get_str("strategy_id").unwrap_or_default().to_string(),
            symbol: doc.get_str("symbol").ok().map(str::to_string),
            action,
            old_parameters: params_at("old_parameters"),
            new_parameters: params_at("new_parameters"),
            version: doc.get_i64("version").ok(),
            changed_by: doc.get_str("changed_by").unwrap_or_default().to_string(),
            changed_at: doc
                .get_datetime("changed_at")
                .map(|dt| dt.to_chrono())
                .unwrap_or_else(|_| Utc::now()),
            reason: doc.get_str("reason").ok().map(str::to_string),
        })
    }
}

#[async_trait]
impl ConfigStore for MongoStore {
    async fn get(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
    ) -> Result<Option<StoredConfig>, StoreError> {
        let found = self
            .collection_for(symbol)
            .find_one(Self::filter_for(strategy_id, symbol))
            .await?;
        found.as_ref().map(Self::config_from_doc).transpose()
    }

    async fn upsert(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        config: &StoredConfig,
    ) -> Result<(), StoreError> {
        let mut set = doc! {
            "strategy_id": strategy_id,
            "parameters": Self::params_to_bson(&config.parameters)?,
            "version": config.version,
            "updated_at": bson::DateTime::from_chrono(config.updated_at),
            "updated_by": &config.updated_by,
        };
        if let Some(symbol) = symbol {
            set.insert("symbol", symbol);
        }

        self.collection_for(symbol)
            .update_one(Self::filter_for(strategy_id, symbol), doc! {"$set": set})
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn delete(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = self
            .collection_for(symbol)
            .delete_one(Self::filter_for(strategy_id, symbol))
            .await?;
        Ok(result.deleted_count > 0)
    }

    async fn append_audit(&self, audit: &StrategyConfigAudit) -> Result<(), StoreError> {
        let mut doc = doc! {
            "strategy_id": &audit.strategy_id,
            "action": audit.action.as_str(),
            "changed_by": &audit.changed_by,
            "changed_at": bson::DateTime::from_chrono(audit.changed_at),
        };
        if let Some(symbol) = &audit.symbol {
            doc.insert("symbol", symbol);
        }
        if let Some(old) = &audit.old_parameters {
            doc.insert("old_parameters", Self::params_to_bson(old)?);
        }
        if let Some(new) = &audit.new_parameters {
            doc.insert("new_parameters", Self::params_to_bson(new)?);
        }
        if let Some(version) = audit.version {
            doc.insert("version", version);
        }
        if let Some(reason) = &audit.reason {
            doc.insert("reason", reason);
        }

        self.audit.insert_one(doc).await?;
        Ok(())
    }

    async fn audit_trail(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        limit: i64,
    ) -> Result<Vec<StrategyConfigAudit>, StoreError> {
        let mut filter = doc! {"strategy_id": strategy_id};
        if let Some(symbol) = symbol {
            filter.insert("symbol", symbol);
        }

        let docs: Vec<Document> = self
            .audit
            .find(filter)
            .sort(doc! {"changed_at": -1})
            .limit(limit)
            .await?
            .try_collect()
            .await?;

        docs.iter().map(Self::audit_from_doc).collect()
    }

    async fn symbol_overrides(&self, strategy_id: &str) -> Result<Vec<String>, StoreError> {
        let values = self
            .symbol
            .distinct("symbol", doc! {"strategy_id": strategy_id})
            .await?;
        Ok(values
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect())
    }
}

// ---------------------------------------------------------------------
// In-process implementation
// ---------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    configs: HashMap<(String, Option<String>), StoredConfig>,
    audit: Vec<StrategyConfigAudit>,
    available: bool,
}

/// In-process configuration store for tests and dry-run mode
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner {
                available: true,
                ..MemoryInner::default()
            }),
        }
    }

    /// Simulate store outage
    pub async fn set_available(&self, available: bool) {
        self.inner.lock().await.available = available;
    }

    pub async fn audit_len(&self) -> usize {
        self.inner.lock().await.audit.len()
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
    ) -> Result<Option<StoredConfig>, StoreError> {
        let inner = self.inner.lock().await;
        if !inner.available {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        let key = (strategy_id.to_string(), symbol.map(str::to_string));
        Ok(inner.configs.get(&key).cloned())
    }

    async fn upsert(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        config: &StoredConfig,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.available {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        let key = (strategy_id.to_string(), symbol.map(str::to_string));
        inner.configs.insert(key, config.clone());
        Ok(())
    }

    async fn delete(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.available {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        let key = (strategy_id.to_string(), symbol.map(str::to_string));
        Ok(inner.configs.remove(&key).is_some())
    }

    async fn append_audit(&self, audit: &StrategyConfigAudit) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        if !inner.available {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        let mut record = audit.clone();
        record.id = Some(format!("audit-{}", inner.audit.len() + 1));
        inner.audit.push(record);
        Ok(())
    }

    async fn audit_trail(
        &self,
        strategy_id: &str,
        symbol: Option<&str>,
        limit: i64,
    ) -> Result<Vec<StrategyConfigAudit>, StoreError> {
        let inner = self.inner.lock().await;
        if !inner.available {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        let mut records: Vec<StrategyConfigAudit> = inner
            .audit
            .iter()
            .filter(|a| {
                a.strategy_id == strategy_id
                    && (symbol.is_none() || a.symbol.as_deref() == symbol)
            })
            .cloned()
            .collect();
        records.reverse();
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn symbol_overrides(&self, strategy_id: &str) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().await;
        if !inner.available {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        let mut symbols: Vec<String> = inner
            .configs
            .keys()
            .filter(|(id, symbol)| id == strategy_id && symbol.is_some())
            .filter_map(|(_, symbol)| symbol.clone())
            .collect();
        symbols.sort();
        Ok(symbols)
    }
}
