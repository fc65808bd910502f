//! Runtime strategy parameter management
//!
//! Per-strategy and per-symbol parameters resolve through a priority
//! chain (cache, store symbol override, store global, environment,
//! compiled defaults), validate against per-strategy schemas, and leave
//! an append-only audit trail.

pub mod defaults;
mod manager;
mod store;
mod types;

pub use manager::{ConfigError, ConfigManager, StrategyInfo};
pub use store::{ConfigStore, MemoryStore, MongoStore, StoreError, StoredConfig};
pub use types::{
    AuditAction, ConfigSource, ParamMap, ParamValue, ResolvedConfig, StrategyConfig,
    StrategyConfigAudit,
};
