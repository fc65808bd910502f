//! Configuration data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scalar strategy parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    /// Numeric view; integers widen to floats
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "bool",
            ParamValue::Int(_) => "int",
            ParamValue::Float(_) => "float",
            ParamValue::Str(_) => "string",
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

/// Parameter name to value map
pub type ParamMap = BTreeMap<String, ParamValue>;

/// Where a resolved configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigSource {
    Default,
    Env,
    DbGlobal,
    DbSymbol,
}

impl ConfigSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigSource::Default => "default",
            ConfigSource::Env => "env",
            ConfigSource::DbGlobal => "db-global",
            ConfigSource::DbSymbol => "db-symbol",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(ConfigSource::Default),
            "env" => Some(ConfigSource::Env),
            "db-global" => Some(ConfigSource::DbGlobal),
            "db-symbol" => Some(ConfigSource::DbSymbol),
            _ => None,
        }
    }
}

/// A resolved configuration as handed to strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConfig {
    pub parameters: ParamMap,
    pub version: i64,
    pub source: ConfigSource,
    pub is_override: bool,
}

impl ResolvedConfig {
    pub fn f64(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).and_then(ParamValue::as_f64)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.parameters.get(name).and_then(ParamValue::as_i64)
    }

    pub fn usize(&self, name: &str) -> Option<usize> {
        self.i64(name).and_then(|v| usize::try_from(v).ok())
    }
}

/// A live strategy configuration record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub strategy_id: String,
    /// None for a global configuration
    pub symbol: Option<String>,
    pub parameters: ParamMap,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
    pub updated_by: String,
    pub source: ConfigSource,
}

/// Kind of configuration mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
        }
    }
}

/// Append-only audit record for a configuration change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfigAudit {
    #[serde(default)]
    pub id: Option<String>,
    pub strategy_id: String,
    pub symbol: Option<String>,
    pub action: AuditAction,
    pub old_parameters: Option<ParamMap>,
    pub new_parameters: Option<ParamMap>,
    /// Version the change produced (None for deletes)
    pub version: Option<i64>,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
    pub reason: Option<String>,
}
