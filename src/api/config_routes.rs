//! Strategy configuration endpoints

use super::{ApiResponse, AppState};
use crate::params::defaults::{parameter_schemas, strategy_defaults};
use crate::params::{ConfigError, ParamMap};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

type Reply = (StatusCode, Json<ApiResponse<Value>>);

fn ok(data: Value) -> Reply {
    (StatusCode::OK, Json(ApiResponse::ok(data)))
}

fn not_found(message: String) -> Reply {
    (StatusCode::NOT_FOUND, Json(ApiResponse::err(message)))
}

fn known_strategy(id: &str) -> bool {
    !parameter_schemas(id).is_empty()
}

fn config_error_reply(e: ConfigError) -> Reply {
    match e {
        ConfigError::Validation(errors) => (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse {
                success: false,
                data: Some(json!({ "validation_errors": errors })),
                error: Some("validation failed".to_string()),
            }),
        ),
        ConfigError::NotFound(message) => not_found(message),
        ConfigError::Unavailable | ConfigError::Store(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse::err(format!("transient store error: {e}"))),
        ),
    }
}

pub async fn list_strategies(State(state): State<AppState>) -> Reply {
    let strategies = state.config_manager.list_strategies().await;
    ok(json!({ "strategies": strategies }))
}

pub async fn get_schema(Path(id): Path<String>) -> Reply {
    if !known_strategy(&id) {
        return not_found(format!("unknown strategy: {id}"));
    }
    ok(json!({
        "strategy_id": id,
        "parameters": parameter_schemas(&id),
    }))
}

pub async fn get_defaults(Path(id): Path<String>) -> Reply {
    if !known_strategy(&id) {
        return not_found(format!("unknown strategy: {id}"));
    }
    ok(json!({
        "strategy_id": id,
        "defaults": strategy_defaults(&id),
    }))
}

async fn resolved_json(state: &AppState, id: &str, symbol: Option<&str>) -> Value {
    let resolved = state.config_manager.get(id, symbol).await;
    json!({
        "strategy_id": id,
        "symbol": symbol,
        "parameters": resolved.parameters,
        "version": resolved.version,
        "source": resolved.source,
        "is_override": resolved.is_override,
    })
}

pub async fn get_global_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Reply {
    if !known_strategy(&id) {
        return not_found(format!("unknown strategy: {id}"));
    }
    ok(resolved_json(&state, &id, None).await)
}

pub async fn get_symbol_config(
    State(state): State<AppState>,
    Path((id, symbol)): Path<(String, String)>,
) -> Reply {
    if !known_strategy(&id) {
        return not_found(format!("unknown strategy: {id}"));
    }
    ok(resolved_json(&state, &id, Some(&symbol)).await)
}

/// Body for configuration writes
#[derive(Debug, Deserialize)]
pub struct SetConfigRequest {
    pub parameters: ParamMap,
    pub changed_by: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub validate_only: bool,
}

async fn set_config(
    state: AppState,
    id: String,
    symbol: Option<String>,
    request: SetConfigRequest,
) -> Reply {
    if !known_strategy(&id) {
        return not_found(format!("unknown strategy: {id}"));
    }

    let result = state
        .config_manager
        .set(
            &id,
            symbol.as_deref(),
            request.parameters,
            &request.changed_by,
            request.reason,
            request.validate_only,
        )
        .await;

    match result {
        Ok(None) => ok(json!({ "valid": true })),
        Ok(Some(saved)) => {
            let action = if saved.version == 1 { "CREATE" } else { "UPDATE" };
            state
                .metrics
                .config_changes
                .with_label_values(&[action])
                .inc();
            ok(json!({ "config": saved }))
        }
        Err(e) => config_error_reply(e),
    }
}

pub async fn set_global_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SetConfigRequest>,
) -> Reply {
    set_config(state, id, None, request).await
}

pub async fn set_symbol_config(
    State(state): State<AppState>,
    Path((id, symbol)): Path<(String, String)>,
    Json(request): Json<SetConfigRequest>,
) -> Reply {
    set_config(state, id, Some(symbol), request).await
}

/// Query parameters for deletes
#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub changed_by: String,
    #[serde(default)]
    pub reason: Option<String>,
}

async fn delete_config(
    state: AppState,
    id: String,
    symbol: Option<String>,
    query: DeleteQuery,
) -> Reply {
    if !known_strategy(&id) {
        return not_found(format!("unknown strategy: {id}"));
    }

    let result = state
        .config_manager
        .delete(&id, symbol.as_deref(), &query.changed_by, query.reason)
        .await;
    match result {
        Ok(()) => {
            state
                .metrics
                .config_changes
                .with_label_values(&["DELETE"])
                .inc();
            ok(json!({ "deleted": true }))
        }
        Err(e) => config_error_reply(e),
    }
}

pub async fn delete_global_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> Reply {
    delete_config(state, id, None, query).await
}

pub async fn delete_symbol_config(
    State(state): State<AppState>,
    Path((id, symbol)): Path<(String, String)>,
    Query(query): Query<DeleteQuery>,
) -> Reply {
    delete_config(state, id, Some(symbol), query).await
}

/// Query parameters for the audit page
#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default = "default_audit_limit")]
    pub limit: i64,
}

fn default_audit_limit() -> i64 {
    100
}

pub async fn get_audit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<AuditQuery>,
) -> Reply {
    if !known_strategy(&id) {
        return not_found(format!("unknown strategy: {id}"));
    }
    let trail = state
        .config_manager
        .audit(&id, query.symbol.as_deref(), query.limit)
        .await;
    ok(json!({
        "strategy_id": id,
        "records": trail,
    }))
}

/// Body for rollback requests
#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub changed_by: String,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub target_version: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn rollback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RollbackRequest>,
) -> Reply {
    if !known_strategy(&id) {
        return not_found(format!("unknown strategy: {id}"));
    }

    let result = state
        .config_manager
        .rollback(
            &id,
            request.symbol.as_deref(),
            request.target_version,
            &request.changed_by,
            request.reason,
        )
        .await;
    match result {
        Ok(restored) => {
            state
                .metrics
                .config_changes
                .with_label_values(&["UPDATE"])
                .inc();
            ok(json!({ "config": restored }))
        }
        Err(e) => config_error_reply(e),
    }
}

pub async fn refresh_cache(State(state): State<AppState>) -> Reply {
    state.config_manager.refresh();
    ok(json!({ "refreshed": true }))
}
