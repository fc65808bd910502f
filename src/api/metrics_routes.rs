//! Depth metrics endpoints

use super::{ApiResponse, AppState};
use crate::depth::Timeframe;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

type Reply = (StatusCode, Json<ApiResponse<Value>>);

pub async fn depth_metrics(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Reply {
    let symbol = symbol.to_uppercase();
    let analyzer = state.analyzer.read().await;
    match analyzer.current(&symbol) {
        Some(metrics) => (
            StatusCode::OK,
            Json(ApiResponse::ok(json!({ "metrics": metrics }))),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!("no depth metrics for {symbol}"))),
        ),
    }
}

/// Query parameters for the pressure endpoint
#[derive(Debug, Deserialize)]
pub struct PressureQuery {
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
}

fn default_timeframe() -> String {
    "5m".to_string()
}

pub async fn pressure_history(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<PressureQuery>,
) -> Reply {
    let symbol = symbol.to_uppercase();
    let Some(timeframe) = Timeframe::parse(&query.timeframe) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::err(format!(
                "invalid timeframe {} (expected 1m, 5m, or 15m)",
                query.timeframe
            ))),
        );
    };

    let analyzer = state.analyzer.read().await;
    match analyzer.pressure_history(&symbol, timeframe) {
        Some(history) => (
            StatusCode::OK,
            Json(ApiResponse::ok(json!({ "history": history }))),
        ),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::err(format!("no pressure history for {symbol}"))),
        ),
    }
}

pub async fn market_summary(State(state): State<AppState>) -> Reply {
    let analyzer = state.analyzer.read().await;
    (
        StatusCode::OK,
        Json(ApiResponse::ok(json!({ "summary": analyzer.summary() }))),
    )
}

pub async fn all_metrics(State(state): State<AppState>) -> Reply {
    let analyzer = state.analyzer.read().await;
    (
        StatusCode::OK,
        Json(ApiResponse::ok(json!({ "metrics": analyzer.all() }))),
    )
}
