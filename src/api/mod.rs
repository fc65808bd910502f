//! Configuration and metrics REST surface
//!
//! All responses share a `{success, data?, error?}` envelope.

mod config_routes;
mod metrics_routes;

use crate::depth::DepthAnalyzer;
use crate::params::ConfigManager;
use crate::telemetry::Metrics;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config_manager: Arc<ConfigManager>,
    pub analyzer: Arc<RwLock<DepthAnalyzer>>,
    pub metrics: Arc<Metrics>,
}

/// Uniform response envelope
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/strategies", get(config_routes::list_strategies))
        .route("/strategies/cache/refresh", post(config_routes::refresh_cache))
        .route("/strategies/{id}/schema", get(config_routes::get_schema))
        .route("/strategies/{id}/defaults", get(config_routes::get_defaults))
        .route(
            "/strategies/{id}/config",
            get(config_routes::get_global_config)
                .post(config_routes::set_global_config)
                .delete(config_routes::delete_global_config),
        )
        .route(
            "/strategies/{id}/config/{symbol}",
            get(config_routes::get_symbol_config)
                .post(config_routes::set_symbol_config)
                .delete(config_routes::delete_symbol_config),
        )
        .route("/strategies/{id}/audit", get(config_routes::get_audit))
        .route("/strategies/{id}/rollback", post(config_routes::rollback))
        .route("/metrics/depth/{symbol}", get(metrics_routes::depth_metrics))
        .route(
            "/metrics/pressure/{symbol}",
            get(metrics_routes::pressure_history),
        )
        .route("/metrics/summary", get(metrics_routes::market_summary))
        .route("/metrics/all", get(metrics_routes::all_metrics))
        .with_state(state)
}

/// Spawn the API server
pub fn serve(port: u16, state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app = router(state);
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        tracing::info!(addr = %addr, "Starting API server");

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app).await {
                    tracing::error!(error = %e, "API server error");
                }
            }
            Err(e) => tracing::error!(error = %e, port, "Failed to bind API server"),
        }
    })
}
