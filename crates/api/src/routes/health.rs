use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::engine::DispatchStats;
use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the report directory can be listed.
    pub store_healthy: bool,
    /// Queue and channel counters.
    pub queue: DispatchStats,
}

/// GET /health -- returns service health and queue counters.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_healthy = state.store.list_report_ids().await.is_ok();
    let status = if store_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        store_healthy,
        queue: state.dispatcher.stats().await,
    })
}

/// Mount health check routes (at the root, outside the base path).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
