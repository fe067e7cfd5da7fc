//! System endpoints: health check with hub statistics.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::api::dto::HealthResponse;
use crate::app_state::AppState;

/// `GET /health`: Service health status.
#[utoipa::path(
    get,
    path = "/health",
    tag = "System",
    summary = "Health check",
    description = "Returns service health, version, current timestamp and live connection counts.",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Hub task is not running", body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (status, stats) = match state.hub.stats().await {
        Ok(stats) => (StatusCode::OK, stats),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, Default::default()),
    };
    let label = if status.is_success() {
        "healthy"
    } else {
        "degraded"
    };
    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            arenas: stats.arenas,
            connections: stats.subscriptions,
        }),
    )
}

/// System routes mounted at the root level (not under /api/v1).
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}
