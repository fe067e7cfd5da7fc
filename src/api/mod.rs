//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` sits at the
//! root.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document for the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "retro-gateway",
        description = "Real-time gateway for retrospective arenas"
    ),
    paths(
        handlers::system::health_handler,
        handlers::arena::presence,
        handlers::arena::inject_event,
    ),
    components(schemas(
        dto::HealthResponse,
        dto::PresenceResponse,
        dto::InjectEventRequest,
        dto::InjectEventResponse,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "System", description = "Health and statistics"),
        (name = "Arenas", description = "Presence and event injection"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes())
}
