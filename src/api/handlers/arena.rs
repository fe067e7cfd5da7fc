//! Arena endpoints: presence and server-side event injection.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{InjectEventRequest, InjectEventResponse, PresenceResponse};
use crate::app_state::AppState;
use crate::domain::{ArenaId, UserId};
use crate::error::{ErrorResponse, GatewayError};

/// Header carrying the injection key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// `GET /arenas/{id}/presence`: Live connection count.
///
/// # Errors
///
/// Returns [`GatewayError`] on a malformed ID or when the hub is down.
#[utoipa::path(
    get,
    path = "/api/v1/arenas/{id}/presence",
    tag = "Arenas",
    summary = "Arena presence",
    description = "Returns how many connections are currently subscribed to the arena.",
    params(("id" = String, Path, description = "Arena ID")),
    responses(
        (status = 200, description = "Presence", body = PresenceResponse),
        (status = 400, description = "Malformed arena ID", body = ErrorResponse),
    )
)]
pub async fn presence(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let arena_id = parse_arena_id(&id)?;
    let connections = state.hub.presence(arena_id).await?;
    Ok(Json(PresenceResponse {
        arena_id: arena_id.into(),
        connections,
        active: connections > 0,
    }))
}

/// `POST /arenas/{id}/events`: Apply an event on behalf of a user.
///
/// The result is broadcast to the arena's live connections, if any.
///
/// # Errors
///
/// Returns [`GatewayError`] when the key is wrong, the event is rejected
/// or the store refuses it.
#[utoipa::path(
    post,
    path = "/api/v1/arenas/{id}/events",
    tag = "Arenas",
    summary = "Inject an arena event",
    description = "Runs the event through the same handlers as a live connection. Requires the `X-API-Key` header.",
    params(("id" = String, Path, description = "Arena ID")),
    request_body = InjectEventRequest,
    responses(
        (status = 202, description = "Event applied", body = InjectEventResponse),
        (status = 400, description = "Unknown or malformed event", body = ErrorResponse),
        (status = 401, description = "Missing or wrong API key", body = ErrorResponse),
        (status = 403, description = "Owner-only event or injection disabled", body = ErrorResponse),
        (status = 404, description = "Arena or record not found", body = ErrorResponse),
    )
)]
pub async fn inject_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<InjectEventRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    authorize(&state, &headers)?;
    let arena_id = parse_arena_id(&id)?;
    let user_id = UserId::from_uuid(req.user_id);

    state
        .arena_service
        .api_event(arena_id, user_id, &req.kind, &req.value)
        .await?;

    tracing::info!(%arena_id, %user_id, event = %req.kind, "event injected");
    Ok((
        StatusCode::ACCEPTED,
        Json(InjectEventResponse {
            status: "accepted".to_string(),
        }),
    ))
}

/// Arena routes, nested under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/arenas/{id}/presence", get(presence))
        .route("/arenas/{id}/events", post(inject_event))
}

fn parse_arena_id(raw: &str) -> Result<ArenaId, GatewayError> {
    raw.parse()
        .map_err(|_| GatewayError::InvalidRequest(format!("invalid arena id: {raw}")))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), GatewayError> {
    let Some(expected) = state.config.event_api_key.as_deref() else {
        return Err(GatewayError::PermissionDenied(
            "event injection is disabled".to_string(),
        ));
    };
    match headers.get(API_KEY_HEADER).map(|v| v.to_str()) {
        Some(Ok(given)) if keys_match(given, expected) => Ok(()),
        Some(_) => Err(GatewayError::Unauthorized("wrong API key".to_string())),
        None => Err(GatewayError::Unauthorized("missing API key".to_string())),
    }
}

/// Compares API keys without short-circuiting on the first differing byte.
fn keys_match(given: &str, expected: &str) -> bool {
    if given.len() != expected.len() {
        return false;
    }
    given
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
