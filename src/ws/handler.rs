//! Axum WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum_extra::extract::cookie::{CookieJar, SignedCookieJar};

use super::connection::run_connection;
use super::gate::Credentials;
use crate::app_state::AppState;

/// `GET /ws/arenas/{arena_id}`: Upgrade HTTP connection to WebSocket.
///
/// Credentials are read from the request before the upgrade; every check
/// that can fail runs afterwards so the client always gets a coded close.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(arena_id): Path<String>,
    signed: SignedCookieJar,
    plain: CookieJar,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let credentials = Credentials::from_jars(&signed, &plain, &state.config.cookies);
    let session = state.config.session;
    let service = Arc::clone(&state.arena_service);

    ws.max_message_size(session.max_message_size)
        .max_frame_size(session.max_message_size)
        .on_upgrade(move |socket| run_connection(socket, service, credentials, arena_id, session))
}
