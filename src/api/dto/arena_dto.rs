//! DTOs for arena presence and event injection.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request body of `POST /api/v1/arenas/{id}/events`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InjectEventRequest {
    /// User on whose behalf the event is applied.
    pub user_id: uuid::Uuid,
    /// Event type, e.g. `"advance_phase"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Event payload. Typed payloads are JSON encoded into this string.
    #[serde(default)]
    pub value: String,
}

/// Response of an accepted injection.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InjectEventResponse {
    /// Always `"accepted"`.
    pub status: String,
}

/// Live connection count of one arena.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    /// Arena identifier.
    pub arena_id: uuid::Uuid,
    /// Number of live subscriptions.
    pub connections: usize,
    /// `true` when at least one participant is connected.
    pub active: bool,
}
