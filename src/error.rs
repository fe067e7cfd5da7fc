//! Gateway error types with HTTP status code mapping.
//!
//! [`GatewayError`] is the error type of the HTTP surface. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//! WebSocket admission failures use close codes instead, see
//! [`crate::ws::close_code`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::HubStopped;
use crate::service::EventError;
use crate::store::StoreError;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "arena not found",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                  |
/// |-----------|-----------------|------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request              |
/// | 2000–2999 | State/Not Found | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Server          | 500 / 503                    |
/// | 5000–5999 | Access          | 401 / 403                    |
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The event type or payload was rejected.
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// A referenced record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The operation conflicts with the current arena state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Missing or wrong credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The caller may not perform this operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Store backend failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// The hub task is not running.
    #[error("hub unavailable")]
    HubUnavailable,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::InvalidEvent(_) => 1002,
            Self::NotFound(_) => 2001,
            Self::Conflict(_) => 2002,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::HubUnavailable => 3002,
            Self::Unauthorized(_) => 5001,
            Self::PermissionDenied(_) => 5002,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::InvalidEvent(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::PersistenceError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::HubUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what.to_string()),
            StoreError::NotOwner => Self::PermissionDenied("user is not the arena owner".into()),
            StoreError::Invalid(reason) => Self::Conflict(reason),
            StoreError::Backend(reason) => Self::PersistenceError(reason),
        }
    }
}

impl From<EventError> for GatewayError {
    fn from(err: EventError) -> Self {
        let message = err.to_string();
        match err {
            EventError::Malformed { .. } | EventError::UnknownType(_) => {
                Self::InvalidEvent(message)
            }
            EventError::PermissionDenied(_) => Self::PermissionDenied(message),
            EventError::Store(store) => store.into(),
            EventError::Encode(inner) => Self::Internal(inner.to_string()),
        }
    }
}

impl From<HubStopped> for GatewayError {
    fn from(_: HubStopped) -> Self {
        Self::HubUnavailable
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_statuses() {
        let cases = [
            (StoreError::NotFound("arena"), StatusCode::NOT_FOUND),
            (StoreError::NotOwner, StatusCode::FORBIDDEN),
            (StoreError::Invalid("x".into()), StatusCode::CONFLICT),
            (
                StoreError::Backend("down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (store, status) in cases {
            assert_eq!(GatewayError::from(store).status_code(), status);
        }
    }

    #[test]
    fn event_errors_map_to_statuses() {
        let unknown = GatewayError::from(EventError::UnknownType("nope".into()));
        assert_eq!(unknown.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(unknown.error_code(), 1002);

        let denied = GatewayError::from(EventError::PermissionDenied("concede"));
        assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);

        let nested = GatewayError::from(EventError::Store(StoreError::NotFound("arena")));
        assert!(matches!(nested, GatewayError::NotFound(ref what) if what == "arena"));
    }

    #[test]
    fn hub_stopped_is_unavailable() {
        let err = GatewayError::from(HubStopped);
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn response_body_carries_code_and_message() {
        let response = GatewayError::NotFound("arena".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body read failed");
        };
        let Ok(json) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
            panic!("body is not json");
        };
        assert_eq!(json["error"]["code"], 2001);
        assert_eq!(json["error"]["message"], "arena not found");
        assert!(json["error"].get("details").is_none());
    }
}
