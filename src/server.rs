//! Router composition shared by the binary and the integration tests.

use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::ws::ws_handler;

/// Builds the full application: REST API, WebSocket endpoint, tracing and
/// CORS layers, and Swagger UI when the `swagger-ui` feature is on.
///
/// The request timeout applies to REST routes only; WebSocket sessions
/// outlive it once upgraded.
pub fn build_app(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);
    let rest = api::build_router().layer(request_timeout(timeout));

    let app = Router::new()
        .merge(rest)
        .route("/ws/arenas/{arena_id}", get(ws_handler));

    #[cfg(feature = "swagger-ui")]
    let app = {
        use utoipa::OpenApi;
        app.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api::ApiDoc::openapi()),
        )
    };

    app.layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// REST request timeout answering `408 Request Timeout`.
fn request_timeout(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::config::GatewayConfig;
    use crate::domain::Hub;
    use crate::service::ArenaService;
    use crate::store::MemoryStore;

    fn app() -> Router {
        let Ok(config) = GatewayConfig::from_lookup(|_| None) else {
            panic!("default config must load");
        };
        let service = ArenaService::new(Arc::new(MemoryStore::new()), Hub::start(16));
        build_app(AppState::new(Arc::new(service), config))
    }

    async fn status_of(uri: &str) -> StatusCode {
        let Ok(request) = Request::get(uri).body(Body::empty()) else {
            panic!("request must build");
        };
        let Ok(response) = app().oneshot(request).await else {
            panic!("router is infallible");
        };
        response.status()
    }

    #[tokio::test]
    async fn health_is_mounted_at_root() {
        assert_eq!(status_of("/health").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn websocket_route_refuses_plain_get() {
        assert!(status_of("/ws/arenas/abc").await.is_client_error());
    }

    #[tokio::test]
    async fn slow_rest_request_times_out_with_408() {
        let slow = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    "late"
                }),
            )
            .layer(request_timeout(Duration::from_millis(20)));
        let Ok(request) = Request::get("/slow").body(Body::empty()) else {
            panic!("request must build");
        };
        let Ok(response) = slow.oneshot(request).await else {
            panic!("router is infallible");
        };
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        assert_eq!(status_of("/api/v1/missing").await, StatusCode::NOT_FOUND);
    }

    #[cfg(feature = "swagger-ui")]
    #[tokio::test]
    async fn openapi_document_is_served() {
        assert_eq!(status_of("/api-docs/openapi.json").await, StatusCode::OK);
    }
}
