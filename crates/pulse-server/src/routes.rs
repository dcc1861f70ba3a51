//! Route configuration and handlers.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::state::ServerState;

/// Body returned by the liveness endpoint.
pub const HEALTHY_BODY: &str = "OK";

/// Create the server router.
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = build_cors_layer(state.config());
    let health_path = route_path(&state.config().health_path);
    let stream_path = route_path(&state.config().stream_path);

    Router::new()
        .route(&health_path, get(health_check))
        .route(&stream_path, get(stream_upgrade))
        .fallback(not_found)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Liveness check.
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, HEALTHY_BODY)
}

/// Upgrade to a WebSocket and hand the socket to a new session.
pub async fn stream_upgrade(
    State(state): State<Arc<ServerState>>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.is_closing() {
        return (StatusCode::SERVICE_UNAVAILABLE, "shutting down").into_response();
    }

    let session = state.new_session();
    debug!(session_id = %session.id(), "upgrading connection");

    ws.on_upgrade(move |socket| async move {
        state.sessions().spawn(async move {
            session.run(socket).await;
        });
    })
}

async fn not_found(uri: Uri) -> ServerError {
    ServerError::NotFound(uri.path().to_string())
}

fn route_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
