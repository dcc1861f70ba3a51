//! Error types for the streaming server.

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pulse_proto::ProtoError;
use serde::Serialize;
use thiserror::Error;

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors surfaced by the transport server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to the specified address. The server never started.
    #[error("failed to bind to {0}: {1}")]
    BindFailed(SocketAddr, std::io::Error),

    /// The server started and then failed while serving.
    #[error("server failed while serving: {0}")]
    Serve(std::io::Error),

    /// No route matches the request.
    #[error("no route for {0}")]
    NotFound(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::BindFailed(_, _) | Self::Serve(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
        };

        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            r#"{"error":"internal_error","message":"failed to serialize error"}"#.to_string()
        });

        (status, [("content-type", "application/json")], json).into_response()
    }
}

/// Errors returned by a [`ClusterInspector`](crate::inspector::ClusterInspector).
///
/// All of them are transient from the poller's point of view.
#[derive(Debug, Error)]
pub enum InspectError {
    /// Reading the cluster source failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The cluster source returned data that could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The cluster source is not reachable right now.
    #[error("cluster unavailable: {0}")]
    Unavailable(String),

    /// The blocking inspection task panicked or was cancelled.
    #[error("inspection task failed: {0}")]
    TaskFailed(String),
}

/// Errors that end a single connection session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A write did not complete within its deadline.
    #[error("{op} timed out after {timeout:?}")]
    Timeout {
        /// The operation that timed out.
        op: &'static str,
        /// The deadline that elapsed.
        timeout: Duration,
    },

    /// The underlying WebSocket failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),

    /// A snapshot could not be framed.
    #[error(transparent)]
    Encoding(#[from] ProtoError),
}
