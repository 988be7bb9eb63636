// HTTP surface: Slack events, backend webhook, health/state

pub mod events;
pub mod health;
pub mod webhook;

pub use events::create_events_router;
pub use health::create_health_router;
pub use webhook::create_webhook_router;

use crate::bridge::ConversationBridge;
use crate::credentials::CredentialManager;
use crate::slack::SlackClient;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state
pub struct AppState {
    pub bridge: Arc<ConversationBridge>,
    pub credentials: Arc<CredentialManager>,
    pub slack: Arc<SlackClient>,
    /// Shared secret expected on webhook calls
    pub webhook_api_key: String,
    /// Slack signing secret; signatures are not checked when `None`
    pub signing_secret: Option<String>,
}

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Application error types for HTTP handlers
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    ServerError(String),
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(ErrorResponse {
            error: error_message,
        });

        (status, body).into_response()
    }
}

/// Full application router with request tracing
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(create_events_router(Arc::clone(&state)))
        .merge(create_webhook_router(Arc::clone(&state)))
        .merge(create_health_router(state))
        .layer(TraceLayer::new_for_http())
}
