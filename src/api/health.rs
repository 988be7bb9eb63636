use crate::api::{AppError, AppState};
use crate::bridge::StoreSnapshot;
use axum::{extract::State, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Bridge state dump
#[derive(Serialize)]
pub struct StateResponse {
    #[serde(flatten)]
    pub store: StoreSnapshot,
    pub has_token: bool,
    pub token_expires_at: Option<DateTime<Utc>>,
}

/// Create health/introspection router
pub fn create_health_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/state", get(dump_state))
        .with_state(state)
}

/// GET /health - Liveness
async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// GET /state - Thread/conversation maps and token status (never the token)
async fn dump_state(State(state): State<Arc<AppState>>) -> Result<Json<StateResponse>, AppError> {
    let store = state
        .bridge
        .store()
        .snapshot()
        .await
        .map_err(|e| AppError::ServerError(format!("Failed to read state: {}", e)))?;

    Ok(Json(StateResponse {
        store,
        has_token: state.credentials.has_token(),
        token_expires_at: state.credentials.expires_at(),
    }))
}
