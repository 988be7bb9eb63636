use crate::api::{AppError, AppState};
use crate::auth::verify_api_key;
use crate::bridge::{BridgeError, OutboundOutcome, OutboundPayload};
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Backend → bridge webhook body
#[derive(Debug, Deserialize)]
pub struct WebhookRequest {
    pub conversation_id: String,
    #[serde(default)]
    pub payload: OutboundPayload,
}

/// Response for an accepted webhook
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,
}

/// Create backend webhook router
pub fn create_webhook_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(receive_webhook))
        .with_state(state)
}

/// POST /webhook - Agent reply from the backend
async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, AppError> {
    // Authenticate before looking at the body
    verify_api_key(&headers, &state.webhook_api_key).map_err(|e| {
        warn!(error = %e, "Rejected webhook call");
        AppError::Unauthorized(e.to_string())
    })?;

    let request: WebhookRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook body: {}", e)))?;

    let outcome = state
        .bridge
        .handle_outbound(&request.conversation_id, &request.payload)
        .await
        .map_err(|e| match e {
            BridgeError::UnknownConversation(_) => {
                warn!(conversation_id = %request.conversation_id, "Webhook for unknown conversation");
                AppError::NotFound(e.to_string())
            }
            BridgeError::Reply(_) => {
                error!(conversation_id = %request.conversation_id, error = %e, "Failed to post agent reply");
                AppError::BadGateway(e.to_string())
            }
            _ => {
                error!(conversation_id = %request.conversation_id, error = %e, "Webhook handling failed");
                AppError::ServerError(e.to_string())
            }
        })?;

    let status = match outcome {
        OutboundOutcome::Delivered => {
            info!(conversation_id = %request.conversation_id, "Agent reply delivered");
            "delivered"
        }
        OutboundOutcome::Empty => "empty",
    };

    Ok(Json(WebhookResponse {
        status: status.to_string(),
    }))
}
