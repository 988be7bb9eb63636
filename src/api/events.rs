use crate::api::{AppError, AppState};
use crate::bridge::InboundOutcome;
use crate::slack::{
    extract_challenge, inbound_message, verify_signature, SlackEnvelope, SlackEvent,
    RETRY_NUM_HEADER,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Create Slack Events API router
pub fn create_events_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/slack/events", post(slack_events))
        .with_state(state)
}

/// POST /slack/events - Slack Events API callback
///
/// Acknowledged immediately; the message itself is bridged on a spawned task.
/// Slack redelivers anything not acknowledged within 3 seconds.
async fn slack_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    if let Some(secret) = state.signing_secret.as_deref() {
        verify_signature(secret, &headers, &body, Utc::now().timestamp()).map_err(|e| {
            warn!(error = %e, "Rejected Slack request");
            AppError::Unauthorized(e.to_string())
        })?;
    }

    let envelope: SlackEnvelope = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid Slack payload: {}", e)))?;

    if let Some(challenge) = extract_challenge(&envelope) {
        info!("Answering Slack URL verification");
        return Ok((StatusCode::OK, challenge.to_string()).into_response());
    }

    // The first delivery is already being processed
    if let Some(retry) = headers.get(RETRY_NUM_HEADER) {
        debug!(
            retry = ?retry,
            event_id = ?envelope.event_id,
            "Dropping Slack redelivery"
        );
        return Ok(StatusCode::OK.into_response());
    }

    if envelope.kind != "event_callback" {
        debug!(kind = %envelope.kind, "Ignoring Slack envelope");
        return Ok(StatusCode::OK.into_response());
    }

    if let Some(event) = envelope.event {
        let event_id = envelope.event_id.unwrap_or_default();
        tokio::spawn(process_event(state, event_id, event));
    }

    Ok(StatusCode::OK.into_response())
}

/// Bridge one Slack event; failures are logged, never propagated
async fn process_event(state: Arc<AppState>, event_id: String, event: SlackEvent) {
    let kind = event.kind.clone();
    let Some(message) = inbound_message(&state.slack, event).await else {
        debug!(event_id = %event_id, kind = %kind, "Slack event not addressed to the bridge");
        return;
    };

    let thread = message.thread.clone();
    match state.bridge.handle_inbound(message).await {
        Ok(InboundOutcome::Ignored(reason)) => {
            debug!(event_id = %event_id, thread = %thread, ?reason, "Slack message ignored");
        }
        Ok(InboundOutcome::Delivered {
            conversation_id,
            created,
            replaced,
            ..
        }) => {
            info!(
                event_id = %event_id,
                thread = %thread,
                conversation_id = %conversation_id,
                created,
                replaced = ?replaced,
                "Forwarded Slack message"
            );
        }
        Err(e) => {
            error!(
                event_id = %event_id,
                thread = %thread,
                error = %e,
                "Failed to forward Slack message"
            );
        }
    }
}
