use super::{
    BackendError, ContactPerson, Conversation, ConversationBackend, MessageDirection,
    NewConversation, PriorMessage, SendOutcome,
};
use crate::config::BackendConfig;
use crate::credentials::CredentialManager;
use crate::idempotency::{IdempotencyKey, IDEMPOTENCY_HEADER};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Serialize)]
struct ConversationMetadata<'a> {
    user_id: &'a str,
}

#[derive(Serialize)]
struct CreateConversationBody<'a> {
    touchpoint_id: &'a str,
    contact_person: &'a ContactPerson,
    metadata: ConversationMetadata<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    previous_messages: Option<&'a [PriorMessage]>,
    channel: &'a str,
    source: &'a str,
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    content: &'a str,
    #[serde(rename = "type")]
    message_type: &'static str,
    direction: MessageDirection,
    timestamp: DateTime<Utc>,
}

/// HTTP client for the backend conversation API.
///
/// Holds no conversation state; every call is independent.
pub struct BackendClient {
    http: Client,
    api_base: String,
    credentials: Arc<CredentialManager>,
    channel: String,
    source: String,
}

impl BackendClient {
    pub fn new(
        http: Client,
        api_base: String,
        credentials: Arc<CredentialManager>,
        channel: String,
        source: String,
    ) -> Self {
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            credentials,
            channel,
            source,
        }
    }

    pub fn from_config(
        http: Client,
        config: &BackendConfig,
        credentials: Arc<CredentialManager>,
    ) -> Self {
        Self::new(
            http,
            config.api_base.clone(),
            credentials,
            config.channel.clone(),
            config.source.clone(),
        )
    }

    fn conversations_url(&self) -> String {
        format!("{}/digital-connect/conversations", self.api_base)
    }

    fn messages_url(&self, conversation_id: &str) -> String {
        format!(
            "{}/digital-connect/conversations/{}/messages",
            self.api_base, conversation_id
        )
    }

    /// POST with the cached token; on 401 refresh once and repeat the same
    /// request (same body, same idempotency key).
    async fn post_with_retry<B>(
        &self,
        operation: &'static str,
        url: &str,
        body: &B,
    ) -> Result<Value, BackendError>
    where
        B: Serialize + Sync,
    {
        let key = IdempotencyKey::generate();
        let token = self.credentials.get_token(false).await?;

        match self.post_once(url, body, &key, &token).await {
            Err(BackendError::AuthorizationExpired) => {
                warn!(
                    operation,
                    idempotency_key = %key,
                    "Backend returned 401, refreshing token and retrying once"
                );
                let token = self.credentials.get_token(true).await?;
                self.post_once(url, body, &key, &token).await
            }
            other => other,
        }
    }

    async fn post_once<B>(
        &self,
        url: &str,
        body: &B,
        key: &IdempotencyKey,
        token: &str,
    ) -> Result<Value, BackendError>
    where
        B: Serialize + Sync,
    {
        debug!(url = %url, idempotency_key = %key, "Calling backend");

        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .header(IDEMPOTENCY_HEADER, key.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        check_response_status(status, &text)?;

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

/// Map a response status to the backend error taxonomy.
///
/// - 401 → authorization expired (caller may retry once)
/// - Other non-2xx → rejected, never retried
fn check_response_status(status: StatusCode, body: &str) -> Result<(), BackendError> {
    match status {
        StatusCode::UNAUTHORIZED => Err(BackendError::AuthorizationExpired),
        s if !s.is_success() => Err(BackendError::Rejected {
            status: s.as_u16(),
            body: body.to_string(),
        }),
        _ => Ok(()),
    }
}

#[async_trait]
impl ConversationBackend for BackendClient {
    async fn create_conversation(
        &self,
        request: &NewConversation,
    ) -> Result<Conversation, BackendError> {
        let body = CreateConversationBody {
            touchpoint_id: &request.touchpoint_id,
            contact_person: &request.contact,
            metadata: ConversationMetadata {
                user_id: &request.user_id,
            },
            previous_messages: (!request.prior_messages.is_empty())
                .then_some(request.prior_messages.as_slice()),
            channel: &self.channel,
            source: &self.source,
        };

        let response = self
            .post_with_retry("create_conversation", &self.conversations_url(), &body)
            .await?;

        serde_json::from_value(response).map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<SendOutcome, BackendError> {
        let body = SendMessageBody {
            content: text,
            message_type: "text",
            direction: MessageDirection::Inbound,
            timestamp: Utc::now(),
        };

        let response = self
            .post_with_retry("send_message", &self.messages_url(conversation_id), &body)
            .await?;

        Ok(SendOutcome::from_response(response))
    }
}
