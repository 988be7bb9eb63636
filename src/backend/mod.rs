//! Virtual-agent backend API ("Digital Connect").
//!
//! Two operations, both authenticated with the cached bearer token and both
//! carrying a fresh idempotency key:
//!
//! - `POST {api_base}/digital-connect/conversations`
//! - `POST {api_base}/digital-connect/conversations/{id}/messages`
//!
//! A 401 triggers one forced token refresh and one retry of the same call
//! with the same idempotency key.

use crate::credentials::AuthError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod client;


pub use client::BackendClient;

/// Response code the backend uses for "conversation ended on backend side"
pub const CONVERSATION_ENDED_CODE: &str = "3016011";

/// Person the backend conversation is opened for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactPerson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub email: String,
}

/// Direction of a message relative to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    /// From the chat user to the agent
    Inbound,
    /// From the agent to the chat user
    Outbound,
}

/// Earlier thread message replayed into a new conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorMessage {
    pub content: String,
    pub direction: MessageDirection,
    pub timestamp: DateTime<Utc>,
}

/// Parameters for opening a backend conversation
#[derive(Debug, Clone, PartialEq)]
pub struct NewConversation {
    pub touchpoint_id: String,
    pub user_id: String,
    pub contact: ContactPerson,
    pub prior_messages: Vec<PriorMessage>,
}

/// Conversation created by the backend
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Conversation {
    pub id: String,
    /// Remaining response fields, kept as-is
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

/// Result of delivering a message into a conversation
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Conversation is still open; carries the backend response body
    Ongoing(Value),
    /// Backend reported the conversation as ended; the message was not taken
    Ended,
}

impl SendOutcome {
    /// Classify a successful send-message response body
    pub fn from_response(body: Value) -> Self {
        let code = match body.get("code") {
            Some(Value::String(code)) => Some(code.clone()),
            Some(Value::Number(code)) => Some(code.to_string()),
            _ => None,
        };
        if code.as_deref() == Some(CONVERSATION_ENDED_CODE) {
            SendOutcome::Ended
        } else {
            SendOutcome::Ongoing(body)
        }
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, SendOutcome::Ended)
    }
}

/// Backend call errors
#[derive(Debug, Clone, PartialEq)]
pub enum BackendError {
    /// No token could be obtained
    Auth(AuthError),
    /// 401 persisted after the forced refresh
    AuthorizationExpired,
    /// Any other non-success response
    Rejected { status: u16, body: String },
    /// Backend unreachable
    Transport(String),
    /// Success status with an unparseable body
    InvalidResponse(String),
}

impl From<AuthError> for BackendError {
    fn from(e: AuthError) -> Self {
        BackendError::Auth(e)
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Auth(e) => write!(f, "Backend authentication failed: {}", e),
            BackendError::AuthorizationExpired => {
                write!(f, "Backend rejected the refreshed token (401)")
            }
            BackendError::Rejected { status, body } => {
                write!(f, "Backend rejected request with status {}: {}", status, body)
            }
            BackendError::Transport(msg) => write!(f, "Backend unreachable: {}", msg),
            BackendError::InvalidResponse(msg) => write!(f, "Invalid backend response: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}

/// The two backend operations the bridge depends on.
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// Open a new conversation
    async fn create_conversation(
        &self,
        request: &NewConversation,
    ) -> Result<Conversation, BackendError>;

    /// Deliver one user message into an open conversation
    async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
    ) -> Result<SendOutcome, BackendError>;
}
