//! Chat thread ↔ backend conversation bridge.
//!
//! Per-thread lifecycle:
//!
//! ```text
//! NoConversation ──first message──▶ Active ──send ok──▶ Active
//!                                     │
//!                                     └─ send reports ended ─▶ new conversation,
//!                                        binding replaced, message resent
//! ```
//!
//! All events for one thread are serialized through a per-thread lock, so two
//! near-simultaneous first messages cannot open two conversations.

pub mod store;


pub use store::{
    ConversationRecord, ConversationStore, ConversationSummary, InMemoryConversationStore,
    StoreSnapshot,
};

use crate::backend::{
    BackendError, ContactPerson, ConversationBackend, NewConversation, PriorMessage, SendOutcome,
};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Slack subtypes for edits and deletions; these never reach the backend
const EDIT_SUBTYPES: &[&str] = &["message_changed", "message_deleted"];

/// Stable identifier of a chat thread
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadKey(String);

impl ThreadKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where agent replies for a conversation are posted.
///
/// Captured when the conversation is opened and invoked when the backend's
/// webhook delivers a reply.
#[async_trait]
pub trait ReplyTarget: Send + Sync {
    /// Post `text` into the originating thread
    async fn post_reply(&self, text: &str) -> anyhow::Result<()>;

    /// Earlier messages in the thread, replayed into a new conversation
    async fn thread_history(&self) -> anyhow::Result<Vec<PriorMessage>> {
        Ok(Vec::new())
    }

    /// Short human-readable description (logs, state dump)
    fn describe(&self) -> String;
}

/// A chat message addressed to the bridge
#[derive(Clone)]
pub struct InboundMessage {
    pub thread: ThreadKey,
    pub user_id: String,
    pub text: String,
    /// Platform subtype, e.g. "message_changed"
    pub subtype: Option<String>,
    /// Set when the platform marks the author as a bot
    pub bot_id: Option<String>,
    pub contact: ContactPerson,
    pub reply: Arc<dyn ReplyTarget>,
}

/// Why an inbound message was dropped without touching the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Edited,
    FromBot,
    OwnMessage,
    EmptyText,
}

/// Result of handling an inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    Ignored(IgnoreReason),
    Delivered {
        conversation_id: String,
        /// A conversation was opened for this message
        created: bool,
        /// Conversation the backend reported as ended, if one was replaced
        replaced: Option<String>,
        response: SendOutcome,
    },
}

/// Webhook payload from the backend
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct OutboundPayload {
    #[serde(default)]
    pub content: Option<String>,
}

/// Result of handling an outbound (webhook) payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundOutcome {
    Delivered,
    /// Payload had no text to post
    Empty,
}

/// Bridge errors
#[derive(Debug)]
pub enum BridgeError {
    /// Backend call failed (after the single 401 retry)
    Backend(BackendError),
    /// Webhook names a conversation the bridge never opened
    UnknownConversation(String),
    /// Reply target failed to post
    Reply(anyhow::Error),
    /// Conversation store failed
    Store(anyhow::Error),
}

impl From<BackendError> for BridgeError {
    fn from(e: BackendError) -> Self {
        BridgeError::Backend(e)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Backend(e) => write!(f, "{}", e),
            BridgeError::UnknownConversation(id) => {
                write!(f, "No reply target for conversation '{}'", id)
            }
            BridgeError::Reply(e) => write!(f, "Failed to post reply: {}", e),
            BridgeError::Store(e) => write!(f, "Conversation store error: {}", e),
        }
    }
}

impl std::error::Error for BridgeError {}

/// Maps chat threads to backend conversations and moves messages both ways.
pub struct ConversationBridge {
    backend: Arc<dyn ConversationBackend>,
    store: Arc<dyn ConversationStore>,
    touchpoint_id: String,
    bot_user_id: Option<String>,
    thread_locks: DashMap<ThreadKey, Arc<Mutex<()>>>,
}

impl ConversationBridge {
    pub fn new(
        backend: Arc<dyn ConversationBackend>,
        store: Arc<dyn ConversationStore>,
        touchpoint_id: String,
        bot_user_id: Option<String>,
    ) -> Self {
        Self {
            backend,
            store,
            touchpoint_id,
            bot_user_id,
            thread_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Forward a chat message into the thread's backend conversation,
    /// opening (or re-opening) the conversation when needed.
    pub async fn handle_inbound(
        &self,
        message: InboundMessage,
    ) -> Result<InboundOutcome, BridgeError> {
        if let Some(reason) = self.ignore_reason(&message) {
            debug!(thread = %message.thread, ?reason, "Ignoring inbound message");
            return Ok(InboundOutcome::Ignored(reason));
        }

        let lease = self.thread_lock(&message.thread);
        let _guard = lease.lock.lock().await;
        self.deliver(&message).await
    }

    /// Post a backend reply into the thread that owns `conversation_id`
    pub async fn handle_outbound(
        &self,
        conversation_id: &str,
        payload: &OutboundPayload,
    ) -> Result<OutboundOutcome, BridgeError> {
        let record = self
            .store
            .record(conversation_id)
            .await
            .map_err(BridgeError::Store)?
            .ok_or_else(|| BridgeError::UnknownConversation(conversation_id.to_string()))?;

        let content = match payload.content.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text,
            _ => {
                debug!(conversation_id = %conversation_id, "Webhook payload has no content");
                return Ok(OutboundOutcome::Empty);
            }
        };

        record
            .reply
            .post_reply(content)
            .await
            .map_err(BridgeError::Reply)?;

        debug!(
            conversation_id = %conversation_id,
            thread = %record.thread,
            "Delivered agent reply"
        );
        Ok(OutboundOutcome::Delivered)
    }

    fn ignore_reason(&self, message: &InboundMessage) -> Option<IgnoreReason> {
        if let Some(subtype) = message.subtype.as_deref() {
            if EDIT_SUBTYPES.contains(&subtype) {
                return Some(IgnoreReason::Edited);
            }
            if subtype == "bot_message" {
                return Some(IgnoreReason::FromBot);
            }
        }
        if message.bot_id.is_some() {
            return Some(IgnoreReason::FromBot);
        }
        if self.bot_user_id.as_deref() == Some(message.user_id.as_str()) {
            return Some(IgnoreReason::OwnMessage);
        }
        if message.text.trim().is_empty() {
            return Some(IgnoreReason::EmptyText);
        }
        None
    }

    /// Body of `handle_inbound`; runs under the thread lock
    async fn deliver(&self, message: &InboundMessage) -> Result<InboundOutcome, BridgeError> {
        let bound = self
            .store
            .conversation_for_thread(&message.thread)
            .await
            .map_err(BridgeError::Store)?;

        let (conversation_id, created) = match bound {
            Some(id) => (id, false),
            None => (self.open_conversation(message).await?, true),
        };

        let response = self
            .backend
            .send_message(&conversation_id, &message.text)
            .await?;

        if !response.is_ended() {
            return Ok(InboundOutcome::Delivered {
                conversation_id,
                created,
                replaced: None,
                response,
            });
        }

        info!(
            thread = %message.thread,
            conversation_id = %conversation_id,
            "Backend ended the conversation, opening a new one"
        );
        let replacement = self.open_conversation(message).await?;
        let response = self
            .backend
            .send_message(&replacement, &message.text)
            .await?;

        if response.is_ended() {
            warn!(
                thread = %message.thread,
                conversation_id = %replacement,
                "Replacement conversation reported ended as well"
            );
        }

        Ok(InboundOutcome::Delivered {
            conversation_id: replacement,
            created: true,
            replaced: Some(conversation_id),
            response,
        })
    }

    /// Create a backend conversation for the message's thread and bind it,
    /// replacing whatever conversation the thread had.
    async fn open_conversation(&self, message: &InboundMessage) -> Result<String, BridgeError> {
        let prior_messages = match message.reply.thread_history().await {
            Ok(history) => history,
            Err(e) => {
                warn!(thread = %message.thread, error = %e, "Could not load thread history");
                Vec::new()
            }
        };

        let request = NewConversation {
            touchpoint_id: self.touchpoint_id.clone(),
            user_id: message.user_id.clone(),
            contact: message.contact.clone(),
            prior_messages,
        };
        let conversation = self.backend.create_conversation(&request).await?;

        let replaced = self
            .store
            .put(ConversationRecord {
                conversation_id: conversation.id.clone(),
                thread: message.thread.clone(),
                reply: Arc::clone(&message.reply),
                created_at: Utc::now(),
            })
            .await
            .map_err(BridgeError::Store)?;

        info!(
            thread = %message.thread,
            conversation_id = %conversation.id,
            replaced = ?replaced,
            "Opened backend conversation"
        );
        Ok(conversation.id)
    }

    fn thread_lock(&self, thread: &ThreadKey) -> ThreadLockLease<'_> {
        let lock = self
            .thread_locks
            .entry(thread.clone())
            .or_default()
            .value()
            .clone();
        ThreadLockLease {
            locks: &self.thread_locks,
            thread: thread.clone(),
            lock,
        }
    }

    #[cfg(test)]
    pub(crate) fn active_thread_locks(&self) -> usize {
        self.thread_locks.len()
    }
}

/// One task's claim on a thread lock. Dropping it, whether the task finished
/// or was cancelled while waiting, prunes the map entry once no other task
/// holds or waits on the same lock.
struct ThreadLockLease<'a> {
    locks: &'a DashMap<ThreadKey, Arc<Mutex<()>>>,
    thread: ThreadKey,
    lock: Arc<Mutex<()>>,
}

impl Drop for ThreadLockLease<'_> {
    fn drop(&mut self) {
        // Map entry plus this lease
        self.locks.remove_if(&self.thread, |_, lock| {
            Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2
        });
    }
}
