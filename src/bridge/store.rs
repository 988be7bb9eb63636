//! Thread ↔ conversation state.
//!
//! The bridge only talks to the [`ConversationStore`] trait, so the in-memory
//! implementation below can be swapped for a test double or a persistent
//! backend without touching the bridge.

use super::{ReplyTarget, ThreadKey};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One active backend conversation and where its replies go
#[derive(Clone)]
pub struct ConversationRecord {
    pub conversation_id: String,
    pub thread: ThreadKey,
    pub reply: Arc<dyn ReplyTarget>,
    pub created_at: DateTime<Utc>,
}

impl std::fmt::Debug for ConversationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationRecord")
            .field("conversation_id", &self.conversation_id)
            .field("thread", &self.thread)
            .field("reply", &self.reply.describe())
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Serializable view of a record (for the state endpoint)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationSummary {
    pub thread: String,
    pub reply_target: String,
    pub created_at: DateTime<Utc>,
}

/// Point-in-time dump of both maps
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreSnapshot {
    /// thread key -> conversation id
    pub threads: BTreeMap<String, String>,
    /// conversation id -> record summary
    pub conversations: BTreeMap<String, ConversationSummary>,
}

/// Storage for thread bindings and conversation records.
///
/// Invariant: at most one live conversation per thread, and every bound
/// conversation id has a record.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Conversation currently bound to `thread`
    async fn conversation_for_thread(&self, thread: &ThreadKey) -> Result<Option<String>>;

    /// Record for `conversation_id`
    async fn record(&self, conversation_id: &str) -> Result<Option<ConversationRecord>>;

    /// Bind `record.thread` to `record.conversation_id`, replacing any previous
    /// binding. The replaced conversation's record is dropped and its id
    /// returned.
    async fn put(&self, record: ConversationRecord) -> Result<Option<String>>;

    /// Drop a conversation record, and its thread binding if it still points here
    async fn remove(&self, conversation_id: &str) -> Result<Option<ConversationRecord>>;

    async fn snapshot(&self) -> Result<StoreSnapshot>;
}

/// Memory-resident store; state is lost on restart
#[derive(Default)]
pub struct InMemoryConversationStore {
    /// Primary storage: conversation_id -> record
    records: DashMap<String, ConversationRecord>,
    /// Secondary index: thread -> conversation_id
    bindings: DashMap<ThreadKey, String>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn conversation_for_thread(&self, thread: &ThreadKey) -> Result<Option<String>> {
        Ok(self.bindings.get(thread).map(|id| id.value().clone()))
    }

    async fn record(&self, conversation_id: &str) -> Result<Option<ConversationRecord>> {
        Ok(self.records.get(conversation_id).map(|r| r.value().clone()))
    }

    async fn put(&self, record: ConversationRecord) -> Result<Option<String>> {
        let conversation_id = record.conversation_id.clone();
        let thread = record.thread.clone();

        self.records.insert(conversation_id.clone(), record);
        let replaced = self
            .bindings
            .insert(thread, conversation_id.clone())
            .filter(|previous| *previous != conversation_id);

        if let Some(previous) = &replaced {
            self.records.remove(previous);
        }

        Ok(replaced)
    }

    async fn remove(&self, conversation_id: &str) -> Result<Option<ConversationRecord>> {
        let removed = self.records.remove(conversation_id).map(|(_, r)| r);
        if let Some(record) = &removed {
            self.bindings
                .remove_if(&record.thread, |_, bound| bound == conversation_id);
        }
        Ok(removed)
    }

    async fn snapshot(&self) -> Result<StoreSnapshot> {
        let threads = self
            .bindings
            .iter()
            .map(|entry| (entry.key().to_string(), entry.value().clone()))
            .collect();
        let conversations = self
            .records
            .iter()
            .map(|entry| {
                let record = entry.value();
                (
                    entry.key().clone(),
                    ConversationSummary {
                        thread: record.thread.to_string(),
                        reply_target: record.reply.describe(),
                        created_at: record.created_at,
                    },
                )
            })
            .collect();

        Ok(StoreSnapshot {
            threads,
            conversations,
        })
    }
}
