//! Conversation store
//!
//! Per-conversation message history plus a single pending-action slot.
//! Every slot transition happens under the store's write lock, so a take
//! and a propose on the same conversation never interleave.

pub mod messages;

pub use messages::{ConversationMessage, MessageRole};

use crate::error::GatewayError;
use crate::mfa::PendingAction;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub history: Vec<ConversationMessage>,
    pub pending: Option<PendingAction>,
}

impl Conversation {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            history: Vec::new(),
            pending: None,
        }
    }
}

/// Result of atomically removing the staged action.
#[derive(Debug, Clone, PartialEq)]
pub enum TakeOutcome {
    Taken(PendingAction),
    Empty,
    /// The slot holds a different action than the caller expected; it is left staged.
    Superseded { current: Uuid },
}

/// Trait for conversation persistence
#[async_trait::async_trait]
pub trait ConversationStore: Send + Sync {
    /// Return the conversation for `id`, or a new one with a generated id
    /// when `id` is absent or unknown.
    async fn get_or_create(&self, id: Option<Uuid>) -> Conversation;
    async fn get(&self, id: Uuid) -> Option<Conversation>;
    async fn append_message(&self, id: Uuid, message: ConversationMessage) -> Result<()>;
    /// Overwrite the slot. Returns the action that was replaced, if any.
    async fn set_pending(&self, id: Uuid, action: Option<PendingAction>) -> Result<Option<PendingAction>>;
    async fn get_pending(&self, id: Uuid) -> Result<Option<PendingAction>>;
    /// Remove the staged action if it matches `expected` (or unconditionally when `None`).
    async fn take_pending(&self, id: Uuid, expected: Option<Uuid>) -> Result<TakeOutcome>;
    async fn remove(&self, id: Uuid) -> bool;
    /// Drop conversations idle past the configured TTL. Returns how many went.
    async fn evict_idle(&self) -> usize;
    async fn len(&self) -> usize;
}

struct Entry {
    conversation: Conversation,
    last_touched: Instant,
}

impl Entry {
    fn touch(&mut self) {
        self.last_touched = Instant::now();
        self.conversation.updated_at = Utc::now();
    }
}

/// In-memory conversation store
pub struct InMemoryConversationStore {
    conversations: Arc<RwLock<HashMap<Uuid, Entry>>>,
    idle_ttl: Option<Duration>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(RwLock::new(HashMap::new())),
            idle_ttl: None,
        }
    }

    pub fn with_idle_ttl(idle_ttl: Option<Duration>) -> Self {
        Self {
            idle_ttl,
            ..Self::new()
        }
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {

    async fn get_or_create(&self, id: Option<Uuid>) -> Conversation {
        let mut conversations = self.conversations.write().await;

        if let Some(entry) = id.and_then(|id| conversations.get_mut(&id)) {
            entry.last_touched = Instant::now();
            return entry.conversation.clone();
        }

        let conversation = Conversation::new();
        debug!(conversation_id = %conversation.id, requested = ?id, "Created conversation");

        conversations.insert(
            conversation.id,
            Entry {
                conversation: conversation.clone(),
                last_touched: Instant::now(),
            },
        );

        conversation
    }

    async fn get(&self, id: Uuid) -> Option<Conversation> {
        let conversations = self.conversations.read().await;
        conversations.get(&id).map(|e| e.conversation.clone())
    }

    async fn append_message(&self, id: Uuid, message: ConversationMessage) -> Result<()> {
        let mut conversations = self.conversations.write().await;
        let entry = conversations
            .get_mut(&id)
            .ok_or(GatewayError::ConversationNotFound(id))?;

        entry.conversation.history.push(message);
        entry.touch();
        Ok(())
    }

    async fn set_pending(&self, id: Uuid, action: Option<PendingAction>) -> Result<Option<PendingAction>> {
        let mut conversations = self.conversations.write().await;
        let entry = conversations
            .get_mut(&id)
            .ok_or(GatewayError::ConversationNotFound(id))?;

        let replaced = std::mem::replace(&mut entry.conversation.pending, action);
        entry.touch();
        Ok(replaced)
    }

    async fn get_pending(&self, id: Uuid) -> Result<Option<PendingAction>> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .get(&id)
            .and_then(|e| e.conversation.pending.clone()))
    }

    async fn take_pending(&self, id: Uuid, expected: Option<Uuid>) -> Result<TakeOutcome> {
        let mut conversations = self.conversations.write().await;
        let Some(entry) = conversations.get_mut(&id) else {
            return Ok(TakeOutcome::Empty);
        };

        let current = entry.conversation.pending.as_ref().map(|a| a.action_id);
        let outcome = match (current, expected) {
            (None, _) => TakeOutcome::Empty,
            (Some(current), Some(expected)) if current != expected => {
                TakeOutcome::Superseded { current }
            }
            _ => entry
                .conversation
                .pending
                .take()
                .map_or(TakeOutcome::Empty, TakeOutcome::Taken),
        };

        entry.touch();
        Ok(outcome)
    }

    async fn remove(&self, id: Uuid) -> bool {
        let mut conversations = self.conversations.write().await;
        conversations.remove(&id).is_some()
    }

    async fn evict_idle(&self) -> usize {
        let Some(ttl) = self.idle_ttl else {
            return 0;
        };

        let mut conversations = self.conversations.write().await;
        let before = conversations.len();
        conversations.retain(|_, entry| entry.last_touched.elapsed() < ttl);
        let evicted = before - conversations.len();

        if evicted > 0 {
            info!(evicted, remaining = conversations.len(), "Evicted idle conversations");
        }

        evicted
    }

    async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mfa::{SensitiveAction, TargetPayload};

    fn staged(webhook: &str) -> PendingAction {
        PendingAction::new(SensitiveAction::DeleteWebhookEndpoint(TargetPayload::new(webhook)))
    }

    #[tokio::test]
    async fn test_get_or_create_generates_ids() {
        let store = InMemoryConversationStore::new();

        let first = store.get_or_create(None).await;
        let again = store.get_or_create(Some(first.id)).await;
        assert_eq!(first.id, again.id);

        let requested = Uuid::new_v4();
        let fresh = store.get_or_create(Some(requested)).await;
        assert_ne!(fresh.id, requested);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_history_is_append_only_and_ordered() {
        let store = InMemoryConversationStore::new();
        let id = store.get_or_create(None).await.id;

        store.append_message(id, ConversationMessage::user("transfers list")).await.unwrap();
        store
            .append_message(id, ConversationMessage::agent("succeeded with status 200", "result"))
            .await
            .unwrap();

        let conversation = store.get(id).await.unwrap();
        assert_eq!(conversation.history.len(), 2);
        assert_eq!(conversation.history[0].content, "transfers list");
        assert_eq!(conversation.history[1].role, MessageRole::Agent);
    }

    #[tokio::test]
    async fn test_unknown_conversation_errors_on_write() {
        let store = InMemoryConversationStore::new();
        let unknown = Uuid::new_v4();

        assert!(matches!(
            store.append_message(unknown, ConversationMessage::user("x")).await,
            Err(GatewayError::ConversationNotFound(_))
        ));
        assert!(store.set_pending(unknown, Some(staged("we_1"))).await.is_err());
        assert!(store.get_pending(unknown).await.unwrap().is_none());
        assert_eq!(store.take_pending(unknown, None).await.unwrap(), TakeOutcome::Empty);
    }

    #[tokio::test]
    async fn test_set_pending_overwrites() {
        let store = InMemoryConversationStore::new();
        let id = store.get_or_create(None).await.id;

        let first = staged("we_1");
        let second = staged("we_2");

        assert!(store.set_pending(id, Some(first.clone())).await.unwrap().is_none());
        let replaced = store.set_pending(id, Some(second.clone())).await.unwrap();
        assert_eq!(replaced.map(|a| a.action_id), Some(first.action_id));
        assert_eq!(
            store.get_pending(id).await.unwrap().map(|a| a.action_id),
            Some(second.action_id)
        );
    }

    #[tokio::test]
    async fn test_take_pending_is_exactly_once() {
        let store = InMemoryConversationStore::new();
        let id = store.get_or_create(None).await.id;
        let action = staged("we_1");
        store.set_pending(id, Some(action.clone())).await.unwrap();

        assert_eq!(
            store.take_pending(id, Some(action.action_id)).await.unwrap(),
            TakeOutcome::Taken(action)
        );
        assert_eq!(store.take_pending(id, None).await.unwrap(), TakeOutcome::Empty);
    }

    #[tokio::test]
    async fn test_take_pending_detects_superseded_stage() {
        let store = InMemoryConversationStore::new();
        let id = store.get_or_create(None).await.id;

        let first = staged("we_1");
        let second = staged("we_2");
        store.set_pending(id, Some(first.clone())).await.unwrap();
        store.set_pending(id, Some(second.clone())).await.unwrap();

        assert_eq!(
            store.take_pending(id, Some(first.action_id)).await.unwrap(),
            TakeOutcome::Superseded {
                current: second.action_id
            }
        );
        assert!(store.get_pending(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_takes_execute_once() {
        let store = Arc::new(InMemoryConversationStore::new());
        let id = store.get_or_create(None).await.id;
        store.set_pending(id, Some(staged("we_1"))).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.take_pending(id, None).await }));
        }

        let mut taken = 0;
        for handle in handles {
            if let TakeOutcome::Taken(_) = handle.await.unwrap().unwrap() {
                taken += 1;
            }
        }
        assert_eq!(taken, 1);
    }

    #[tokio::test]
    async fn test_idle_eviction() {
        let store = InMemoryConversationStore::with_idle_ttl(Some(Duration::ZERO));
        store.get_or_create(None).await;
        store.get_or_create(None).await;
        assert_eq!(store.evict_idle().await, 2);
        assert_eq!(store.len().await, 0);

        let store = InMemoryConversationStore::with_idle_ttl(Some(Duration::from_secs(3600)));
        store.get_or_create(None).await;
        assert_eq!(store.evict_idle().await, 0);

        let store = InMemoryConversationStore::new();
        store.get_or_create(None).await;
        assert_eq!(store.evict_idle().await, 0);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = InMemoryConversationStore::new();
        let id = store.get_or_create(None).await.id;
        assert!(store.remove(id).await);
        assert!(!store.remove(id).await);
        assert!(store.get(id).await.is_none());
    }
}
