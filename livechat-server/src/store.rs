//! Durable message persistence seam.
//!
//! [`MessageStore`] is the boundary to whatever document store holds chat
//! history; it is the source of truth for messages. The live push path runs
//! only after [`MessageStore::create`] returned successfully.
//! [`InMemoryMessageStore`] backs the default server and the tests.

use async_trait::async_trait;
use livechat_proto::{ChatMessage, MessageBody, MessageId, Timestamp, UserId};
use tokio::sync::RwLock;

/// Errors reported by a message store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not complete the operation.
    #[error("message store unavailable: {0}")]
    Unavailable(String),
}

/// A message accepted by the API but not yet persisted.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Authenticated sender.
    pub sender_id: UserId,
    /// Addressed recipient.
    pub receiver_id: UserId,
    /// Validated content; never empty.
    pub body: MessageBody,
}

/// Persistence boundary for chat messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persists a message, assigning its id and creation timestamp.
    async fn create(&self, message: NewMessage) -> Result<ChatMessage, StoreError>;

    /// Returns every message exchanged between `a` and `b`, oldest first.
    async fn find_between(&self, a: &UserId, b: &UserId) -> Result<Vec<ChatMessage>, StoreError>;
}

/// Append-only in-memory history.
///
/// Thread-safe via [`RwLock`]. Insertion order is creation order, so reads
/// are chronological without sorting.
#[derive(Debug, Default)]
pub struct InMemoryMessageStore {
    messages: RwLock<Vec<ChatMessage>>,
}

impl InMemoryMessageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of stored messages.
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    /// Returns `true` if nothing has been stored.
    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create(&self, message: NewMessage) -> Result<ChatMessage, StoreError> {
        let mut messages = self.messages.write().await;
        // Stamped under the write guard so append order matches `created_at`.
        let stored = ChatMessage {
            id: MessageId::new(),
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            body: message.body,
            created_at: Timestamp::now(),
        };
        messages.push(stored.clone());
        Ok(stored)
    }

    async fn find_between(&self, a: &UserId, b: &UserId) -> Result<Vec<ChatMessage>, StoreError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|m| m.is_between(a, b))
            .cloned()
            .collect())
    }
}
