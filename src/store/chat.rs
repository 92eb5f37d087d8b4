//! Chat persistence collaborator

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::rest::{RestClient, RestError};

/// Stored chat line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub username: String,
    pub message_text: String,
    pub received_at: DateTime<Utc>,
}

/// New chat line for insertion
#[derive(Debug, Clone, Serialize)]
pub struct NewChatMessage {
    pub user_id: String,
    pub username: String,
    pub message_text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Rest(#[from] RestError),

    #[error("Chat store unavailable: {0}")]
    Unavailable(String),
}

/// Storage for chat messages, called from connection tasks only
pub trait ChatStore: Send + Sync {
    fn persist(&self, message: NewChatMessage) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Most recent `limit` messages, oldest first
    fn fetch_recent(&self, limit: usize) -> BoxFuture<'_, Result<Vec<ChatRecord>, StoreError>>;
}

/// Chat store backed by a PostgREST `chat_messages` table
pub struct RestChatStore {
    client: RestClient,
}

impl RestChatStore {
    const TABLE: &'static str = "chat_messages";

    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: RestClient::new(base_url, api_key, timeout),
        }
    }
}

impl ChatStore for RestChatStore {
    fn persist(&self, message: NewChatMessage) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.client.insert(Self::TABLE, &message).await?;
            Ok(())
        })
    }

    fn fetch_recent(&self, limit: usize) -> BoxFuture<'_, Result<Vec<ChatRecord>, StoreError>> {
        Box::pin(async move {
            let query = format!(
                "select=username,message_text,received_at&order=received_at.desc&limit={}",
                limit
            );
            let mut rows: Vec<ChatRecord> = self.client.get(Self::TABLE, &query).await?;
            rows.reverse();
            Ok(rows)
        })
    }
}

/// Bounded in-process chat history, used when no external store is configured
pub struct MemoryChatStore {
    messages: Mutex<VecDeque<ChatRecord>>,
    capacity: usize,
}

impl MemoryChatStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            messages: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }
}

impl ChatStore for MemoryChatStore {
    fn persist(&self, message: NewChatMessage) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let mut messages = self.messages.lock().await;
            if messages.len() == self.capacity {
                messages.pop_front();
            }
            messages.push_back(ChatRecord {
                username: message.username,
                message_text: message.message_text,
                received_at: Utc::now(),
            });
            Ok(())
        })
    }

    fn fetch_recent(&self, limit: usize) -> BoxFuture<'_, Result<Vec<ChatRecord>, StoreError>> {
        Box::pin(async move {
            let messages = self.messages.lock().await;
            let skip = messages.len().saturating_sub(limit);
            Ok(messages.iter().skip(skip).cloned().collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> NewChatMessage {
        NewChatMessage {
            user_id: "7".to_string(),
            username: "alice".to_string(),
            message_text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn recent_messages_are_oldest_first() {
        let store = MemoryChatStore::new(100);
        for text in ["one", "two", "three", "four"] {
            tokio_test::assert_ok!(store.persist(line(text)).await);
        }

        let recent = store.fetch_recent(2).await.unwrap();
        let texts: Vec<&str> = recent.iter().map(|r| r.message_text.as_str()).collect();
        assert_eq!(texts, vec!["three", "four"]);
    }

    #[tokio::test]
    async fn memory_store_is_bounded() {
        let store = MemoryChatStore::new(2);
        for text in ["a", "b", "c"] {
            store.persist(line(text)).await.unwrap();
        }
        let all = store.fetch_recent(10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message_text, "b");
    }
}
