//! Conversation memory contract
//!
//! Memory is addressed by user identity: append-only conversation history
//! plus a small TTL'd key/value context space per user. The core depends
//! only on the [`ConversationMemory`] surface; implementations may be
//! in-memory, file-backed or network-backed. [`InMemoryMemory`] is the
//! bundled reference implementation used by tests and local runs.
//!
//! # Example
//!
//! ```rust
//! use flowgraph_core::memory::{ConversationMemory, InMemoryMemory};
//! use flowgraph_core::messages::MessageRole;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> flowgraph_core::Result<()> {
//! let memory = InMemoryMemory::new();
//! memory.append("alice", MessageRole::User, "hello").await?;
//! memory.append("alice", MessageRole::Assistant, "hi there").await?;
//!
//! let recent = memory.recent("alice", 10).await?;
//! assert_eq!(recent.len(), 2);
//! assert_eq!(recent[0].content, "hello");
//! # Ok(())
//! # }
//! ```

use crate::error::Result;
use crate::messages::MessageRole;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// One remembered conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Author role
    pub role: MessageRole,
    /// Message text
    pub content: String,
    /// Append time
    pub ts: DateTime<Utc>,
}

/// Conversation history and per-user context, concurrency-safe.
///
/// The scheduler places no locks around memory access; implementations
/// must be internally safe under concurrent readers and writers.
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    /// Append one turn to a user's history.
    async fn append(&self, user_id: &str, role: MessageRole, content: &str) -> Result<()>;

    /// The most recent `n` turns for a user, oldest first.
    async fn recent(&self, user_id: &str, n: usize) -> Result<Vec<MemoryEntry>>;

    /// Set a context value for a user, optionally expiring after `ttl`.
    async fn ctx_set(
        &self,
        user_id: &str,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Read a context value for a user; expired values read as `None`.
    async fn ctx_get(&self, user_id: &str, key: &str) -> Result<Option<Value>>;
}

#[derive(Debug, Clone)]
struct ContextSlot {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct UserMemory {
    history: Vec<MemoryEntry>,
    context: HashMap<String, ContextSlot>,
}

/// Process-local [`ConversationMemory`] backed by a `tokio::sync::RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryMemory {
    users: RwLock<HashMap<String, UserMemory>>,
}

impl InMemoryMemory {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of turns stored for a user.
    pub async fn history_len(&self, user_id: &str) -> usize {
        self.users
            .read()
            .await
            .get(user_id)
            .map_or(0, |u| u.history.len())
    }
}

#[async_trait]
impl ConversationMemory for InMemoryMemory {
    async fn append(&self, user_id: &str, role: MessageRole, content: &str) -> Result<()> {
        let mut users = self.users.write().await;
        users.entry(user_id.to_string()).or_default().history.push(MemoryEntry {
            role,
            content: content.to_string(),
            ts: Utc::now(),
        });
        Ok(())
    }

    async fn recent(&self, user_id: &str, n: usize) -> Result<Vec<MemoryEntry>> {
        let users = self.users.read().await;
        let history = users.get(user_id).map(|u| u.history.as_slice()).unwrap_or(&[]);
        let start = history.len().saturating_sub(n);
        Ok(history[start..].to_vec())
    }

    async fn ctx_set(
        &self,
        user_id: &str,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let expires_at = ttl.and_then(|d| {
            chrono::Duration::from_std(d).ok().map(|delta| Utc::now() + delta)
        });
        let mut users = self.users.write().await;
        users.entry(user_id.to_string()).or_default().context.insert(
            key.to_string(),
            ContextSlot { value, expires_at },
        );
        Ok(())
    }

    async fn ctx_get(&self, user_id: &str, key: &str) -> Result<Option<Value>> {
        let users = self.users.read().await;
        let slot = users.get(user_id).and_then(|u| u.context.get(key));
        Ok(slot.and_then(|slot| match slot.expires_at {
            Some(deadline) if Utc::now() >= deadline => None,
            _ => Some(slot.value.clone()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_append_and_recent_order() {
        let memory = InMemoryMemory::new();
        memory.append("u", MessageRole::User, "one").await.unwrap();
        memory.append("u", MessageRole::Assistant, "two").await.unwrap();
        memory.append("u", MessageRole::User, "three").await.unwrap();

        let recent = memory.recent("u", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "two");
        assert_eq!(recent[1].content, "three");
    }

    #[tokio::test]
    async fn test_users_are_isolated() {
        let memory = InMemoryMemory::new();
        memory.append("a", MessageRole::User, "hi").await.unwrap();

        assert_eq!(memory.recent("b", 10).await.unwrap().len(), 0);
        assert_eq!(memory.history_len("a").await, 1);
    }

    #[tokio::test]
    async fn test_ctx_roundtrip() {
        let memory = InMemoryMemory::new();
        memory.ctx_set("u", "summary", json!("short"), None).await.unwrap();
        assert_eq!(memory.ctx_get("u", "summary").await.unwrap(), Some(json!("short")));
        assert_eq!(memory.ctx_get("u", "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ctx_ttl_expiry() {
        let memory = InMemoryMemory::new();
        memory
            .ctx_set("u", "flash", json!(1), Some(Duration::from_millis(0)))
            .await
            .unwrap();
        assert_eq!(memory.ctx_get("u", "flash").await.unwrap(), None);

        memory
            .ctx_set("u", "keep", json!(2), Some(Duration::from_secs(3600)))
            .await
            .unwrap();
        assert_eq!(memory.ctx_get("u", "keep").await.unwrap(), Some(json!(2)));
    }
}
