//! Memory reader and writer vertices
//!
//! Adapters over the [`ConversationMemory`] contract. The reader surfaces
//! recent history into the data flow; the writer appends one turn and may
//! run an optional summarize hook afterwards, storing the produced summary
//! in the user's context space under the `"summary"` key.

use crate::error::{FlowError, Result};
use crate::memory::{ConversationMemory, MemoryEntry};
use crate::messages::MessageRole;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Configuration for a MemoryReader vertex.
#[derive(Clone)]
pub struct MemoryReaderConfig {
    /// The memory backend
    pub memory: Arc<dyn ConversationMemory>,
    /// Input key holding the user identity
    pub user_var: String,
    /// How many recent turns to read
    pub count: usize,
}

impl MemoryReaderConfig {
    /// Read the last 20 turns for the user named by the `"user_id"` input.
    pub fn new(memory: Arc<dyn ConversationMemory>) -> Self {
        Self {
            memory,
            user_var: "user_id".to_string(),
            count: 20,
        }
    }

    /// Change how many turns are read.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }
}

impl std::fmt::Debug for MemoryReaderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryReaderConfig")
            .field("user_var", &self.user_var)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

pub(crate) async fn run_reader(
    vertex_id: &str,
    config: &MemoryReaderConfig,
    inputs: Map<String, Value>,
) -> Result<Value> {
    let user_id = required_str(vertex_id, &inputs, &config.user_var)?;
    let entries = config.memory.recent(user_id, config.count).await?;
    Ok(json!({ "history": entries }))
}

/// Future returned by a summarize hook.
pub type SummarizeFuture = Pin<Box<dyn Future<Output = Result<Option<String>>> + Send>>;

/// Optional rule run by the writer after appending: given the recent
/// history it may produce a summary to store, or `None` to store nothing.
pub type SummarizeRule = Arc<dyn Fn(Vec<MemoryEntry>) -> SummarizeFuture + Send + Sync>;

/// Configuration for a MemoryWriter vertex.
#[derive(Clone)]
pub struct MemoryWriterConfig {
    /// The memory backend
    pub memory: Arc<dyn ConversationMemory>,
    /// Input key holding the user identity
    pub user_var: String,
    /// Input key holding the turn text
    pub content_var: String,
    /// Role recorded for the turn
    pub role: MessageRole,
    /// Optional post-append summarization
    pub summarize: Option<SummarizeRule>,
}

impl MemoryWriterConfig {
    /// Append the `"content"` input as a user turn for `"user_id"`.
    pub fn new(memory: Arc<dyn ConversationMemory>) -> Self {
        Self {
            memory,
            user_var: "user_id".to_string(),
            content_var: "content".to_string(),
            role: MessageRole::User,
            summarize: None,
        }
    }

    /// Record turns under a different role.
    pub fn with_role(mut self, role: MessageRole) -> Self {
        self.role = role;
        self
    }

    /// Attach a summarize hook.
    pub fn with_summarize<F>(mut self, rule: F) -> Self
    where
        F: Fn(Vec<MemoryEntry>) -> SummarizeFuture + Send + Sync + 'static,
    {
        self.summarize = Some(Arc::new(rule));
        self
    }
}

impl std::fmt::Debug for MemoryWriterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWriterConfig")
            .field("user_var", &self.user_var)
            .field("content_var", &self.content_var)
            .field("role", &self.role)
            .field("summarize", &self.summarize.as_ref().map(|_| "<hook>"))
            .finish_non_exhaustive()
    }
}

pub(crate) async fn run_writer(
    vertex_id: &str,
    config: &MemoryWriterConfig,
    inputs: Map<String, Value>,
) -> Result<Value> {
    let user_id = required_str(vertex_id, &inputs, &config.user_var)?;
    let content = required_str(vertex_id, &inputs, &config.content_var)?;

    config.memory.append(user_id, config.role, content).await?;

    let mut out = Map::new();
    out.insert("appended".to_string(), json!(true));

    if let Some(rule) = &config.summarize {
        let recent = config.memory.recent(user_id, 50).await?;
        if let Some(summary) = rule(recent).await? {
            config
                .memory
                .ctx_set(user_id, "summary", json!(summary), None)
                .await?;
            out.insert("summary".to_string(), json!(summary));
        }
    }
    Ok(Value::Object(out))
}

fn required_str<'a>(
    vertex_id: &str,
    inputs: &'a Map<String, Value>,
    var: &str,
) -> Result<&'a str> {
    inputs.get(var).and_then(Value::as_str).ok_or_else(|| FlowError::MissingDependency {
        vertex: vertex_id.to_string(),
        dependency: format!("input.{var}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryMemory;

    fn map(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let memory = Arc::new(InMemoryMemory::new());
        let writer = MemoryWriterConfig::new(Arc::clone(&memory) as Arc<dyn ConversationMemory>);
        let reader = MemoryReaderConfig::new(Arc::clone(&memory) as Arc<dyn ConversationMemory>);

        let out = run_writer(
            "w",
            &writer,
            map(&[("user_id", json!("alice")), ("content", json!("hello"))]),
        )
        .await
        .unwrap();
        assert_eq!(out["appended"], json!(true));
        assert!(out.get("summary").is_none());

        let out = run_reader("r", &reader, map(&[("user_id", json!("alice"))]))
            .await
            .unwrap();
        let history = out["history"].as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["content"], json!("hello"));
        assert_eq!(history[0]["role"], json!("user"));
    }

    #[tokio::test]
    async fn test_writer_missing_content() {
        let memory = Arc::new(InMemoryMemory::new());
        let writer = MemoryWriterConfig::new(memory as Arc<dyn ConversationMemory>);
        let result = run_writer("w", &writer, map(&[("user_id", json!("alice"))])).await;
        match result {
            Err(FlowError::MissingDependency { dependency, .. }) => assert_eq!(dependency, "input.content"),
            other => panic!("expected MissingDependency, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_summarize_hook_stores_context() {
        let memory = Arc::new(InMemoryMemory::new());
        let writer = MemoryWriterConfig::new(Arc::clone(&memory) as Arc<dyn ConversationMemory>)
            .with_role(MessageRole::Assistant)
            .with_summarize(|entries| {
                Box::pin(async move { Ok(Some(format!("{} turns", entries.len()))) })
            });

        let out = run_writer(
            "w",
            &writer,
            map(&[("user_id", json!("bob")), ("content", json!("reply"))]),
        )
        .await
        .unwrap();
        assert_eq!(out["summary"], json!("1 turns"));
        assert_eq!(
            memory.ctx_get("bob", "summary").await.unwrap(),
            Some(json!("1 turns"))
        );
    }
}
