//! Chat message model shared by the LLM vertex and conversation memory
//!
//! Messages are plain data: a role, content that is either a single text
//! block or a list of multimodal parts, and optional tool-call records.
//! The LLM vertex assembles a `Vec<Message>` per provider call (system
//! prompt, conversation history, templated user message, then alternating
//! assistant/tool messages while the tool loop runs).
//!
//! # Examples
//!
//! ```rust
//! use flowgraph_core::messages::{Message, MessageRole};
//!
//! let msg = Message::user("summarize this document");
//! assert_eq!(msg.role, MessageRole::User);
//! assert_eq!(msg.text(), Some("summarize this document"));
//! ```

use crate::llm::tools::ToolCall;
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Instructions that frame the conversation
    System,
    /// End-user input
    User,
    /// Model output
    Assistant,
    /// Result of a tool invocation, paired to a tool call by id
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::Tool => "tool",
        };
        f.write_str(s)
    }
}

/// One part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text segment
    Text {
        /// The text content
        text: String,
    },
    /// Image referenced by URL (providers fetch or inline as they see fit)
    ImageUrl {
        /// Image location
        url: String,
    },
}

/// Message content: plain text or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Single text block
    Text(String),
    /// Multimodal parts in display order
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// The text of a `Text` content, or the concatenated text parts.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(t) => Some(t),
            MessageContent::Parts(_) => None,
        }
    }
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Author role
    pub role: MessageRole,
    /// Text or multimodal content
    pub content: MessageContent,
    /// Tool calls requested by an assistant message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// For `Tool` messages, the id of the call this result answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Build a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new_text(MessageRole::System, content)
    }

    /// Build a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new_text(MessageRole::User, content)
    }

    /// Build a plain assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new_text(MessageRole::Assistant, content)
    }

    /// Build an assistant message carrying tool-call requests.
    pub fn assistant_with_tool_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(calls),
            ..Self::new_text(MessageRole::Assistant, content)
        }
    }

    /// Build a tool-result message answering `call_id`.
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::new_text(MessageRole::Tool, content)
        }
    }

    /// Build a multimodal user message from parts.
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Parts(parts),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    fn new_text(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// The message text, when the content is a single text block.
    pub fn text_content(&self) -> Option<&str> {
        self.content.as_text()
    }

    /// Alias kept short for the common case.
    pub fn text(&self) -> Option<&str> {
        self.content.as_text()
    }

    /// Parse a `{role, content}` JSON object into a message.
    ///
    /// Used when conversation history arrives through a binding as raw JSON.
    /// Content may be a string or a list of parts.
    pub fn from_history_value(value: &serde_json::Value) -> Option<Self> {
        let role = match value.get("role")?.as_str()? {
            "system" => MessageRole::System,
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            "tool" => MessageRole::Tool,
            _ => return None,
        };
        let content = value.get("content")?;
        let content = if let Some(text) = content.as_str() {
            MessageContent::Text(text.to_string())
        } else {
            MessageContent::Parts(serde_json::from_value(content.clone()).ok()?)
        };
        Some(Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constructors() {
        let m = Message::system("you are terse");
        assert_eq!(m.role, MessageRole::System);
        assert_eq!(m.text(), Some("you are terse"));
        assert!(m.tool_calls.is_none());

        let t = Message::tool("call-1", "{\"ok\":true}");
        assert_eq!(t.role, MessageRole::Tool);
        assert_eq!(t.tool_call_id.as_deref(), Some("call-1"));
    }

    #[test]
    fn test_multimodal_parts() {
        let m = Message::user_parts(vec![
            ContentPart::Text { text: "what is in this image?".to_string() },
            ContentPart::ImageUrl { url: "https://example.com/cat.png".to_string() },
        ]);
        assert!(m.text().is_none());
        match &m.content {
            MessageContent::Parts(parts) => assert_eq!(parts.len(), 2),
            MessageContent::Text(_) => panic!("expected parts"),
        }
    }

    #[test]
    fn test_from_history_value() {
        let m = Message::from_history_value(&json!({"role": "assistant", "content": "hi"})).unwrap();
        assert_eq!(m.role, MessageRole::Assistant);
        assert_eq!(m.text(), Some("hi"));

        let m = Message::from_history_value(&json!({
            "role": "user",
            "content": [{"type": "text", "text": "look"}]
        }))
        .unwrap();
        assert!(matches!(m.content, MessageContent::Parts(_)));

        assert!(Message::from_history_value(&json!({"role": "robot", "content": "x"})).is_none());
    }

    #[test]
    fn test_role_serialization() {
        let v = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"], "hi");
    }
}
