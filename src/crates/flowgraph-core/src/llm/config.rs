//! Provider request configuration
//!
//! [`ModelRequest`] is the single argument to
//! [`ModelProvider::invoke`](crate::llm::traits::ModelProvider::invoke),
//! built fluently:
//!
//! ```rust
//! use flowgraph_core::llm::ModelRequest;
//! use flowgraph_core::messages::Message;
//!
//! let request = ModelRequest::new(vec![Message::user("hi")])
//!     .with_temperature(0.2)
//!     .with_max_tokens(512)
//!     .with_stream(true);
//! assert_eq!(request.temperature, Some(0.2));
//! ```

use crate::llm::tools::ToolDefinition;
use crate::messages::Message;
use serde::{Deserialize, Serialize};

/// One provider call: messages plus sampling and feature switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Full conversation for this call, system message first
    pub messages: Vec<Message>,
    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Output token cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Request incremental deltas rather than a single response
    pub stream: bool,
    /// Ask the provider to surface reasoning deltas separately
    pub reasoning: bool,
}

impl ModelRequest {
    /// Create a request with default sampling.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            temperature: None,
            max_tokens: None,
            stream: false,
            reasoning: false,
        }
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Cap generated tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Attach tool definitions.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Toggle streaming delivery.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Toggle separated reasoning deltas.
    pub fn with_reasoning(mut self, reasoning: bool) -> Self {
        self.reasoning = reasoning;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let req = ModelRequest::new(vec![Message::user("hi")]);
        assert!(req.tools.is_empty());
        assert!(!req.stream);
        assert!(!req.reasoning);
        assert!(req.temperature.is_none());
    }

    #[test]
    fn test_builder_chaining() {
        let req = ModelRequest::new(vec![])
            .with_temperature(0.7)
            .with_max_tokens(100)
            .with_stream(true)
            .with_reasoning(true);
        assert_eq!(req.temperature, Some(0.7));
        assert_eq!(req.max_tokens, Some(100));
        assert!(req.stream);
        assert!(req.reasoning);
    }
}
