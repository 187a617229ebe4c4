//! The model provider contract
//!
//! The core is an orchestration library, not an LLM client: concrete
//! transports (HTTP SDKs, local runtimes) live outside and implement
//! [`ModelProvider`]. The contract is deliberately one method returning a
//! stream of [`ModelDelta`]s; providers that do not stream return a
//! one-shot stream carrying the complete turn in a single delta.
//!
//! # Errors
//!
//! Provider failures must map onto the typed variants
//! [`FlowError::ProviderTransport`](crate::error::FlowError::ProviderTransport),
//! [`FlowError::ProviderRateLimit`](crate::error::FlowError::ProviderRateLimit),
//! [`FlowError::ProviderInvalidRequest`](crate::error::FlowError::ProviderInvalidRequest)
//! or [`FlowError::Cancelled`](crate::error::FlowError::Cancelled). The
//! scheduler surfaces them without retrying; callers that want retries wrap
//! the call (the `tooling` crate ships a backoff helper).
//!
//! # Implementing a provider
//!
//! ```rust,ignore
//! use flowgraph_core::llm::{DeltaStream, ModelDelta, ModelProvider, ModelRequest};
//! use async_trait::async_trait;
//!
//! struct OneShot;
//!
//! #[async_trait]
//! impl ModelProvider for OneShot {
//!     async fn invoke(&self, _request: ModelRequest) -> flowgraph_core::Result<DeltaStream> {
//!         let deltas = vec![Ok(ModelDelta::content("done"))];
//!         Ok(Box::pin(futures::stream::iter(deltas)))
//!     }
//! }
//! ```

use crate::error::Result;
use crate::llm::config::ModelRequest;
use crate::llm::response::ModelDelta;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// Stream of response chunks from one provider call.
///
/// Dropping the stream closes the underlying transport; the LLM vertex
/// relies on this to abort in-flight calls on cancellation.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<ModelDelta>> + Send>>;

/// A chat-completion backend.
///
/// Implementations must be `Send + Sync`; one provider instance is shared
/// across every LLM vertex that references it, potentially from concurrent
/// workers.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Start one model call and return its delta stream.
    ///
    /// When `request.stream` is false, implementations should still return
    /// a stream: one delta carrying the full content, tool calls, finish
    /// reason and usage.
    async fn invoke(&self, request: ModelRequest) -> Result<DeltaStream>;

    /// Human-readable provider name for logging and events.
    fn name(&self) -> &str {
        "model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::response::FinishReason;
    use crate::messages::Message;
    use futures::StreamExt;

    struct OneShot;

    #[async_trait]
    impl ModelProvider for OneShot {
        async fn invoke(&self, _request: ModelRequest) -> Result<DeltaStream> {
            let deltas = vec![
                Ok(ModelDelta::content("done")),
                Ok(ModelDelta::finished(FinishReason::Stop)),
            ];
            Ok(Box::pin(futures::stream::iter(deltas)))
        }
    }

    #[tokio::test]
    async fn test_trait_object_streaming() {
        let provider: Box<dyn ModelProvider> = Box::new(OneShot);
        let request = ModelRequest::new(vec![Message::user("hi")]);

        let mut stream = provider.invoke(request).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.content.as_deref(), Some("done"));

        let last = stream.next().await.unwrap().unwrap();
        assert_eq!(last.finish_reason, Some(FinishReason::Stop));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_default_name() {
        let provider = OneShot;
        assert_eq!(provider.name(), "model");
    }
}
