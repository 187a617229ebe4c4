//! LLM integration: provider contract, request/response types, tools
//!
//! The core depends on model providers only through the
//! [`ModelProvider`] trait; everything else in this module is the data
//! vocabulary of that contract: [`ModelRequest`] going in,
//! [`ModelDelta`] chunks coming out, [`ToolDescriptor`]s describing what
//! the model may call.

pub mod config;
pub mod response;
pub mod tools;
pub mod traits;

pub use config::ModelRequest;
pub use response::{FinishReason, ModelDelta, ModelTurn, ToolCallDelta, TurnAccumulator, UsageMetadata};
pub use tools::{ToolCall, ToolDefinition, ToolDescriptor, ToolExecutor, ToolFuture, ToolRegistry, ToolTraceEntry};
pub use traits::{DeltaStream, ModelProvider};
