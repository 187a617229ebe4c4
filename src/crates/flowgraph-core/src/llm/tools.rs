//! Tool contract for LLM function calling
//!
//! A [`ToolDescriptor`] pairs the schema a model sees (name, description,
//! JSON input schema) with the async executor the workflow invokes when the
//! model requests the call. Descriptors are shared across LLM vertices via
//! `Arc` and must be internally thread-safe; the scheduler does not
//! serialize tool calls.
//!
//! # Defining a tool
//!
//! ```rust
//! use flowgraph_core::llm::tools::ToolDescriptor;
//! use serde_json::json;
//!
//! let echo = ToolDescriptor::new(
//!     "echo",
//!     "Return the arguments unchanged",
//!     json!({"type": "object", "properties": {"text": {"type": "string"}}}),
//!     |args| Box::pin(async move { Ok(args) }),
//! );
//! assert_eq!(echo.name, "echo");
//! ```

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Future returned by a tool executor.
pub type ToolFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// Async tool implementation: arguments in, result value out.
pub type ToolExecutor = Arc<dyn Fn(Value) -> ToolFuture + Send + Sync>;

/// A callable tool: the schema shown to the model plus its executor.
#[derive(Clone)]
pub struct ToolDescriptor {
    /// Name the model uses to request this tool
    pub name: String,
    /// Natural-language description shown to the model
    pub description: String,
    /// JSON Schema for the arguments object
    pub input_schema: Value,
    /// The implementation invoked on a tool call
    pub executor: ToolExecutor,
}

impl ToolDescriptor {
    /// Create a descriptor from an executor closure.
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        executor: F,
    ) -> Self
    where
        F: Fn(Value) -> ToolFuture + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            executor: Arc::new(executor),
        }
    }

    /// Invoke the tool with already-validated arguments.
    pub async fn invoke(&self, args: Value) -> Result<Value> {
        (self.executor)(args).await
    }

    /// Validate arguments against `input_schema`.
    ///
    /// With the `json-validation` feature the schema is enforced with the
    /// `jsonschema` crate; without it only the top-level shape is checked
    /// (arguments must be an object when the schema declares one).
    pub fn validate_args(&self, args: &Value) -> Result<()> {
        #[cfg(feature = "json-validation")]
        {
            let compiled = jsonschema::JSONSchema::compile(&self.input_schema)
                .map_err(|e| FlowError::tool(&self.name, format!("invalid schema: {e}")))?;
            if let Err(errors) = compiled.validate(args) {
                let detail = errors.map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
                return Err(FlowError::tool(&self.name, format!("arguments rejected: {detail}")));
            }
            Ok(())
        }
        #[cfg(not(feature = "json-validation"))]
        {
            let declares_object = self.input_schema.get("type").and_then(Value::as_str)
                == Some("object");
            if declares_object && !args.is_object() {
                return Err(FlowError::tool(
                    &self.name,
                    "arguments must be a JSON object",
                ));
            }
            Ok(())
        }
    }

    /// The schema-only view sent to providers.
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .field("executor", &"<function>")
            .finish()
    }
}

/// Schema-only tool description serialized into provider requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON Schema for arguments
    pub input_schema: Value,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id (pairs the result message to the request)
    pub id: String,
    /// Tool name
    pub name: String,
    /// Arguments object
    pub arguments: Value,
}

impl ToolCall {
    /// Create a call record.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One completed tool invocation in an LLM vertex's output trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolTraceEntry {
    /// Tool name
    pub name: String,
    /// Arguments the model supplied
    pub args: Value,
    /// Result value on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error description on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolTraceEntry {
    /// Record a successful invocation.
    pub fn success(name: impl Into<String>, args: Value, result: Value) -> Self {
        Self {
            name: name.into(),
            args,
            result: Some(result),
            error: None,
        }
    }

    /// Record a failed invocation.
    pub fn failure(name: impl Into<String>, args: Value, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args,
            result: None,
            error: Some(error.into()),
        }
    }

    /// True when the invocation succeeded.
    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

/// Collection of tools addressable by name.
///
/// LLM vertices hold their tool lists directly; the registry exists for
/// callers that assemble graphs from a shared tool set.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: ToolDescriptor) {
        self.tools.insert(tool.name.clone(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    /// Whether a tool with this name is registered.
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// All registered names, sorted.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// All descriptors, for handing to an LLM vertex.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().cloned().collect()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .finish()
    }
}
