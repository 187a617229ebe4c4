//! Error types for workflow construction and execution
//!
//! All errors surface through a single [`FlowError`] enum, implemented with
//! `thiserror`. The taxonomy splits into three groups:
//!
//! ```text
//! FlowError
//! ├── construction (validate() refuses to run the graph)
//! │     CycleDetected, DanglingEdge, ExposedOutputMissing,
//! │     DuplicateVertexId, InvalidBinding
//! ├── runtime (fail a single vertex)
//! │     MissingDependency, MissingTemplateVariable,
//! │     ProviderTransport, ProviderRateLimit, ProviderInvalidRequest,
//! │     ToolInvocation, ToolLoopExhausted, ConditionEvaluation, Task
//! └── terminal (fail the whole run)
//!       Cancelled, UnhandledVertexFailure
//! ```
//!
//! Construction errors abort [`Workflow::validate`](crate::graph::Workflow::validate);
//! runtime errors fail the offending vertex, mark downstream-only dependents
//! as skipped, and fail the run unless an `OnError`-guarded edge covers the
//! failure. Every runtime error is reported both as a
//! [`VertexFailed`](crate::event::EventKind::VertexFailed) event and in the
//! final [`RunResult::errors`](crate::scheduler::RunResult) list.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FlowError>;

/// All errors produced by graph construction, validation and execution.
#[derive(Debug, Error, Clone)]
pub enum FlowError {
    // ── Construction ────────────────────────────────────────────────────

    /// The graph contains a cycle at the current nesting level.
    ///
    /// Cycles are rejected per level; iteration is expressed with a
    /// WhileGroup vertex, never with a back-edge.
    #[error("cycle detected involving vertex '{0}'")]
    CycleDetected(String),

    /// An edge references a vertex id that does not exist in the graph.
    #[error("edge {from} -> {to} references unknown vertex '{missing}'")]
    DanglingEdge {
        /// Edge source id
        from: String,
        /// Edge target id
        to: String,
        /// The endpoint that failed to resolve
        missing: String,
    },

    /// A group exposure references a vertex outside its subgraph.
    #[error("group '{group}' exposes '{exposed}' from unknown inner vertex '{inner}'")]
    ExposedOutputMissing {
        /// The group vertex id
        group: String,
        /// Exposed name
        exposed: String,
        /// The missing inner vertex id
        inner: String,
    },

    /// Two vertices share the same id within one graph.
    #[error("duplicate vertex id '{0}'")]
    DuplicateVertexId(String),

    /// A binding declaration is structurally invalid.
    #[error("invalid binding on vertex '{vertex}': {reason}")]
    InvalidBinding {
        /// The vertex declaring the binding
        vertex: String,
        /// Why the binding is rejected
        reason: String,
    },

    // ── Runtime ─────────────────────────────────────────────────────────

    /// A binding references a producer whose output is not available.
    #[error("vertex '{vertex}' is missing dependency '{dependency}'")]
    MissingDependency {
        /// The consuming vertex
        vertex: String,
        /// The producer scope that could not be resolved
        dependency: String,
    },

    /// A `{{name}}` template marker had no value in the resolved input map.
    #[error("template variable '{{{{{name}}}}}' is not bound")]
    MissingTemplateVariable {
        /// The unresolved marker name
        name: String,
    },

    /// The model provider transport failed (connection refused, reset, ...).
    ///
    /// Transient by nature; the scheduler does not retry automatically, but
    /// callers may (see the `tooling` retry helper).
    #[error("provider transport error: {0}")]
    ProviderTransport(String),

    /// The model provider rejected the call with a rate limit.
    #[error("provider rate limited: {0}")]
    ProviderRateLimit(String),

    /// The model provider rejected the request as malformed.
    #[error("provider rejected request: {0}")]
    ProviderInvalidRequest(String),

    /// A tool invocation failed or the tool was unknown.
    #[error("tool '{tool}' invocation failed: {error}")]
    ToolInvocation {
        /// Tool name as requested by the model
        tool: String,
        /// Failure description
        error: String,
    },

    /// The LLM tool-call loop exceeded its iteration bound.
    #[error("vertex '{vertex}' exhausted tool loop after {iterations} iterations")]
    ToolLoopExhausted {
        /// The LLM vertex id
        vertex: String,
        /// Configured bound that was hit
        iterations: usize,
    },

    /// A WhileGroup condition task failed to evaluate.
    #[error("condition evaluation failed: {0}")]
    ConditionEvaluation(String),

    /// A user-provided vertex task returned an error.
    #[error("vertex '{vertex}' task failed: {error}")]
    Task {
        /// The failing vertex id
        vertex: String,
        /// Error description from the task
        error: String,
    },

    // ── Terminal ────────────────────────────────────────────────────────

    /// The run's cancellation token fired.
    #[error("run cancelled")]
    Cancelled,

    /// A vertex failed and no `OnError` edge covered it.
    #[error("unhandled failure in vertex '{vertex}'")]
    UnhandledVertexFailure {
        /// The failing vertex id
        vertex: String,
    },
}

impl FlowError {
    /// Shorthand for a task failure on a named vertex.
    pub fn task(vertex: impl Into<String>, error: impl std::fmt::Display) -> Self {
        FlowError::Task {
            vertex: vertex.into(),
            error: error.to_string(),
        }
    }

    /// Shorthand for a tool invocation failure.
    pub fn tool(tool: impl Into<String>, error: impl std::fmt::Display) -> Self {
        FlowError::ToolInvocation {
            tool: tool.into(),
            error: error.to_string(),
        }
    }

    /// Stable taxonomy tag used in run reports and events.
    pub fn tag(&self) -> &'static str {
        match self {
            FlowError::CycleDetected(_) => "cycle_detected",
            FlowError::DanglingEdge { .. } => "dangling_edge",
            FlowError::ExposedOutputMissing { .. } => "exposed_output_missing",
            FlowError::DuplicateVertexId(_) => "duplicate_vertex_id",
            FlowError::InvalidBinding { .. } => "invalid_binding",
            FlowError::MissingDependency { .. } => "missing_dependency",
            FlowError::MissingTemplateVariable { .. } => "missing_template_variable",
            FlowError::ProviderTransport(_) => "provider_transport_error",
            FlowError::ProviderRateLimit(_) => "provider_rate_limit",
            FlowError::ProviderInvalidRequest(_) => "provider_invalid_request",
            FlowError::ToolInvocation { .. } => "tool_invocation_error",
            FlowError::ToolLoopExhausted { .. } => "tool_loop_exhausted",
            FlowError::ConditionEvaluation(_) => "condition_evaluation_error",
            FlowError::Task { .. } => "task_exception",
            FlowError::Cancelled => "cancelled",
            FlowError::UnhandledVertexFailure { .. } => "unhandled_vertex_failure",
        }
    }

    /// True for errors raised before any vertex runs.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            FlowError::CycleDetected(_)
                | FlowError::DanglingEdge { .. }
                | FlowError::ExposedOutputMissing { .. }
                | FlowError::DuplicateVertexId(_)
                | FlowError::InvalidBinding { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_formats() {
        let err = FlowError::task("double", "divide by zero");
        assert_eq!(err.to_string(), "vertex 'double' task failed: divide by zero");

        let err = FlowError::MissingTemplateVariable { name: "q".to_string() };
        assert_eq!(err.to_string(), "template variable '{{q}}' is not bound");
    }

    #[test]
    fn test_tags_are_stable() {
        assert_eq!(FlowError::Cancelled.tag(), "cancelled");
        assert_eq!(
            FlowError::tool("echo", "boom").tag(),
            "tool_invocation_error"
        );
        assert_eq!(
            FlowError::DuplicateVertexId("a".into()).tag(),
            "duplicate_vertex_id"
        );
    }

    #[test]
    fn test_construction_partition() {
        assert!(FlowError::DuplicateVertexId("a".into()).is_construction());
        assert!(!FlowError::Cancelled.is_construction());
        assert!(!FlowError::task("v", "e").is_construction());
    }
}
