//! # flowgraph-core - Workflow Execution for Local AI Orchestration
//!
//! A directed-graph scheduler that coordinates heterogeneous compute
//! units (LLM calls, tool invocations, embedding and vector operations,
//! conditional branches, bounded loops and nested subgraphs) into
//! reproducible pipelines with streaming output, dependency-driven
//! variable passing and cooperative cancellation.
//!
//! ## Core Concepts
//!
//! ### Workflow
//!
//! A [`Workflow`] is a labeled directed graph of [`Vertex`] entries joined
//! by guarded edges. Twelve vertex kinds cover the compute units above;
//! each kind differs only in the task it runs, so the scheduler treats
//! them uniformly. [`Workflow::validate`] rejects cycles, dangling edges,
//! duplicate ids and broken group exposures before anything executes.
//!
//! ### Bindings
//!
//! Data flows through declared [`Binding`]s, not graph pointers: a vertex
//! names the producer (or subgraph input, env map, or direct input) each
//! of its inputs comes from, and the resolver materializes a flat input
//! map right before the task runs. String configuration such as LLM
//! prompts supports one-pass `{{name}}` template substitution.
//!
//! ### Scheduler
//!
//! The [`Scheduler`] seeds the ready set with the graph's sources,
//! dispatches ready vertices onto a bounded worker pool, evaluates edge
//! guards as producers complete, and terminates when every reachable
//! vertex is in a terminal state. Failures skip downstream-only
//! dependents and fail the run unless an `OnError` edge routes to a
//! recovery vertex. Cancellation is cooperative with a grace window.
//!
//! ### Events
//!
//! Runs stream typed [`Event`]s (vertex lifecycle, LLM content and
//! reasoning deltas, bracketed tool calls, progress) through an
//! [`EventBus`] with bounded per-subscriber buffers and explicit lag
//! signalling.
//!
//! ## Quick Start
//!
//! ```rust
//! use flowgraph_core::{Guard, RunOptions, Scheduler, Vertex, Workflow};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> flowgraph_core::Result<()> {
//! let mut workflow = Workflow::new();
//! workflow.add_vertex(Vertex::source("src", vec!["v".into()]));
//! workflow.add_vertex(
//!     Vertex::function("double", |input| {
//!         Box::pin(async move {
//!             let v = input["v"].as_i64().unwrap_or(0);
//!             Ok(json!({"y": v * 2}))
//!         })
//!     })
//!     .bind_from("src", Some("v"), "v"),
//! );
//! workflow.add_vertex(Vertex::sink("out").bind_from("double", Some("y"), "y"));
//! workflow.add_edge("src", "double", Guard::Always);
//! workflow.add_edge("double", "out", Guard::Always);
//!
//! let scheduler = Scheduler::default();
//! let result = scheduler
//!     .run(&workflow, RunOptions::new().with_inputs(json!({"v": 3})))
//!     .await?;
//! assert_eq!(result.output("out"), Some(&json!({"y": 6})));
//! # Ok(())
//! # }
//! ```
//!
//! ## External Collaborators
//!
//! Model providers, tools, embedding providers, vector engines and
//! conversation memory are contract-only: implement
//! [`ModelProvider`](llm::ModelProvider), [`ToolDescriptor`](llm::ToolDescriptor)
//! executors, [`Embedder`](embed::Embedder), [`VectorIndex`](embed::VectorIndex)
//! and [`ConversationMemory`](memory::ConversationMemory) to plug concrete
//! services in. In-memory reference implementations ship for local runs
//! and tests.

pub mod binding;
pub mod context;
pub mod embed;
pub mod error;
pub mod event;
pub mod graph;
pub mod llm;
pub mod memory;
pub mod messages;
pub mod scheduler;
pub mod vertex;

pub use binding::{render_template, resolve_bindings, Binding, BindingScope};
pub use context::RunContext;
pub use error::{FlowError, Result};
pub use event::{Event, EventBus, EventKind, EventSubscriber, ToolCallPhase};
pub use graph::{Edge, Guard, VertexId, Workflow};
pub use scheduler::{
    RunOptions, RunResult, RunStatus, Scheduler, SchedulerConfig, VertexFailure,
};
pub use vertex::{
    ConditionFn, EmbeddingConfig, ExposureMode, GroupConfig, IfElseConfig, LlmConfig,
    MemoryReaderConfig, MemoryWriterConfig, SourceConfig, VectorQueryConfig, VectorStoreConfig,
    Vertex, VertexKind, VertexState, WhileGroupConfig,
};
