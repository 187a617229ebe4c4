//! Vertex kinds and execution dispatch
//!
//! A [`Vertex`] is identity plus a [`VertexKind`] holding kind-specific
//! configuration, plus declared [`Binding`]s. Behavior differs between
//! kinds in exactly one place, the task run when the vertex executes,
//! so the scheduler dispatches on the kind tag and otherwise treats all
//! vertices uniformly. Group and WhileGroup embed an inner
//! [`Workflow`](crate::graph::Workflow) and recurse into the scheduler;
//! nothing else about them is special.
//!
//! Vertex configuration is immutable after graph build. Per-run state
//! ([`VertexState`], outputs) lives in the scheduler's bookkeeping and the
//! run context, never in the vertex itself, so one `Workflow` can serve
//! concurrent runs.

pub mod basic;
pub mod embedding;
pub mod group;
pub mod llm;
pub mod memory;

use crate::binding::Binding;
use crate::context::RunContext;
use crate::error::Result;
use crate::graph::VertexId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub use basic::{IfElseConfig, SourceConfig};
pub use embedding::{EmbeddingConfig, VectorQueryConfig, VectorStoreConfig};
pub use group::{ConditionFn, Exposure, ExposureMode, GroupConfig, WhileGroupConfig};
pub use llm::LlmConfig;
pub use memory::{MemoryReaderConfig, MemoryWriterConfig, SummarizeRule};

/// Lifecycle of a vertex within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VertexState {
    /// Waiting on inbound edges
    Pending,
    /// All dependencies satisfied, queued for a worker
    Ready,
    /// Executing on a worker
    Running,
    /// Finished and output stored
    Completed,
    /// Task raised an error
    Failed,
    /// Never ran: no satisfied path reached it, or the run was cancelled
    Skipped,
}

impl VertexState {
    /// Whether this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VertexState::Completed | VertexState::Failed | VertexState::Skipped
        )
    }
}

/// Future returned by a user task.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<Value>> + Send>>;

/// A user-provided async task: resolved input map in, output value out.
pub type TaskFn = Arc<dyn Fn(Value) -> TaskFuture + Send + Sync>;

/// Kind tag plus kind-specific configuration.
#[derive(Clone)]
pub enum VertexKind {
    /// Forwards selected keys of the run input map
    Source(SourceConfig),
    /// Forwards its resolved input map as output
    Sink,
    /// Runs an arbitrary user task
    Function(TaskFn),
    /// Evaluates a predicate and tags its output with a branch label
    IfElse(IfElseConfig),
    /// Multi-turn model call with streaming and a bounded tool loop
    Llm(LlmConfig),
    /// Embeds text through an [`Embedder`](crate::embed::Embedder)
    Embedding(EmbeddingConfig),
    /// Inserts a vector into a [`VectorIndex`](crate::embed::VectorIndex)
    VectorStore(VectorStoreConfig),
    /// Similarity search against a [`VectorIndex`](crate::embed::VectorIndex)
    VectorQuery(VectorQueryConfig),
    /// Runs an inner workflow and exposes selected inner outputs
    Group(GroupConfig),
    /// Repeats an inner workflow while a condition holds
    WhileGroup(WhileGroupConfig),
    /// Reads recent conversation history
    MemoryReader(MemoryReaderConfig),
    /// Appends a turn to conversation history
    MemoryWriter(MemoryWriterConfig),
}

impl VertexKind {
    /// Kind tag for logging and events.
    pub fn name(&self) -> &'static str {
        match self {
            VertexKind::Source(_) => "source",
            VertexKind::Sink => "sink",
            VertexKind::Function(_) => "function",
            VertexKind::IfElse(_) => "if_else",
            VertexKind::Llm(_) => "llm",
            VertexKind::Embedding(_) => "embedding",
            VertexKind::VectorStore(_) => "vector_store",
            VertexKind::VectorQuery(_) => "vector_query",
            VertexKind::Group(_) => "group",
            VertexKind::WhileGroup(_) => "while_group",
            VertexKind::MemoryReader(_) => "memory_reader",
            VertexKind::MemoryWriter(_) => "memory_writer",
        }
    }

    /// Composite kinds run nested graphs and release their worker permit
    /// while doing so, so inner vertices can use the shared pool.
    pub(crate) fn is_composite(&self) -> bool {
        matches!(self, VertexKind::Group(_) | VertexKind::WhileGroup(_))
    }
}

impl std::fmt::Debug for VertexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A node in the workflow graph.
#[derive(Debug, Clone)]
pub struct Vertex {
    /// Unique id within the containing graph
    pub id: VertexId,
    /// Kind tag and configuration
    pub kind: VertexKind,
    /// Declared inputs
    pub bindings: Vec<Binding>,
}

impl Vertex {
    /// Create a vertex from a kind.
    pub fn new(id: impl Into<VertexId>, kind: VertexKind) -> Self {
        Self {
            id: id.into(),
            kind,
            bindings: Vec::new(),
        }
    }

    /// A source vertex forwarding `keys` from the run inputs (all keys
    /// when empty).
    pub fn source(id: impl Into<VertexId>, keys: Vec<String>) -> Self {
        Self::new(id, VertexKind::Source(SourceConfig { keys }))
    }

    /// A sink vertex forwarding its resolved inputs.
    pub fn sink(id: impl Into<VertexId>) -> Self {
        Self::new(id, VertexKind::Sink)
    }

    /// A function vertex running `task`.
    pub fn function<F>(id: impl Into<VertexId>, task: F) -> Self
    where
        F: Fn(Value) -> TaskFuture + Send + Sync + 'static,
    {
        Self::new(id, VertexKind::Function(Arc::new(task)))
    }

    /// An if/else vertex with default branch labels `"true"`/`"false"`.
    pub fn if_else<F>(id: impl Into<VertexId>, condition: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::new(id, VertexKind::IfElse(IfElseConfig::new(condition)))
    }

    /// An LLM vertex.
    pub fn llm(id: impl Into<VertexId>, config: LlmConfig) -> Self {
        Self::new(id, VertexKind::Llm(config))
    }

    /// An embedding vertex.
    pub fn embedding(id: impl Into<VertexId>, config: EmbeddingConfig) -> Self {
        Self::new(id, VertexKind::Embedding(config))
    }

    /// A vector-insert vertex.
    pub fn vector_store(id: impl Into<VertexId>, config: VectorStoreConfig) -> Self {
        Self::new(id, VertexKind::VectorStore(config))
    }

    /// A vector-search vertex.
    pub fn vector_query(id: impl Into<VertexId>, config: VectorQueryConfig) -> Self {
        Self::new(id, VertexKind::VectorQuery(config))
    }

    /// A group vertex running `config.subgraph`.
    pub fn group(id: impl Into<VertexId>, config: GroupConfig) -> Self {
        Self::new(id, VertexKind::Group(config))
    }

    /// A while-group vertex iterating `config.group.subgraph`.
    pub fn while_group(id: impl Into<VertexId>, config: WhileGroupConfig) -> Self {
        Self::new(id, VertexKind::WhileGroup(config))
    }

    /// A memory-reader vertex.
    pub fn memory_reader(id: impl Into<VertexId>, config: MemoryReaderConfig) -> Self {
        Self::new(id, VertexKind::MemoryReader(config))
    }

    /// A memory-writer vertex.
    pub fn memory_writer(id: impl Into<VertexId>, config: MemoryWriterConfig) -> Self {
        Self::new(id, VertexKind::MemoryWriter(config))
    }

    /// Attach a binding.
    pub fn bind(mut self, binding: Binding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Bind `local_var` from a producer vertex's output.
    pub fn bind_from(
        self,
        vertex: impl Into<VertexId>,
        source_var: Option<&str>,
        local_var: impl Into<String>,
    ) -> Self {
        self.bind(Binding::from_vertex(vertex, source_var, local_var))
    }

    /// Bind `local_var` from the vertex's direct input map.
    pub fn bind_input(self, source_var: Option<&str>, local_var: impl Into<String>) -> Self {
        self.bind(Binding::from_input(source_var, local_var))
    }

    /// Bind `local_var` from the run env map.
    pub fn bind_env(self, source_var: Option<&str>, local_var: impl Into<String>) -> Self {
        self.bind(Binding::from_env(source_var, local_var))
    }

    /// Bind `local_var` from the enclosing subgraph's input map.
    pub fn bind_subgraph(self, source_var: Option<&str>, local_var: impl Into<String>) -> Self {
        self.bind(Binding::from_subgraph(source_var, local_var))
    }
}

/// Shared execution environment threaded through nested runs.
#[derive(Clone)]
pub(crate) struct ExecEnv {
    /// Worker pool shared across nesting levels
    pub workers: Arc<Semaphore>,
    /// Grace window for cancellation drains
    pub grace: Duration,
}

/// Run one vertex's task against its resolved inputs.
pub(crate) async fn execute(
    vertex: &Vertex,
    ctx: &Arc<RunContext>,
    inputs: Map<String, Value>,
    env: &ExecEnv,
) -> Result<Value> {
    match &vertex.kind {
        VertexKind::Source(config) => basic::run_source(&vertex.id, config, inputs),
        VertexKind::Sink => basic::run_sink(&vertex.id, &vertex.bindings, inputs),
        VertexKind::Function(task) => task(Value::Object(inputs)).await,
        VertexKind::IfElse(config) => basic::run_if_else(config, inputs),
        VertexKind::Llm(config) => llm::run_llm(&vertex.id, config, ctx, inputs).await,
        VertexKind::Embedding(config) => embedding::run_embedding(config, inputs).await,
        VertexKind::VectorStore(config) => embedding::run_vector_store(&vertex.id, config, inputs).await,
        VertexKind::VectorQuery(config) => embedding::run_vector_query(&vertex.id, config, inputs).await,
        VertexKind::Group(config) => group::run_group(&vertex.id, config, ctx, inputs, env).await,
        VertexKind::WhileGroup(config) => {
            group::run_while_group(&vertex.id, config, ctx, inputs, env).await
        }
        VertexKind::MemoryReader(config) => memory::run_reader(&vertex.id, config, inputs).await,
        VertexKind::MemoryWriter(config) => memory::run_writer(&vertex.id, config, inputs).await,
    }
}
