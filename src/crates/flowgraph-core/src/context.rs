//! Per-run mutable state
//!
//! A [`RunContext`] owns everything one run mutates: the write-once output
//! map, the caller-supplied env and user maps, the cancellation token and
//! the event bus handle. Contexts are never shared across concurrent runs
//! of the same graph; each run gets its own.
//!
//! Nested subgraph runs get a child context via
//! [`RunContext::child_for_subgraph`]: reads of `SubgraphSource` bindings go
//! through the input map captured at the boundary, writes stay isolated in
//! the child, and the bus and cancellation token are shared with the parent
//! so events keep flowing and cancellation reaches every nesting level.

use crate::event::{Event, EventBus, EventKind};
use crate::graph::VertexId;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Mutable state for a single workflow run.
pub struct RunContext {
    /// Unique id for this run (child contexts share the parent's)
    run_id: Uuid,
    outputs: RwLock<HashMap<VertexId, Value>>,
    env: HashMap<String, Value>,
    user: HashMap<String, Value>,
    bus: EventBus,
    cancel: CancellationToken,
    parent: Option<Arc<RunContext>>,
    /// Input map passed into this subgraph, for `SubgraphSource` bindings
    subgraph_input: Option<Map<String, Value>>,
}

impl RunContext {
    /// Create a root context for a new run.
    pub fn new(
        env: HashMap<String, Value>,
        user: HashMap<String, Value>,
        bus: EventBus,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            run_id: Uuid::new_v4(),
            outputs: RwLock::new(HashMap::new()),
            env,
            user,
            bus,
            cancel,
            parent: None,
            subgraph_input: None,
        })
    }

    /// Create a child context for a nested subgraph run.
    ///
    /// The child shares the parent's run id, bus, cancellation token and
    /// env/user maps; its output map starts empty.
    pub fn child_for_subgraph(self: &Arc<Self>, input: Map<String, Value>) -> Arc<Self> {
        Arc::new(Self {
            run_id: self.run_id,
            outputs: RwLock::new(HashMap::new()),
            env: self.env.clone(),
            user: self.user.clone(),
            bus: self.bus.clone(),
            cancel: self.cancel.clone(),
            parent: Some(Arc::clone(self)),
            subgraph_input: Some(input),
        })
    }

    /// The run id events are stamped with.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Store a vertex output. Returns false when the id was already written.
    ///
    /// The output map is append-only: the scheduler writes each vertex
    /// exactly once per run, and a cancelled vertex writes nothing.
    pub fn insert_output(&self, id: impl Into<VertexId>, value: Value) -> bool {
        let id = id.into();
        let mut outputs = self.outputs.write();
        if outputs.contains_key(&id) {
            debug_assert!(false, "output for '{id}' written twice");
            return false;
        }
        outputs.insert(id, value);
        true
    }

    /// Read a completed vertex's output.
    pub fn output(&self, id: &str) -> Option<Value> {
        self.outputs.read().get(id).cloned()
    }

    /// Snapshot of every output written so far.
    pub fn outputs_snapshot(&self) -> HashMap<VertexId, Value> {
        self.outputs.read().clone()
    }

    /// Caller-supplied environment map.
    pub fn env(&self) -> &HashMap<String, Value> {
        &self.env
    }

    /// Caller-supplied user-variable map.
    pub fn user(&self) -> &HashMap<String, Value> {
        &self.user
    }

    /// The input map passed into this subgraph, when nested.
    pub fn subgraph_input(&self) -> Option<&Map<String, Value>> {
        self.subgraph_input.as_ref()
    }

    /// Parent context, when nested.
    pub fn parent(&self) -> Option<&Arc<RunContext>> {
        self.parent.as_ref()
    }

    /// The run's cancellation token.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether cancellation has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The event bus this run publishes into.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Publish an event stamped with this run's id.
    pub fn emit(&self, vertex_id: Option<VertexId>, kind: EventKind) {
        self.bus.publish(Event::new(self.run_id, vertex_id, kind));
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("outputs", &self.outputs.read().len())
            .field("nested", &self.parent.is_some())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
