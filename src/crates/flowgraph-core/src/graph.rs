//! Workflow graph structure and validation
//!
//! A [`Workflow`] is a labeled directed graph: [`Vertex`] entries joined by
//! [`Edge`]s, each edge carrying a [`Guard`] evaluated against the producing
//! vertex's output. Cross-vertex data never flows through graph pointers:
//! consumers read producer outputs from the run context by id, so the graph
//! itself is plain data with no reference cycles.
//!
//! # Construction
//!
//! ```rust
//! use flowgraph_core::graph::{Guard, Workflow};
//! use flowgraph_core::vertex::Vertex;
//! use serde_json::json;
//!
//! let mut workflow = Workflow::new();
//! workflow.add_vertex(Vertex::source("src", vec!["v".into()]));
//! workflow.add_vertex(Vertex::function("double", |input| {
//!     Box::pin(async move {
//!         let v = input["v"].as_i64().unwrap_or(0);
//!         Ok(json!({"y": v * 2}))
//!     })
//! }).bind_from("src", Some("v"), "v"));
//! workflow.add_edge("src", "double", Guard::Always);
//!
//! assert!(workflow.validate().is_ok());
//! ```
//!
//! # Validation
//!
//! [`Workflow::validate`] is a pure function (calling it twice on the same
//! graph gives the same answer) and checks, per nesting level:
//!
//! - no duplicate vertex ids;
//! - every edge endpoint exists;
//! - no cycles (Kahn's algorithm); iteration is expressed with a
//!   WhileGroup vertex, never a back-edge;
//! - group/while-group exposures reference vertices inside their subgraph,
//!   and the subgraphs themselves validate;
//! - bindings are structurally sound.

use crate::error::{FlowError, Result};
use crate::vertex::{Vertex, VertexKind};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Vertex identifier, unique within its containing graph.
pub type VertexId = String;

/// Pure predicate over a producer's output.
pub type GuardPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Decides whether an edge fires once its producer reaches a terminal state.
///
/// Guards must be pure functions of the producer's output; the scheduler
/// evaluates each outgoing guard exactly once per producer completion.
#[derive(Clone)]
pub enum Guard {
    /// Fires on any successful completion
    Always,
    /// Fires when `output[field] == value`
    Equals {
        /// Field looked up in the producer's output object
        field: String,
        /// Expected value
        value: Value,
    },
    /// Fires when the predicate returns true for the output
    Predicate(GuardPredicate),
    /// Fires only when the producer fails; routes to a recovery vertex
    OnError,
}

impl Guard {
    /// Convenience constructor for [`Guard::Equals`].
    pub fn equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Guard::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Convenience constructor for [`Guard::Predicate`].
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Guard::Predicate(Arc::new(f))
    }

    /// Evaluate against a successfully produced output.
    ///
    /// `OnError` guards are never satisfied by success; they are consulted
    /// separately when the producer fails.
    pub fn evaluate(&self, output: &Value) -> bool {
        match self {
            Guard::Always => true,
            Guard::Equals { field, value } => output.get(field) == Some(value),
            Guard::Predicate(f) => f(output),
            Guard::OnError => false,
        }
    }

    /// Whether this is an error-recovery guard.
    pub fn is_on_error(&self) -> bool {
        matches!(self, Guard::OnError)
    }
}

impl std::fmt::Debug for Guard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Guard::Always => f.write_str("Always"),
            Guard::Equals { field, value } => f
                .debug_struct("Equals")
                .field("field", field)
                .field("value", value)
                .finish(),
            Guard::Predicate(_) => f.write_str("Predicate(<function>)"),
            Guard::OnError => f.write_str("OnError"),
        }
    }
}

/// A directed, guarded connection between two vertices.
#[derive(Debug, Clone)]
pub struct Edge {
    /// Producer vertex id
    pub from: VertexId,
    /// Consumer vertex id
    pub to: VertexId,
    /// Firing condition
    pub guard: Guard,
}

/// A directed graph of vertices and guarded edges.
///
/// Vertices are stored in insertion order; ids index them. Configuration is
/// immutable once execution starts: the scheduler takes the workflow by
/// shared reference and keeps all per-run state in its own bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct Workflow {
    vertices: Vec<Vertex>,
    edges: Vec<Edge>,
}

impl Workflow {
    /// Create an empty workflow.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex. Duplicate ids are reported by [`validate`](Self::validate).
    pub fn add_vertex(&mut self, vertex: Vertex) -> &mut Self {
        self.vertices.push(vertex);
        self
    }

    /// Add an edge between two vertices.
    pub fn add_edge(
        &mut self,
        from: impl Into<VertexId>,
        to: impl Into<VertexId>,
        guard: Guard,
    ) -> &mut Self {
        self.edges.push(Edge {
            from: from.into(),
            to: to.into(),
            guard,
        });
        self
    }

    /// All vertices in insertion order.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// All edges in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Look up a vertex by id.
    pub fn vertex(&self, id: &str) -> Option<&Vertex> {
        self.vertices.iter().find(|v| v.id == id)
    }

    /// Ids of vertices with no inbound edges; these seed the ready set.
    pub fn source_ids(&self) -> Vec<VertexId> {
        let targets: HashSet<&str> = self.edges.iter().map(|e| e.to.as_str()).collect();
        self.vertices
            .iter()
            .filter(|v| !targets.contains(v.id.as_str()))
            .map(|v| v.id.clone())
            .collect()
    }

    /// Ids of vertices with no outbound edges.
    pub fn terminal_ids(&self) -> Vec<VertexId> {
        let sources: HashSet<&str> = self.edges.iter().map(|e| e.from.as_str()).collect();
        self.vertices
            .iter()
            .filter(|v| !sources.contains(v.id.as_str()))
            .map(|v| v.id.clone())
            .collect()
    }

    /// Edges whose target is `id`.
    pub fn inbound<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.to == id)
    }

    /// Edges whose source is `id`.
    pub fn outbound<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.from == id)
    }

    /// Validate this graph and, recursively, every nested subgraph.
    pub fn validate(&self) -> Result<()> {
        self.check_duplicate_ids()?;
        self.check_edge_endpoints()?;
        self.topo_order()?;
        self.check_bindings()?;
        self.check_subgraphs()?;
        Ok(())
    }

    /// Topological order over all vertices (Kahn's algorithm).
    ///
    /// Fails with [`FlowError::CycleDetected`] naming a vertex on a cycle.
    pub fn topo_order(&self) -> Result<Vec<VertexId>> {
        let mut indegree: HashMap<&str, usize> =
            self.vertices.iter().map(|v| (v.id.as_str(), 0)).collect();
        for edge in &self.edges {
            if let Some(count) = indegree.get_mut(edge.to.as_str()) {
                *count += 1;
            }
        }

        let mut queue: VecDeque<&str> = self
            .vertices
            .iter()
            .filter(|v| indegree.get(v.id.as_str()) == Some(&0))
            .map(|v| v.id.as_str())
            .collect();
        let mut order = Vec::with_capacity(self.vertices.len());

        while let Some(id) = queue.pop_front() {
            order.push(id.to_string());
            for edge in self.outbound(id) {
                if let Some(count) = indegree.get_mut(edge.to.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(edge.to.as_str());
                    }
                }
            }
        }

        if order.len() != self.vertices.len() {
            let on_cycle = self
                .vertices
                .iter()
                .map(|v| v.id.clone())
                .find(|id| !order.contains(id))
                .unwrap_or_default();
            return Err(FlowError::CycleDetected(on_cycle));
        }
        Ok(order)
    }

    fn check_duplicate_ids(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for vertex in &self.vertices {
            if !seen.insert(vertex.id.as_str()) {
                return Err(FlowError::DuplicateVertexId(vertex.id.clone()));
            }
        }
        Ok(())
    }

    fn check_edge_endpoints(&self) -> Result<()> {
        let ids: HashSet<&str> = self.vertices.iter().map(|v| v.id.as_str()).collect();
        for edge in &self.edges {
            for endpoint in [edge.from.as_str(), edge.to.as_str()] {
                if !ids.contains(endpoint) {
                    return Err(FlowError::DanglingEdge {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        missing: endpoint.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_bindings(&self) -> Result<()> {
        for vertex in &self.vertices {
            for binding in &vertex.bindings {
                if binding.local_var.is_empty() {
                    return Err(FlowError::InvalidBinding {
                        vertex: vertex.id.clone(),
                        reason: "local_var must not be empty".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn check_subgraphs(&self) -> Result<()> {
        for vertex in &self.vertices {
            let group = match &vertex.kind {
                VertexKind::Group(config) => config,
                VertexKind::WhileGroup(config) => &config.group,
                _ => continue,
            };
            group.subgraph.validate()?;
            for exposure in &group.exposures {
                if group.subgraph.vertex(&exposure.vertex).is_none() {
                    return Err(FlowError::ExposedOutputMissing {
                        group: vertex.id.clone(),
                        exposed: exposure.name.clone(),
                        inner: exposure.vertex.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
