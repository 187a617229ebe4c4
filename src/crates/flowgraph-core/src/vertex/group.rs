//! Group and WhileGroup vertices: nested subgraph execution
//!
//! A Group runs an inner [`Workflow`] as a single composite vertex. The
//! inner run gets a child context (`SubgraphSource` bindings read the
//! input map captured at the boundary, writes stay isolated) and reuses
//! the outer worker pool. A WhileGroup wraps the same machinery in a
//! condition-gated loop with a monotonically increasing `iteration_index`.
//!
//! # Output shapes
//!
//! Group, [`ExposureMode::Full`] (default): the map of
//! `{inner_vertex_id: output}` with the exposed names merged on top.
//! Group, [`ExposureMode::Strict`]: only the exposed names.
//! WhileGroup: `{"iterations": [...], "iteration_count": n}` plus the
//! exposed mappings from the last iteration.

use crate::context::RunContext;
use crate::error::{FlowError, Result};
use crate::event::EventKind;
use crate::graph::{VertexId, Workflow};
use crate::scheduler::run_graph;
use crate::vertex::ExecEnv;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// One inner output made visible to the outer graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Exposure {
    /// Inner vertex whose output is exposed
    pub vertex: VertexId,
    /// Field selected from that output when it is an object
    pub field: Option<String>,
    /// Name visible to the outer graph
    pub name: String,
}

/// How a group assembles its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExposureMode {
    /// Full inner-id map with exposed names merged on top
    #[default]
    Full,
    /// Only the exposed names
    Strict,
}

/// Configuration for a Group vertex.
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// The nested workflow
    pub subgraph: Arc<Workflow>,
    /// Declared exposures
    pub exposures: Vec<Exposure>,
    /// Output assembly mode
    pub mode: ExposureMode,
}

impl GroupConfig {
    /// Wrap a workflow with no exposures and [`ExposureMode::Full`].
    pub fn new(subgraph: Workflow) -> Self {
        Self {
            subgraph: Arc::new(subgraph),
            exposures: Vec::new(),
            mode: ExposureMode::default(),
        }
    }

    /// Expose `vertex`'s output (or one field of it) under `name`.
    pub fn expose(
        mut self,
        vertex: impl Into<VertexId>,
        field: Option<&str>,
        name: impl Into<String>,
    ) -> Self {
        self.exposures.push(Exposure {
            vertex: vertex.into(),
            field: field.map(str::to_string),
            name: name.into(),
        });
        self
    }

    /// Set the output assembly mode.
    pub fn with_mode(mut self, mode: ExposureMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Future returned by a while-group condition task.
pub type ConditionFuture = Pin<Box<dyn Future<Output = Result<bool>> + Send>>;

/// Condition task gating each while-group iteration.
pub type ConditionFn = Arc<dyn Fn(Value) -> ConditionFuture + Send + Sync>;

/// Configuration for a WhileGroup vertex.
#[derive(Clone)]
pub struct WhileGroupConfig {
    /// The wrapped group
    pub group: GroupConfig,
    /// Evaluated against the loop inputs before every iteration
    pub condition: ConditionFn,
    /// Hard bound on iterations; `None` is unbounded
    pub max_iterations: Option<usize>,
}

impl WhileGroupConfig {
    /// Create a loop over `group` gated by `condition`.
    pub fn new<F>(group: GroupConfig, condition: F) -> Self
    where
        F: Fn(Value) -> ConditionFuture + Send + Sync + 'static,
    {
        Self {
            group,
            condition: Arc::new(condition),
            max_iterations: None,
        }
    }

    /// Bound the iteration count.
    pub fn with_max_iterations(mut self, bound: usize) -> Self {
        self.max_iterations = Some(bound);
        self
    }
}

impl std::fmt::Debug for WhileGroupConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhileGroupConfig")
            .field("group", &self.group)
            .field("condition", &"<function>")
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

/// Execute a group vertex: one pass over the subgraph.
pub(crate) async fn run_group(
    vertex_id: &str,
    config: &GroupConfig,
    ctx: &Arc<RunContext>,
    inputs: Map<String, Value>,
    env: &ExecEnv,
) -> Result<Value> {
    ctx.emit(
        Some(vertex_id.to_string()),
        EventKind::Progress { percent: None, stage: Some("subgraph".to_string()) },
    );
    let child = run_subgraph_once(vertex_id, config, ctx, inputs, env).await?;
    assemble_output(vertex_id, config, &child)
}

/// Execute a while-group vertex: condition-gated iteration.
pub(crate) async fn run_while_group(
    vertex_id: &str,
    config: &WhileGroupConfig,
    ctx: &Arc<RunContext>,
    inputs: Map<String, Value>,
    env: &ExecEnv,
) -> Result<Value> {
    let mut loop_inputs = inputs;
    let mut iterations: Vec<Value> = Vec::new();
    let mut index = 0usize;

    loop {
        loop_inputs.insert("iteration_index".to_string(), json!(index));

        // The condition runs before each iteration, never after one.
        let proceed = (config.condition)(Value::Object(loop_inputs.clone()))
            .await
            .map_err(|e| FlowError::ConditionEvaluation(e.to_string()))?;
        if !proceed {
            break;
        }
        if ctx.is_cancelled() {
            return Err(FlowError::Cancelled);
        }

        ctx.emit(
            Some(vertex_id.to_string()),
            EventKind::Progress { percent: None, stage: Some(format!("iteration {index}")) },
        );
        tracing::debug!(vertex = vertex_id, iteration = index, "while-group iteration");

        let child = run_subgraph_once(vertex_id, &config.group, ctx, loop_inputs.clone(), env).await?;
        let record = iteration_record(vertex_id, &config.group, &child)?;

        // Outputs of this pass feed the next pass (and the condition).
        if let Value::Object(map) = &record {
            for (key, value) in map {
                loop_inputs.insert(key.clone(), value.clone());
            }
        }
        iterations.push(record);

        index += 1;
        if config.max_iterations.is_some_and(|bound| index >= bound) {
            break;
        }
    }

    let mut out = Map::new();
    if let Some(Value::Object(last)) = iterations.last() {
        if !config.group.exposures.is_empty() {
            for (key, value) in last {
                out.insert(key.clone(), value.clone());
            }
        }
    }
    out.insert("iterations".to_string(), Value::Array(iterations));
    out.insert("iteration_count".to_string(), json!(index));
    Ok(Value::Object(out))
}

/// Run the subgraph once in a fresh child context and propagate failures
/// annotated with the failing inner vertex id.
async fn run_subgraph_once(
    vertex_id: &str,
    config: &GroupConfig,
    ctx: &Arc<RunContext>,
    inputs: Map<String, Value>,
    env: &ExecEnv,
) -> Result<Arc<RunContext>> {
    let child = ctx.child_for_subgraph(inputs.clone());
    let report = run_graph(&config.subgraph, Arc::clone(&child), inputs, env.clone()).await;
    if report.cancelled {
        return Err(FlowError::Cancelled);
    }
    if let Some(failure) = report.first_unhandled() {
        return Err(FlowError::task(
            vertex_id,
            format!("inner vertex '{}' failed: {}", failure.vertex_id, failure.error),
        ));
    }
    Ok(child)
}

fn lookup_exposure(
    group_id: &str,
    exposure: &Exposure,
    child: &RunContext,
) -> Result<Value> {
    let output = child.output(&exposure.vertex).ok_or_else(|| FlowError::MissingDependency {
        vertex: group_id.to_string(),
        dependency: exposure.vertex.clone(),
    })?;
    match (&exposure.field, &output) {
        (Some(field), Value::Object(map)) => {
            map.get(field).cloned().ok_or_else(|| FlowError::MissingDependency {
                vertex: group_id.to_string(),
                dependency: format!("{}.{field}", exposure.vertex),
            })
        }
        _ => Ok(output),
    }
}

fn assemble_output(group_id: &str, config: &GroupConfig, child: &RunContext) -> Result<Value> {
    let mut exposed = Map::new();
    for exposure in &config.exposures {
        exposed.insert(exposure.name.clone(), lookup_exposure(group_id, exposure, child)?);
    }
    match config.mode {
        ExposureMode::Strict => Ok(Value::Object(exposed)),
        ExposureMode::Full => {
            let mut out: Map<String, Value> = child.outputs_snapshot().into_iter().collect();
            for (key, value) in exposed {
                out.insert(key, value);
            }
            Ok(Value::Object(out))
        }
    }
}

/// The per-iteration record of a while-group: the exposed mappings when
/// declared, the full inner map otherwise.
fn iteration_record(group_id: &str, config: &GroupConfig, child: &RunContext) -> Result<Value> {
    if config.exposures.is_empty() {
        return Ok(Value::Object(child.outputs_snapshot().into_iter().collect()));
    }
    let mut record = Map::new();
    for exposure in &config.exposures {
        record.insert(exposure.name.clone(), lookup_exposure(group_id, exposure, child)?);
    }
    Ok(Value::Object(record))
}
