//! Graph scheduler: ready-set computation, parallel dispatch, termination
//!
//! The scheduler drives a validated [`Workflow`] to completion. Vertices
//! with zero inbound edges seed the ready set; every ready vertex is
//! spawned onto the shared worker pool (a semaphore-bounded task set), and
//! as each completes its outgoing edge guards are evaluated against the
//! output. A downstream vertex becomes ready once every inbound edge has
//! closed and at least one closed satisfied; when all close unsatisfied it
//! is skipped, transitively.
//!
//! ```text
//!  ready ──► spawn worker ──► resolve bindings ──► run task
//!    ▲                                                │
//!    │          evaluate outgoing guards ◄── store output, emit event
//!    └── pending-inbound hits zero ◄─────────────────┘
//! ```
//!
//! # Failure and recovery
//!
//! A failing vertex emits `VertexFailed`, closes its `OnError` edges as
//! satisfied (recovery path) and everything else as unsatisfied. The run
//! is marked failed unless an `OnError` edge covered the failure; either
//! way, every branch not downstream-only of the failure keeps executing
//! and completed outputs stay in the result.
//!
//! # Cancellation
//!
//! Cooperative. Cancelling the run token stops dispatch, lets in-flight
//! workers drain inside a grace window (default 5 s), then detaches any
//! straggler; its vertex is reported failed with the `cancelled` tag and
//! its output is discarded. Unstarted reachable vertices end `Skipped`.

use crate::binding::resolve_bindings;
use crate::context::RunContext;
use crate::error::{FlowError, Result};
use crate::event::{EventBus, EventKind};
use crate::graph::{VertexId, Workflow};
use crate::vertex::{self, ExecEnv, Vertex, VertexState};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Scheduler tuning knobs.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Worker pool size; ready vertices beyond this queue
    pub workers: usize,
    /// Grace window for draining in-flight work after cancellation
    pub grace: Duration,
    /// Per-subscriber event buffer capacity for the default bus
    pub event_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism().map(usize::from).unwrap_or(4),
            grace: Duration::from_secs(5),
            event_buffer: crate::event::DEFAULT_EVENT_BUFFER,
        }
    }
}

impl SchedulerConfig {
    /// Defaults overridden by `FLOWGRAPH_WORKERS` / `FLOWGRAPH_GRACE_MS`
    /// when set and parseable.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(workers) = read_env_var("FLOWGRAPH_WORKERS") {
            if workers > 0 {
                config.workers = workers;
            }
        }
        if let Some(ms) = read_env_var("FLOWGRAPH_GRACE_MS") {
            config.grace = Duration::from_millis(ms as u64);
        }
        config
    }
}

fn read_env_var(name: &str) -> Option<usize> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Per-run options for [`Scheduler::run`].
#[derive(Debug, Default)]
pub struct RunOptions {
    /// Caller-supplied input map, visible to `Input`-scoped bindings
    pub inputs: Map<String, Value>,
    /// Env map, visible to `Env`-scoped bindings
    pub env: HashMap<String, Value>,
    /// User-variable map
    pub user: HashMap<String, Value>,
    /// Cancellation token; a fresh one when not supplied
    pub cancel: Option<CancellationToken>,
    /// Event bus to publish into; subscribe before running
    pub bus: Option<EventBus>,
}

impl RunOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the input map from a JSON object (non-objects are ignored).
    pub fn with_inputs(mut self, inputs: Value) -> Self {
        if let Value::Object(map) = inputs {
            self.inputs = map;
        }
        self
    }

    /// Set one env entry.
    pub fn with_env(mut self, key: impl Into<String>, value: Value) -> Self {
        self.env.insert(key.into(), value);
        self
    }

    /// Set one user-variable entry.
    pub fn with_user(mut self, key: impl Into<String>, value: Value) -> Self {
        self.user.insert(key.into(), value);
        self
    }

    /// Attach a cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Attach an event bus (subscribe to it before calling run).
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every reachable vertex completed (or failures were recovered)
    Completed,
    /// At least one vertex failed with no `OnError` edge covering it
    Failed,
    /// The cancellation token fired before completion
    Cancelled,
}

/// One vertex failure in a run report.
#[derive(Debug, Clone)]
pub struct VertexFailure {
    /// The failing vertex
    pub vertex_id: VertexId,
    /// Taxonomy tag of the error
    pub tag: String,
    /// The error itself
    pub error: FlowError,
    /// Whether an `OnError` edge covered the failure
    pub handled: bool,
}

/// The outcome of one run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Id stamped on this run's events
    pub run_id: Uuid,
    /// Output of every completed vertex (partial on failure)
    pub outputs: HashMap<VertexId, Value>,
    /// Terminal state of every vertex
    pub states: HashMap<VertexId, VertexState>,
    /// How the run ended
    pub status: RunStatus,
    /// All vertex failures, handled or not
    pub errors: Vec<VertexFailure>,
}

impl RunResult {
    /// A completed vertex's output.
    pub fn output(&self, id: &str) -> Option<&Value> {
        self.outputs.get(id)
    }

    /// A vertex's terminal state.
    pub fn state(&self, id: &str) -> Option<VertexState> {
        self.states.get(id).copied()
    }

    /// Outputs of the workflow's sinks (vertices with no outbound edges).
    pub fn sink_outputs(&self, workflow: &Workflow) -> HashMap<VertexId, Value> {
        workflow
            .terminal_ids()
            .into_iter()
            .filter_map(|id| self.outputs.get(&id).map(|value| (id, value.clone())))
            .collect()
    }
}

/// Executes workflows against a bounded worker pool.
///
/// One scheduler can serve many runs, sequentially or concurrently; each
/// run gets its own [`RunContext`] while the worker pool is shared, and
/// nested subgraphs reuse the same pool.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    workers: Arc<Semaphore>,
}

impl Scheduler {
    /// Create a scheduler with the given configuration.
    pub fn new(config: SchedulerConfig) -> Self {
        let workers = Arc::new(Semaphore::new(config.workers.max(1)));
        Self { config, workers }
    }

    /// The configuration this scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Execute `workflow` to termination.
    ///
    /// Validation errors return `Err` without running anything. Runtime
    /// failures do not: they are reported in the returned
    /// [`RunResult::errors`] with `status` set accordingly.
    pub async fn run(&self, workflow: &Workflow, options: RunOptions) -> Result<RunResult> {
        workflow.validate()?;

        let bus = options
            .bus
            .unwrap_or_else(|| EventBus::new(self.config.event_buffer));
        let cancel = options.cancel.unwrap_or_default();
        let ctx = RunContext::new(options.env, options.user, bus.clone(), cancel);
        let env = ExecEnv {
            workers: Arc::clone(&self.workers),
            grace: self.config.grace,
        };

        tracing::info!(run = %ctx.run_id(), vertices = workflow.vertices().len(), "run started");
        let report = run_graph(workflow, Arc::clone(&ctx), options.inputs, env).await;
        bus.close(ctx.run_id());

        let status = if report.cancelled {
            RunStatus::Cancelled
        } else if report.errors.iter().any(|f| !f.handled) {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        tracing::info!(run = %ctx.run_id(), ?status, failures = report.errors.len(), "run finished");

        Ok(RunResult {
            run_id: ctx.run_id(),
            outputs: ctx.outputs_snapshot(),
            states: report.states,
            status,
            errors: report.errors,
        })
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

/// Report from one (sub)graph execution; outputs live in its context.
pub(crate) struct GraphReport {
    pub states: HashMap<VertexId, VertexState>,
    pub errors: Vec<VertexFailure>,
    pub cancelled: bool,
}

impl GraphReport {
    /// The first failure no `OnError` edge covered.
    pub fn first_unhandled(&self) -> Option<&VertexFailure> {
        self.errors.iter().find(|f| !f.handled)
    }
}

enum WorkerOutcome {
    Completed(Value),
    Failed(FlowError),
    CancelledBeforeStart,
}

/// Execute one graph level. Boxed so groups can recurse into it.
pub(crate) fn run_graph<'a>(
    workflow: &'a Workflow,
    ctx: Arc<RunContext>,
    aux: Map<String, Value>,
    env: ExecEnv,
) -> BoxFuture<'a, GraphReport> {
    async move { run_graph_inner(workflow, ctx, aux, env).await }.boxed()
}

async fn run_graph_inner(
    workflow: &Workflow,
    ctx: Arc<RunContext>,
    aux: Map<String, Value>,
    env: ExecEnv,
) -> GraphReport {
    let mut flight = Flight::new(workflow);
    let mut errors: Vec<VertexFailure> = Vec::new();
    let mut workers: JoinSet<(VertexId, WorkerOutcome)> = JoinSet::new();
    let cancel = ctx.cancel_token().clone();
    let mut cancelled = cancel.is_cancelled();

    loop {
        while !cancelled {
            let Some(id) = flight.ready.pop_front() else { break };
            if cancel.is_cancelled() {
                cancelled = true;
                flight.ready.push_front(id);
                break;
            }
            let Some(vertex) = workflow.vertex(&id) else { continue };
            flight.states.insert(id.clone(), VertexState::Running);
            let vertex = vertex.clone();
            let worker_ctx = Arc::clone(&ctx);
            let worker_aux = aux.clone();
            let worker_env = env.clone();
            workers.spawn(run_vertex_task(vertex, worker_ctx, worker_aux, worker_env));
        }

        if cancelled || workers.is_empty() {
            break;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                cancelled = true;
            }
            joined = workers.join_next() => match joined {
                Some(Ok((id, outcome))) => {
                    handle_outcome(workflow, &ctx, &mut flight, &mut errors, &id, outcome);
                }
                Some(Err(join_error)) => {
                    tracing::error!(error = %join_error, "vertex worker aborted");
                }
                None => {}
            }
        }
    }

    if cancelled {
        drain_in_flight(workflow, &ctx, &mut flight, &mut errors, &mut workers, env.grace).await;
    }

    // Whatever never ran ends skipped; stragglers past the grace window
    // were detached and count as cancelled failures.
    for vertex in workflow.vertices() {
        let Some(state) = flight.states.get_mut(&vertex.id) else { continue };
        match *state {
            VertexState::Pending | VertexState::Ready => *state = VertexState::Skipped,
            VertexState::Running => {
                *state = VertexState::Failed;
                errors.push(VertexFailure {
                    vertex_id: vertex.id.clone(),
                    tag: FlowError::Cancelled.tag().to_string(),
                    error: FlowError::Cancelled,
                    handled: false,
                });
            }
            _ => {}
        }
    }

    GraphReport {
        states: flight.states,
        errors,
        cancelled,
    }
}

/// Dependency bookkeeping for one graph level.
struct Flight {
    states: HashMap<VertexId, VertexState>,
    pending_inbound: HashMap<VertexId, usize>,
    satisfied: HashMap<VertexId, usize>,
    ready: VecDeque<VertexId>,
}

impl Flight {
    fn new(workflow: &Workflow) -> Self {
        let mut states = HashMap::new();
        let mut pending_inbound: HashMap<VertexId, usize> = HashMap::new();
        let mut satisfied = HashMap::new();
        for vertex in workflow.vertices() {
            states.insert(vertex.id.clone(), VertexState::Pending);
            pending_inbound.insert(vertex.id.clone(), 0);
            satisfied.insert(vertex.id.clone(), 0);
        }
        for edge in workflow.edges() {
            if let Some(count) = pending_inbound.get_mut(&edge.to) {
                *count += 1;
            }
        }

        let mut ready = VecDeque::new();
        for vertex in workflow.vertices() {
            if pending_inbound.get(&vertex.id) == Some(&0) {
                states.insert(vertex.id.clone(), VertexState::Ready);
                ready.push_back(vertex.id.clone());
            }
        }
        Self {
            states,
            pending_inbound,
            satisfied,
            ready,
        }
    }

    /// Close one inbound edge of `to`; `fired` marks it satisfied. A vertex
    /// whose last edge closes becomes ready (any satisfied) or skipped
    /// (none), and a skip closes its own outbound edges transitively.
    fn close_edge(&mut self, workflow: &Workflow, to: &str, fired: bool) {
        let mut stack = vec![(to.to_string(), fired)];
        while let Some((id, fired)) = stack.pop() {
            if self.states.get(&id) != Some(&VertexState::Pending) {
                continue;
            }
            let Some(pending) = self.pending_inbound.get_mut(&id) else { continue };
            *pending = pending.saturating_sub(1);
            if fired {
                *self.satisfied.entry(id.clone()).or_insert(0) += 1;
            }
            if *pending > 0 {
                continue;
            }
            if self.satisfied.get(&id).copied().unwrap_or(0) > 0 {
                self.states.insert(id.clone(), VertexState::Ready);
                self.ready.push_back(id);
            } else {
                self.states.insert(id.clone(), VertexState::Skipped);
                for edge in workflow.outbound(&id) {
                    stack.push((edge.to.clone(), false));
                }
            }
        }
    }
}

fn handle_outcome(
    workflow: &Workflow,
    ctx: &Arc<RunContext>,
    flight: &mut Flight,
    errors: &mut Vec<VertexFailure>,
    id: &str,
    outcome: WorkerOutcome,
) {
    match outcome {
        WorkerOutcome::CancelledBeforeStart => {
            flight.states.insert(id.to_string(), VertexState::Skipped);
        }
        WorkerOutcome::Completed(output) => {
            ctx.insert_output(id, output.clone());
            flight.states.insert(id.to_string(), VertexState::Completed);
            ctx.emit(
                Some(id.to_string()),
                EventKind::VertexCompleted { output: output.clone() },
            );
            tracing::debug!(vertex = id, "vertex completed");
            for edge in workflow.outbound(id) {
                flight.close_edge(workflow, &edge.to, edge.guard.evaluate(&output));
            }
        }
        WorkerOutcome::Failed(error) => {
            flight.states.insert(id.to_string(), VertexState::Failed);
            ctx.emit(
                Some(id.to_string()),
                EventKind::VertexFailed {
                    tag: error.tag().to_string(),
                    error: error.to_string(),
                },
            );
            tracing::error!(vertex = id, error = %error, "vertex failed");
            let mut handled = false;
            for edge in workflow.outbound(id) {
                let fired = edge.guard.is_on_error();
                handled |= fired;
                flight.close_edge(workflow, &edge.to, fired);
            }
            errors.push(VertexFailure {
                vertex_id: id.to_string(),
                tag: error.tag().to_string(),
                error,
                handled,
            });
        }
    }
}

/// Let in-flight workers finish inside the grace window, then detach the
/// rest. Detached workers run to completion but their results are
/// discarded; their vertices are reported cancelled by the caller.
async fn drain_in_flight(
    workflow: &Workflow,
    ctx: &Arc<RunContext>,
    flight: &mut Flight,
    errors: &mut Vec<VertexFailure>,
    workers: &mut JoinSet<(VertexId, WorkerOutcome)>,
    grace: Duration,
) {
    let deadline = tokio::time::Instant::now() + grace;
    while !workers.is_empty() {
        match tokio::time::timeout_at(deadline, workers.join_next()).await {
            Ok(Some(Ok((id, outcome)))) => {
                handle_outcome(workflow, ctx, flight, errors, &id, outcome);
            }
            Ok(Some(Err(join_error))) => {
                tracing::error!(error = %join_error, "vertex worker aborted during drain");
            }
            Ok(None) => break,
            Err(_elapsed) => {
                tracing::warn!(in_flight = workers.len(), "grace window elapsed, detaching workers");
                workers.detach_all();
                break;
            }
        }
    }
}

async fn run_vertex_task(
    vertex: Vertex,
    ctx: Arc<RunContext>,
    aux: Map<String, Value>,
    env: ExecEnv,
) -> (VertexId, WorkerOutcome) {
    let id = vertex.id.clone();
    let permit = match Arc::clone(&env.workers).acquire_owned().await {
        Ok(permit) => permit,
        Err(_closed) => return (id, WorkerOutcome::CancelledBeforeStart),
    };
    if ctx.is_cancelled() {
        return (id, WorkerOutcome::CancelledBeforeStart);
    }

    ctx.emit(Some(id.clone()), EventKind::VertexStarted);
    tracing::debug!(vertex = %id, kind = vertex.kind.name(), "vertex started");

    let inputs = match resolve_bindings(&id, &vertex.bindings, &ctx, &aux) {
        Ok(inputs) => inputs,
        Err(error) => return (id, WorkerOutcome::Failed(error)),
    };

    // Composite vertices run whole subgraphs; holding a pool slot while
    // the inner vertices queue on the same pool would deadlock at small
    // pool sizes.
    let _permit = if vertex.kind.is_composite() {
        drop(permit);
        None
    } else {
        Some(permit)
    };

    match vertex::execute(&vertex, &ctx, inputs, &env).await {
        Ok(output) => (id, WorkerOutcome::Completed(output)),
        Err(error) => (id, WorkerOutcome::Failed(error)),
    }
}
