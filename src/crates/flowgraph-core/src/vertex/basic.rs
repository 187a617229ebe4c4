//! Source, Sink, Function and IfElse vertices
//!
//! The simple kinds. Sources materialize run inputs into the output map so
//! downstream bindings have a producer to reference; sinks forward their
//! resolved inputs, making "the outputs of all sinks" well defined;
//! functions run arbitrary user tasks; if/else tags its passthrough output
//! with a branch label for edge guards to match on.

use crate::error::{FlowError, Result};
use serde_json::{Map, Value};
use std::sync::Arc;

/// Configuration for a Source vertex.
#[derive(Debug, Clone, Default)]
pub struct SourceConfig {
    /// Keys forwarded from the run input map; empty forwards everything
    pub keys: Vec<String>,
}

/// Forward the selected input keys as the source's output.
///
/// A named key missing from the inputs is a `MissingDependency`: with
/// empty run inputs, only sources selecting nothing still succeed.
pub(crate) fn run_source(
    vertex_id: &str,
    config: &SourceConfig,
    inputs: Map<String, Value>,
) -> Result<Value> {
    if config.keys.is_empty() {
        return Ok(Value::Object(inputs));
    }
    let mut out = Map::new();
    for key in &config.keys {
        let value = inputs.get(key).cloned().ok_or_else(|| FlowError::MissingDependency {
            vertex: vertex_id.to_string(),
            dependency: format!("input.{key}"),
        })?;
        out.insert(key.clone(), value);
    }
    Ok(Value::Object(out))
}

/// Predicate evaluated by an IfElse vertex.
pub type BranchPredicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Configuration for an IfElse vertex.
///
/// The vertex evaluates `condition` against its resolved input map and
/// outputs the inputs augmented with `{"branch": <label>}`; outgoing
/// [`Guard::Equals`](crate::graph::Guard::Equals) edges match on the label.
#[derive(Clone)]
pub struct IfElseConfig {
    /// Predicate over the resolved input map
    pub condition: BranchPredicate,
    /// Label emitted when the predicate holds
    pub when_true: String,
    /// Label emitted otherwise
    pub when_false: String,
}

impl IfElseConfig {
    /// Create a config with the default labels `"true"` / `"false"`.
    pub fn new<F>(condition: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            condition: Arc::new(condition),
            when_true: "true".to_string(),
            when_false: "false".to_string(),
        }
    }

    /// Override the branch labels.
    pub fn with_labels(
        mut self,
        when_true: impl Into<String>,
        when_false: impl Into<String>,
    ) -> Self {
        self.when_true = when_true.into();
        self.when_false = when_false.into();
        self
    }
}

impl std::fmt::Debug for IfElseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IfElseConfig")
            .field("condition", &"<function>")
            .field("when_true", &self.when_true)
            .field("when_false", &self.when_false)
            .finish()
    }
}

pub(crate) fn run_if_else(config: &IfElseConfig, inputs: Map<String, Value>) -> Result<Value> {
    let mut probe = Value::Object(inputs);
    let label = if (config.condition)(&probe) {
        config.when_true.clone()
    } else {
        config.when_false.clone()
    };
    if let Value::Object(map) = &mut probe {
        map.insert("branch".to_string(), Value::String(label));
    }
    Ok(probe)
}

/// Forward a sink's declared inputs as its output.
///
/// A sink with bindings projects exactly the bound names; one without
/// forwards its whole resolved input map.
pub(crate) fn run_sink(
    vertex_id: &str,
    bindings: &[crate::binding::Binding],
    inputs: Map<String, Value>,
) -> Result<Value> {
    if bindings.is_empty() {
        return Ok(Value::Object(inputs));
    }
    let mut out = Map::new();
    for binding in bindings {
        let value = inputs.get(&binding.local_var).cloned().ok_or_else(|| {
            FlowError::MissingDependency {
                vertex: vertex_id.to_string(),
                dependency: format!("input.{}", binding.local_var),
            }
        })?;
        out.insert(binding.local_var.clone(), value);
    }
    Ok(Value::Object(out))
}
