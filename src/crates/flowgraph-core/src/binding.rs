//! Variable resolution: cross-vertex data-flow binding and templates
//!
//! Each vertex declares [`Binding`]s naming where its inputs come from. At
//! execution time the resolver turns those declarations plus the run
//! context and an auxiliary input map into the flat `name -> value` map the
//! vertex task consumes:
//!
//! - [`BindingScope::Vertex`] reads a producer's stored output;
//! - [`BindingScope::SubgraphSource`] reads the input map passed into the
//!   enclosing subgraph;
//! - [`BindingScope::Env`] reads the context env map;
//! - [`BindingScope::Input`] reads the auxiliary map handed to the vertex
//!   (for top-level sources, the caller-supplied run inputs).
//!
//! Aux entries not shadowed by a binding pass through verbatim.
//!
//! String configuration flagged as a template (LLM system/user prompts) is
//! rendered with [`render_template`]: single-pass `{{name}}` substitution
//! from the resolved input map, failing with `MissingTemplateVariable`
//! before the vertex task runs.

use crate::context::RunContext;
use crate::error::{FlowError, Result};
use crate::graph::VertexId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Where a bound value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BindingScope {
    /// Output of a producer vertex in the same graph
    Vertex(VertexId),
    /// The input map passed into the enclosing subgraph
    SubgraphSource,
    /// The run's env map
    Env,
    /// The auxiliary input map supplied directly to this vertex
    Input,
}

/// One declared input of a vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    /// Value source
    pub scope: BindingScope,
    /// Field selected from the source when it is an object; `None` takes
    /// the whole value
    pub source_var: Option<String>,
    /// Name the value is bound under in the vertex's input map
    pub local_var: String,
}

impl Binding {
    /// Bind from a producer vertex's output.
    pub fn from_vertex(
        vertex: impl Into<VertexId>,
        source_var: Option<&str>,
        local_var: impl Into<String>,
    ) -> Self {
        Self {
            scope: BindingScope::Vertex(vertex.into()),
            source_var: source_var.map(str::to_string),
            local_var: local_var.into(),
        }
    }

    /// Bind from the enclosing subgraph's input map.
    pub fn from_subgraph(source_var: Option<&str>, local_var: impl Into<String>) -> Self {
        Self {
            scope: BindingScope::SubgraphSource,
            source_var: source_var.map(str::to_string),
            local_var: local_var.into(),
        }
    }

    /// Bind from the run env map.
    pub fn from_env(source_var: Option<&str>, local_var: impl Into<String>) -> Self {
        Self {
            scope: BindingScope::Env,
            source_var: source_var.map(str::to_string),
            local_var: local_var.into(),
        }
    }

    /// Bind from the vertex's direct input map.
    pub fn from_input(source_var: Option<&str>, local_var: impl Into<String>) -> Self {
        Self {
            scope: BindingScope::Input,
            source_var: source_var.map(str::to_string),
            local_var: local_var.into(),
        }
    }
}

/// Resolve a vertex's bindings into its input map.
///
/// `aux` is the auxiliary input map for this vertex; its entries appear in
/// the result unless a binding shadows them.
pub fn resolve_bindings(
    vertex_id: &str,
    bindings: &[Binding],
    ctx: &RunContext,
    aux: &Map<String, Value>,
) -> Result<Map<String, Value>> {
    let mut resolved = aux.clone();

    for binding in bindings {
        let (value, source_name) = match &binding.scope {
            BindingScope::Vertex(producer) => {
                let value = ctx.output(producer).ok_or_else(|| FlowError::MissingDependency {
                    vertex: vertex_id.to_string(),
                    dependency: producer.clone(),
                })?;
                (value, producer.clone())
            }
            BindingScope::SubgraphSource => {
                let input = ctx.subgraph_input().ok_or_else(|| FlowError::MissingDependency {
                    vertex: vertex_id.to_string(),
                    dependency: "subgraph input".to_string(),
                })?;
                (Value::Object(input.clone()), "subgraph input".to_string())
            }
            BindingScope::Env => (
                Value::Object(ctx.env().iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
                "env".to_string(),
            ),
            BindingScope::Input => (Value::Object(aux.clone()), "input".to_string()),
        };

        let value = match (&binding.source_var, &value) {
            (Some(field), Value::Object(map)) => {
                map.get(field).cloned().ok_or_else(|| FlowError::MissingDependency {
                    vertex: vertex_id.to_string(),
                    dependency: format!("{source_name}.{field}"),
                })?
            }
            _ => value,
        };

        resolved.insert(binding.local_var.clone(), value);
    }

    Ok(resolved)
}

fn template_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("valid pattern"))
}

/// Render `{{name}}` markers in `template` from the resolved input map.
///
/// Substitution is a single pass (substituted values are not re-scanned),
/// so a string with no markers renders to itself (idempotence). String
/// values insert verbatim; other JSON values insert in their compact JSON
/// form. An unbound marker fails with `MissingTemplateVariable`.
pub fn render_template(template: &str, inputs: &Map<String, Value>) -> Result<String> {
    let pattern = template_pattern();
    let mut rendered = String::with_capacity(template.len());
    let mut last_end = 0;

    for capture in pattern.captures_iter(template) {
        let whole = capture.get(0).expect("capture 0 always present");
        let name = &capture[1];
        let value = inputs.get(name).ok_or_else(|| FlowError::MissingTemplateVariable {
            name: name.to_string(),
        })?;
        rendered.push_str(&template[last_end..whole.start()]);
        match value {
            Value::String(s) => rendered.push_str(s),
            other => rendered.push_str(&other.to_string()),
        }
        last_end = whole.end();
    }
    rendered.push_str(&template[last_end..]);
    Ok(rendered)
}
