//! Group exposure and while-group iteration scenarios.

use flowgraph_core::{
    ExposureMode, FlowError, GroupConfig, Guard, RunOptions, RunStatus, Scheduler, Vertex,
    VertexState, WhileGroupConfig, Workflow,
};
use serde_json::json;

/// Inner graph `a -> b` where `b` doubles what `a` forwards. Vertex `a`
/// reads `v` from its input map, so the graph runs identically standalone
/// (run inputs) and nested (the group's input map).
fn doubling_subgraph() -> Workflow {
    let mut inner = Workflow::new();
    inner.add_vertex(
        Vertex::function("a", |input| Box::pin(async move { Ok(input) }))
            .bind_input(Some("v"), "v"),
    );
    inner.add_vertex(
        Vertex::function("b", |input| {
            Box::pin(async move {
                let v = input["v"].as_i64().unwrap_or(0);
                Ok(json!({"z": v * 2}))
            })
        })
        .bind_from("a", Some("v"), "v"),
    );
    inner.add_edge("a", "b", Guard::Always);
    inner
}

#[tokio::test]
async fn group_exposes_inner_field_to_outer_bindings() {
    let group = GroupConfig::new(doubling_subgraph()).expose("b", Some("z"), "final");

    let mut workflow = Workflow::new();
    workflow.add_vertex(Vertex::source("src", vec!["v".to_string()]));
    workflow.add_vertex(Vertex::group("grp", group).bind_from("src", Some("v"), "v"));
    workflow.add_vertex(
        Vertex::function("c", |input| {
            Box::pin(async move { Ok(json!({"seen": input["v"]})) })
        })
        .bind_from("grp", Some("final"), "v"),
    );
    workflow.add_edge("src", "grp", Guard::Always);
    workflow.add_edge("grp", "c", Guard::Always);

    let result = Scheduler::default()
        .run(&workflow, RunOptions::new().with_inputs(json!({"v": 4})))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    // C's bound input came from B's output through the exposure.
    assert_eq!(result.output("c"), Some(&json!({"seen": 8})));
    // Full mode also carries the inner-id map.
    let group_out = result.output("grp").unwrap();
    assert_eq!(group_out["final"], json!(8));
    assert_eq!(group_out["b"], json!({"z": 8}));
}

#[tokio::test]
async fn strict_exposure_hides_inner_map() {
    let group = GroupConfig::new(doubling_subgraph())
        .expose("b", Some("z"), "final")
        .with_mode(ExposureMode::Strict);

    let mut workflow = Workflow::new();
    workflow.add_vertex(Vertex::source("src", vec!["v".to_string()]));
    workflow.add_vertex(Vertex::group("grp", group).bind_from("src", Some("v"), "v"));
    workflow.add_edge("src", "grp", Guard::Always);

    let result = Scheduler::default()
        .run(&workflow, RunOptions::new().with_inputs(json!({"v": 1})))
        .await
        .unwrap();

    assert_eq!(result.output("grp"), Some(&json!({"final": 2})));
}

#[tokio::test]
async fn group_standalone_matches_nested_exposures() {
    // Round-trip law: the subgraph run standalone yields the same values
    // the exposures surface when nested.
    let standalone = Scheduler::default()
        .run(&doubling_subgraph(), RunOptions::new().with_inputs(json!({"v": 6})))
        .await
        .unwrap();
    let standalone_z = standalone.output("b").unwrap()["z"].clone();

    let group = GroupConfig::new(doubling_subgraph())
        .expose("b", Some("z"), "final")
        .with_mode(ExposureMode::Strict);
    let mut workflow = Workflow::new();
    workflow.add_vertex(Vertex::source("src", vec!["v".to_string()]));
    workflow.add_vertex(Vertex::group("grp", group).bind_from("src", Some("v"), "v"));
    workflow.add_edge("src", "grp", Guard::Always);

    let nested = Scheduler::default()
        .run(&workflow, RunOptions::new().with_inputs(json!({"v": 6})))
        .await
        .unwrap();

    assert_eq!(nested.output("grp").unwrap()["final"], standalone_z);
}

#[tokio::test]
async fn group_validation_rejects_bad_exposure() {
    let group = GroupConfig::new(doubling_subgraph()).expose("ghost", None, "x");
    let mut workflow = Workflow::new();
    workflow.add_vertex(Vertex::group("grp", group));

    match workflow.validate() {
        Err(FlowError::ExposedOutputMissing { group, inner, .. }) => {
            assert_eq!(group, "grp");
            assert_eq!(inner, "ghost");
        }
        other => panic!("expected ExposedOutputMissing, got {other:?}"),
    }
}

#[tokio::test]
async fn inner_failure_fails_the_group_with_annotation() {
    let mut inner = Workflow::new();
    inner.add_vertex(Vertex::function("bad", |_| {
        Box::pin(async move { Err(FlowError::task("bad", "inner exploded")) })
    }));

    let mut workflow = Workflow::new();
    workflow.add_vertex(Vertex::group("grp", GroupConfig::new(inner)));

    let result = Scheduler::default().run(&workflow, RunOptions::new()).await.unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.state("grp"), Some(VertexState::Failed));
    let failure = &result.errors[0];
    assert_eq!(failure.vertex_id, "grp");
    assert!(
        failure.error.to_string().contains("bad"),
        "group failure names the inner vertex: {}",
        failure.error
    );
}

/// While-group counting to three: condition `i < 3`, inner step `i + 1`.
fn counter_while(max_iterations: Option<usize>) -> Workflow {
    let mut step = Workflow::new();
    step.add_vertex(
        Vertex::function("step", |input| {
            Box::pin(async move {
                let i = input["i"].as_i64().unwrap_or(0);
                Ok(json!({"i": i + 1}))
            })
        })
        .bind_subgraph(Some("i"), "i"),
    );

    let group = GroupConfig::new(step).expose("step", Some("i"), "i");
    let mut config = WhileGroupConfig::new(group, |inputs| {
        Box::pin(async move { Ok(inputs["i"].as_i64().unwrap_or(0) < 3) })
    });
    if let Some(bound) = max_iterations {
        config = config.with_max_iterations(bound);
    }

    let mut workflow = Workflow::new();
    workflow.add_vertex(Vertex::while_group("loop", config).bind_input(Some("i"), "i"));
    workflow
}

#[tokio::test]
async fn while_group_counts_to_three() {
    let result = Scheduler::default()
        .run(&counter_while(None), RunOptions::new().with_inputs(json!({"i": 0})))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    let out = result.output("loop").unwrap();
    assert_eq!(out["iteration_count"], json!(3));
    assert_eq!(out["iterations"], json!([{"i": 1}, {"i": 2}, {"i": 3}]));
    // Last iteration's exposures merge into the loop output.
    assert_eq!(out["i"], json!(3));
}

#[tokio::test]
async fn while_group_with_false_condition_runs_zero_iterations() {
    let result = Scheduler::default()
        .run(&counter_while(None), RunOptions::new().with_inputs(json!({"i": 99})))
        .await
        .unwrap();

    let out = result.output("loop").unwrap();
    assert_eq!(out["iteration_count"], json!(0));
    assert_eq!(out["iterations"], json!([]));
}

#[tokio::test]
async fn while_group_stops_exactly_at_max_iterations() {
    let result = Scheduler::default()
        .run(&counter_while(Some(2)), RunOptions::new().with_inputs(json!({"i": 0})))
        .await
        .unwrap();

    let out = result.output("loop").unwrap();
    assert_eq!(out["iteration_count"], json!(2));
    assert_eq!(out["iterations"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn while_group_condition_error_fails_the_vertex() {
    let mut step = Workflow::new();
    step.add_vertex(Vertex::function("noop", |input| Box::pin(async move { Ok(input) })));

    let config = WhileGroupConfig::new(GroupConfig::new(step), |_| {
        Box::pin(async move { Err(FlowError::task("cond", "cannot decide")) })
    });
    let mut workflow = Workflow::new();
    workflow.add_vertex(Vertex::while_group("loop", config));

    let result = Scheduler::default().run(&workflow, RunOptions::new()).await.unwrap();
    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.errors[0].tag, "condition_evaluation_error");
}

#[tokio::test]
async fn while_group_nests_inside_group() {
    // A group whose subgraph contains the counting loop; the loop reads
    // its starting value from the group's input map.
    let outer_group = GroupConfig::new(counter_while(None))
        .expose("loop", Some("iteration_count"), "count")
        .with_mode(ExposureMode::Strict);

    let mut workflow = Workflow::new();
    workflow.add_vertex(Vertex::source("src", vec!["i".to_string()]));
    workflow.add_vertex(Vertex::group("outer", outer_group).bind_from("src", Some("i"), "i"));
    workflow.add_edge("src", "outer", Guard::Always);

    let result = Scheduler::default()
        .run(&workflow, RunOptions::new().with_inputs(json!({"i": 0})))
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Completed);
    assert_eq!(result.output("outer"), Some(&json!({"count": 3})));
}
