mod common;

use common::{collect_task, config, new_workflow, registry, sweep_task, task, value_at};
use paramflow::core::workflow::{
    ElementSet, InputSource, InputValue, Workflow, WorkflowError, WorkflowTemplate,
};
use serde_json::json;
use tempfile::TempDir;

fn source(raw: &str) -> InputSource {
    raw.parse().unwrap()
}

#[test]
fn test_missing_inputs_are_reported_together() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let template = WorkflowTemplate::new("wk", vec![task(&registry, "simulate", vec![])]);

    let err = Workflow::from_template(&template, Some(dir.path()), None, false, config())
        .unwrap_err();
    match &err {
        WorkflowError::MissingInputs { paths } => {
            assert_eq!(paths, &vec!["p1".to_string(), "p2".to_string()]);
        }
        other => panic!("expected MissingInputs, got {:?}", other),
    }
    let message = err.to_string();
    assert!(message.contains("\"p1\""));
    assert!(message.contains("\"p2\""));
    assert!(!dir.path().join("wk").exists());
}

#[test]
fn test_upstream_output_is_the_default_choice() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let workflow = new_workflow(
        dir.path(),
        vec![sweep_task(&registry), collect_task(&registry)],
    );

    let collect = workflow.task(1).unwrap();
    assert_eq!(collect.num_elements(), 6);
    let elements = collect.elements();
    assert_eq!(
        elements[0].input_sources().get("inputs.y").map(String::as_str),
        Some("element.0.OUTPUT")
    );
}

#[test]
fn test_schema_default_is_used_without_local_value() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let report = task(&registry, "report", vec![]);
    let workflow = new_workflow(
        dir.path(),
        vec![sweep_task(&registry), collect_task(&registry), report],
    );

    let report = workflow.task(2).unwrap();
    assert_eq!(report.num_elements(), 6);
    let elements = report.elements();
    let element = &elements[0];
    assert_eq!(
        element.input_sources().get("inputs.p5").map(String::as_str),
        Some("default")
    );
    assert_eq!(value_at(&workflow, element.global_index(), "inputs.p5"), json!(5));
}

#[test]
fn test_local_value_wins_over_upstream() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let local = ElementSet::new().with_input(InputValue::new("y", json!(7)));
    let workflow = new_workflow(
        dir.path(),
        vec![sweep_task(&registry), task(&registry, "collect", vec![local])],
    );

    let collect = workflow.task(1).unwrap();
    assert_eq!(collect.num_elements(), 1);
    let elements = collect.elements();
    let element = &elements[0];
    assert_eq!(value_at(&workflow, element.global_index(), "inputs.y"), json!(7));
    assert!(element.element_dependencies().is_empty());
}

#[test]
fn test_local_and_upstream_sources_are_combined() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let set = ElementSet::new()
        .with_input(InputValue::new("y", json!(7)))
        .with_input_sources("y", vec![InputSource::Local, source("task.sweep.output")]);
    let workflow = new_workflow(
        dir.path(),
        vec![sweep_task(&registry), task(&registry, "collect", vec![set])],
    );

    let collect = workflow.task(1).unwrap();
    assert_eq!(collect.num_elements(), 7);
    let elements = collect.elements();
    assert_eq!(
        elements[0].input_sources().get("inputs.y").map(String::as_str),
        Some("local")
    );
    assert_eq!(
        elements[6].input_sources().get("inputs.y").map(String::as_str),
        Some("element.5.OUTPUT")
    );
}

#[test]
fn test_named_source_with_element_subset() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let set = ElementSet::new().with_input_sources("y", vec![source("task.sweep.output[1,2]")]);
    let workflow = new_workflow(
        dir.path(),
        vec![sweep_task(&registry), task(&registry, "collect", vec![set])],
    );

    let collect = workflow.task(1).unwrap();
    assert_eq!(collect.num_elements(), 2);
    let deps: Vec<Vec<usize>> = collect
        .elements()
        .iter()
        .map(|e| e.element_dependencies())
        .collect();
    assert_eq!(deps, vec![vec![1], vec![2]]);
}

#[test]
fn test_sourceable_elements_limit_automatic_sources() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let set = ElementSet::new().with_sourceable_elements(vec![0, 5]);
    let workflow = new_workflow(
        dir.path(),
        vec![sweep_task(&registry), task(&registry, "collect", vec![set])],
    );

    let collect = workflow.task(1).unwrap();
    assert_eq!(collect.num_elements(), 2);
    assert_eq!(collect.element_dependencies(), vec![0, 5]);
}

#[test]
fn test_unavailable_source_is_rejected() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let set = ElementSet::new().with_input_sources("y", vec![source("task.sweep.input")]);
    let template = WorkflowTemplate::new(
        "wk",
        vec![sweep_task(&registry), task(&registry, "collect", vec![set])],
    );

    let err = Workflow::from_template(&template, Some(dir.path()), None, false, config())
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidInputSource { .. }));
    assert_eq!(err.code(), "WF-RES-002");
}

#[test]
fn test_own_outputs_cannot_feed_inputs() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let set = ElementSet::new().with_input_sources("y", vec![source("task.collect.output")]);
    let template = WorkflowTemplate::new(
        "wk",
        vec![sweep_task(&registry), task(&registry, "collect", vec![set])],
    );

    let err = Workflow::from_template(&template, Some(dir.path()), None, false, config())
        .unwrap_err();
    assert!(matches!(err, WorkflowError::InvalidTaskReference { .. }));
}

#[test]
fn test_unknown_task_name_is_rejected() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let set = ElementSet::new().with_input_sources("y", vec![source("task.nowhere.output")]);
    let template = WorkflowTemplate::new(
        "wk",
        vec![sweep_task(&registry), task(&registry, "collect", vec![set])],
    );

    let err = Workflow::from_template(&template, Some(dir.path()), None, false, config())
        .unwrap_err();
    assert_eq!(err.code(), "WF-RES-003");
}
