mod common;

use common::{collect_task, config, new_workflow, registry, sweep_task, task, value_at};
use paramflow::core::workflow::{
    AddElements, ElementGraph, ElementSet, ElementSetArgs, InputValue, Workflow, WorkflowError,
};
use serde_json::json;
use tempfile::TempDir;

fn simulate_workflow(dir: &TempDir) -> Workflow {
    let registry = registry();
    let set = ElementSet::new()
        .with_input(InputValue::new("p1", json!({"a": 1, "b": 2, "c": {"d": 4}})))
        .with_input(InputValue::sub_value("p1", "b", json!(5)))
        .with_input(InputValue::new("p2", json!([1, 2, 3])));
    new_workflow(dir.path(), vec![task(&registry, "simulate", vec![set])])
}

#[test]
fn test_each_downstream_element_depends_on_its_upstream_peer() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let workflow = new_workflow(
        dir.path(),
        vec![sweep_task(&registry), collect_task(&registry)],
    );

    let collect = workflow.task(1).unwrap();
    assert_eq!(collect.num_elements(), 6);
    for (position, element) in collect.elements().iter().enumerate() {
        assert_eq!(element.element_dependencies(), vec![position]);
    }
    assert_eq!(collect.task_dependencies(), vec![0]);
    assert_eq!(workflow.task(0).unwrap().dependent_tasks(), vec![1]);
}

#[test]
fn test_dependents_follow_the_graph() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let workflow = new_workflow(
        dir.path(),
        vec![
            sweep_task(&registry),
            collect_task(&registry),
            task(&registry, "report", vec![]),
        ],
    );

    let first = workflow.element(0).unwrap();
    assert_eq!(first.dependent_elements(), vec![6, 12]);
    assert_eq!(first.dependent_tasks(), vec![1, 2]);

    let graph = ElementGraph::build(&workflow);
    assert_eq!(graph.dependencies(&[12, 13]), vec![0, 1, 6, 7]);
    assert_eq!(graph.dependents(&[6]), vec![12]);

    let report = workflow.task(2).unwrap();
    assert_eq!(report.element_set_task_dependencies(0), vec![0, 1]);
}

#[test]
fn test_sub_values_overlay_the_whole_value() {
    let dir = TempDir::new().unwrap();
    let workflow = simulate_workflow(&dir);

    assert_eq!(
        value_at(&workflow, 0, "inputs.p1"),
        json!({"a": 1, "b": 5, "c": {"d": 4}})
    );
    assert_eq!(value_at(&workflow, 0, "inputs.p1.b"), json!(5));
    assert_eq!(value_at(&workflow, 0, "p1.c.d"), json!(4));
    assert_eq!(value_at(&workflow, 0, "inputs.p2.1"), json!(2));

    let element = workflow.element(0).unwrap();
    assert_eq!(
        element.input_sources().get("inputs.p1.b").map(String::as_str),
        Some("local")
    );
    let inputs = element.inputs().unwrap();
    assert_eq!(inputs.keys().collect::<Vec<_>>(), vec!["p1", "p2"]);
}

#[test]
fn test_missing_paths_depend_on_strictness() {
    let dir = TempDir::new().unwrap();
    let workflow = simulate_workflow(&dir);
    let element = workflow.element(0).unwrap();

    assert_eq!(element.get("inputs.p1.zz", false).unwrap(), None);
    let err = element.get("inputs.p1.zz", true).unwrap_err();
    assert!(matches!(err, WorkflowError::PathNotFound { element: 0, .. }));
    assert_eq!(err.code(), "WF-QRY-001");
}

#[test]
fn test_unset_outputs_read_as_null() {
    let dir = TempDir::new().unwrap();
    let workflow = simulate_workflow(&dir);
    let element = workflow.element(0).unwrap();

    let outputs = element.outputs().unwrap();
    assert_eq!(outputs.get("p3"), Some(&serde_json::Value::Null));
    assert_eq!(element.resources().unwrap().len(), 1);
}

#[test]
fn test_unknown_element_is_reported() {
    let dir = TempDir::new().unwrap();
    let workflow = simulate_workflow(&dir);
    let err = workflow.element(9).unwrap_err();
    assert!(matches!(err, WorkflowError::UnknownElement(9)));
}

#[test]
fn test_reload_and_copy_preserve_elements() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let workflow = new_workflow(
        dir.path(),
        vec![sweep_task(&registry), collect_task(&registry)],
    );

    let reloaded = Workflow::load(workflow.location(), config()).unwrap();
    assert_eq!(reloaded.metadata(), workflow.metadata());
    assert_eq!(reloaded.event_log().len(), workflow.event_log().len());

    let copied = workflow.copy_to(dir.path().join("copy")).unwrap();
    assert_eq!(copied.num_elements(), 12);
    assert_eq!(value_at(&copied, 3, "inputs.b"), value_at(&workflow, 3, "inputs.b"));
    assert_eq!(copied.task(1).unwrap().element_dependencies(), (0..6).collect::<Vec<_>>());

    copied.delete().unwrap();
    assert!(!dir.path().join("copy").exists());
    assert!(workflow.location().exists());
}

#[test]
fn test_elements_know_their_position_within_the_task() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let mut workflow = new_workflow(
        dir.path(),
        vec![sweep_task(&registry), collect_task(&registry)],
    );
    let added = workflow
        .add_elements(
            0,
            AddElements {
                element_sets: ElementSetArgs {
                    inputs: vec![InputValue::new("a", json!(40)), InputValue::new("b", json!(3))],
                    ..ElementSetArgs::default()
                },
                ..AddElements::default()
            },
        )
        .unwrap();
    assert_eq!(added, vec![12]);

    let element = workflow.element(12).unwrap();
    assert_eq!(element.task_index(), 0);
    assert_eq!(element.index(), 6);
    assert_eq!(value_at(&workflow, 12, "inputs.a"), json!(40));

    for element in workflow.elements() {
        let looked_up = workflow.element(element.global_index()).unwrap();
        assert_eq!(looked_up.task_index(), element.task_index());
        assert_eq!(looked_up.index(), element.index());
        assert_eq!(
            workflow.task(element.task_index()).unwrap().element_indices()[element.index()],
            element.global_index()
        );
    }
}
