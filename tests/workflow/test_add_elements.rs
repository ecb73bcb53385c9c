mod common;

use common::{collect_task, new_workflow, registry, sweep_task, task, value_at};
use paramflow::core::workflow::{
    AddElements, ElementPropagation, ElementSet, ElementSetArgs, InputValue, ValueSequence,
    WorkflowError,
};
use serde_json::json;
use tempfile::TempDir;

fn a_over(values: &[i64], b: i64) -> ElementSetArgs {
    ElementSetArgs {
        inputs: vec![InputValue::new("b", json!(b))],
        sequences: vec![ValueSequence::new(
            "a",
            values.iter().map(|v| json!(v)).collect(),
            Some(0.0),
        )],
        ..ElementSetArgs::default()
    }
}

#[test]
fn test_new_elements_stay_local_without_propagation() {
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
                element_sets: a_over(&[100, 200], 9),
                ..AddElements::default()
            },
        )
        .unwrap();

    assert_eq!(added, vec![12, 13]);
    assert_eq!(workflow.task(0).unwrap().num_elements(), 8);
    assert_eq!(workflow.task(1).unwrap().num_elements(), 6);
    assert_eq!(value_at(&workflow, 13, "inputs.a"), json!(200));
}

#[test]
fn test_new_elements_propagate_to_dependent_tasks() {
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
                element_sets: a_over(&[100, 200], 9),
                propagate_to: Some(vec![]),
                ..AddElements::default()
            },
        )
        .unwrap();

    assert_eq!(added, vec![12, 13, 14, 15]);
    let collect = workflow.task(1).unwrap();
    assert_eq!(collect.num_elements(), 8);
    assert_eq!(collect.element_sets().len(), 2);
    assert_eq!(collect.elements_of_element_set(1), vec![14, 15]);
    assert_eq!(workflow.element(14).unwrap().element_dependencies(), vec![12]);
    assert_eq!(workflow.element(15).unwrap().element_dependencies(), vec![13]);
}

#[test]
fn test_propagation_reaches_indirect_dependents() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let mut workflow = new_workflow(
        dir.path(),
        vec![
            sweep_task(&registry),
            collect_task(&registry),
            task(&registry, "report", vec![]),
        ],
    );
    assert_eq!(workflow.num_elements(), 18);

    let added = workflow
        .add_elements(
            0,
            AddElements {
                element_sets: a_over(&[100], 9),
                propagate_to: Some(vec![ElementPropagation::new("collect")]),
                ..AddElements::default()
            },
        )
        .unwrap();

    assert_eq!(added, vec![18, 19, 20]);
    let report = workflow.element(20).unwrap();
    assert_eq!(report.task_index(), 2);
    assert_eq!(report.element_dependencies(), vec![18, 19]);
    assert_eq!(report.task_dependencies(), vec![0, 1]);
    assert_eq!(
        report.input_sources().get("inputs.p5").map(String::as_str),
        Some("default")
    );
}

#[test]
fn test_base_element_seeds_local_values() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let mut workflow = new_workflow(dir.path(), vec![sweep_task(&registry)]);

    let added = workflow
        .add_elements(
            0,
            AddElements {
                base_element: Some(2),
                ..AddElements::default()
            },
        )
        .unwrap();
    assert_eq!(added, vec![6]);

    let base = workflow.element(2).unwrap();
    let copy = workflow.element(6).unwrap();
    assert_eq!(copy.data_index()["inputs.a"], base.data_index()["inputs.a"]);
    assert_eq!(copy.inputs().unwrap(), base.inputs().unwrap());
    assert_ne!(copy.data_index()["outputs.y"], base.data_index()["outputs.y"]);
}

#[test]
fn test_base_element_must_belong_to_the_task() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let mut workflow = new_workflow(
        dir.path(),
        vec![sweep_task(&registry), collect_task(&registry)],
    );

    let err = workflow
        .add_elements(
            1,
            AddElements {
                base_element: Some(0),
                ..AddElements::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, WorkflowError::ForeignBaseElement { element: 0, .. }));
    assert_eq!(err.code(), "WF-QRY-004");
    assert_eq!(workflow.num_elements(), 12);
}

#[test]
fn test_several_element_sets_in_one_call() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let mut workflow = new_workflow(dir.path(), vec![sweep_task(&registry)]);

    let first = ElementSet::new()
        .with_input(InputValue::new("a", json!(1)))
        .with_input(InputValue::new("b", json!(1)));
    let second = ElementSet::new()
        .with_sequence(ValueSequence::new("a", vec![json!(2), json!(3)], Some(0.0)))
        .with_input(InputValue::new("b", json!(2)));
    let added = workflow
        .add_elements(
            0,
            AddElements {
                element_sets: ElementSetArgs {
                    element_sets: vec![first, second],
                    ..ElementSetArgs::default()
                },
                ..AddElements::default()
            },
        )
        .unwrap();

    assert_eq!(added, vec![6, 7, 8]);
    let task = workflow.task(0).unwrap();
    assert_eq!(task.element_sets().len(), 3);
    assert_eq!(task.element_set_indices(), &[0, 0, 0, 0, 0, 0, 1, 2, 2]);
    assert!(task.element_sequence_indices()["inputs.a"][6].is_none());
    assert_eq!(task.element_sequence_indices()["inputs.a"][8], Some(1));
}

#[test]
fn test_unknown_task_index_is_rejected() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let mut workflow = new_workflow(dir.path(), vec![sweep_task(&registry)]);

    let err = workflow.add_elements(4, AddElements::default()).unwrap_err();
    assert!(matches!(err, WorkflowError::UnknownTask(_)));
}
