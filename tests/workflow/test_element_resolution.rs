mod common;

use common::{new_workflow, registry, sweep_task, value_at, A_VALUES, B_VALUES};
use paramflow::core::workflow::{resolve, Multiplicity, WorkflowError};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn test_resolve_is_deterministic() {
    let axes = vec![
        Multiplicity::new("inputs.a", 3, 0.0),
        Multiplicity::new("inputs.b", 2, 1.0),
        Multiplicity::new("inputs.c", 2, 1.0),
        Multiplicity::new("resources.any", 1, -1.0),
    ];
    assert_eq!(resolve(&axes).unwrap(), resolve(&axes).unwrap());
}

#[test]
fn test_independent_axes_form_full_cross_product() {
    let axes = vec![
        Multiplicity::new("inputs.a", 2, 0.0),
        Multiplicity::new("inputs.b", 3, 1.0),
        Multiplicity::new("inputs.c", 4, 2.0),
    ];
    let elements = resolve(&axes).unwrap();
    assert_eq!(elements.len(), 24);

    let mut seen: Vec<(usize, usize, usize)> = elements
        .iter()
        .map(|e| (e["inputs.a"], e["inputs.b"], e["inputs.c"]))
        .collect();
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 24);
}

#[test]
fn test_lowest_nesting_order_varies_fastest() {
    let axes = vec![
        Multiplicity::new("inputs.slow", 3, 1.0),
        Multiplicity::new("inputs.fast", 2, 0.0),
    ];
    let elements = resolve(&axes).unwrap();
    assert_eq!(elements[0]["inputs.fast"], 0);
    assert_eq!(elements[1]["inputs.fast"], 1);
    assert_eq!(elements[0]["inputs.slow"], 0);
    assert_eq!(elements[1]["inputs.slow"], 0);
    assert_eq!(elements[2]["inputs.slow"], 1);
}

#[test]
fn test_mismatched_shared_nesting_is_rejected() {
    let err = resolve(&[
        Multiplicity::new("inputs.a", 3, 0.0),
        Multiplicity::new("inputs.b", 2, 0.0),
    ])
    .unwrap_err();
    assert!(matches!(err, WorkflowError::InconsistentNesting { .. }));
    assert_eq!(err.code(), "WF-RES-004");
}

#[test]
fn test_two_sequences_expand_into_six_elements() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let workflow = new_workflow(dir.path(), vec![sweep_task(&registry)]);

    assert_eq!(workflow.num_elements(), 6);
    let task = workflow.task(0).unwrap();
    assert_eq!(task.num_elements(), 6);

    assert_eq!(value_at(&workflow, 0, "inputs.a"), json!(A_VALUES[0]));
    assert_eq!(value_at(&workflow, 0, "inputs.b"), json!(B_VALUES[0]));
    assert_eq!(value_at(&workflow, 1, "inputs.a"), json!(A_VALUES[1]));
    assert_eq!(value_at(&workflow, 1, "inputs.b"), json!(B_VALUES[0]));
    assert_eq!(value_at(&workflow, 3, "inputs.a"), json!(A_VALUES[0]));
    assert_eq!(value_at(&workflow, 3, "inputs.b"), json!(B_VALUES[1]));
}

#[test]
fn test_sequence_indices_are_recorded_per_element() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let workflow = new_workflow(dir.path(), vec![sweep_task(&registry)]);

    let element = workflow.element(4).unwrap();
    let indices = element.sequence_indices();
    assert_eq!(indices.get("inputs.a"), Some(&1));
    assert_eq!(indices.get("inputs.b"), Some(&1));
    assert_eq!(
        element.input_sources().get("inputs.a").map(String::as_str),
        Some("local")
    );
}

#[test]
fn test_each_element_reserves_its_own_outputs() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let workflow = new_workflow(dir.path(), vec![sweep_task(&registry)]);

    let handles: Vec<usize> = workflow
        .elements()
        .iter()
        .map(|e| e.data_index()["outputs.y"])
        .collect();
    let mut distinct = handles.clone();
    distinct.sort_unstable();
    distinct.dedup();
    assert_eq!(distinct.len(), 6);

    let params = workflow.parameters();
    assert!(!params.is_set(handles[0]).unwrap());
}
