mod common;

use common::{new_workflow, registry, sweep_task};
use paramflow::core::workflow::{
    ElementSet, ElementSetArgs, InputValue, SchemaRegistry, Task, ValidationFault,
    ValueSequence, WorkflowError,
};
use serde_json::json;
use tempfile::TempDir;

fn fault(err: WorkflowError) -> ValidationFault {
    match err {
        WorkflowError::Validation(fault) => fault,
        other => panic!("expected a validation fault, got {:?}", other),
    }
}

#[test]
fn test_unexpected_inputs_are_named() {
    let registry = registry();
    let set = ElementSet::new()
        .with_input(InputValue::new("p1", json!(1)))
        .with_input(InputValue::new("q", json!(2)));
    let err = Task::from_registry(&registry, &["simulate"], vec![set]).unwrap_err();
    match fault(err) {
        ValidationFault::UnexpectedInput(names) => assert_eq!(names, vec!["q".to_string()]),
        other => panic!("unexpected fault {:?}", other),
    }
}

#[test]
fn test_repeated_input_values_are_rejected() {
    let registry = registry();
    let set = ElementSet::new()
        .with_input(InputValue::new("p1", json!(1)))
        .with_input(InputValue::new("p1", json!(2)));
    let err = Task::from_registry(&registry, &["simulate"], vec![set]).unwrap_err();
    assert_eq!(err.code(), "WF-VAL-001");
}

#[test]
fn test_sequence_on_unknown_input_lists_available_types() {
    let registry = registry();
    let set = ElementSet::new().with_sequence(ValueSequence::new(
        "inputs.q",
        vec![json!(1), json!(2)],
        Some(0.0),
    ));
    let err = Task::from_registry(&registry, &["simulate"], vec![set]).unwrap_err();
    match fault(err) {
        ValidationFault::UnexpectedSequenceInput {
            input_type,
            available,
            ..
        } => {
            assert_eq!(input_type, "q");
            assert_eq!(available, vec!["p1".to_string(), "p2".to_string()]);
        }
        other => panic!("unexpected fault {:?}", other),
    }
}

#[test]
fn test_negative_nesting_order_is_rejected() {
    let registry = registry();
    let set = ElementSet::new()
        .with_input(InputValue::new("p1", json!(1)))
        .with_nesting_order("p1", -2.0);
    let err = Task::from_registry(&registry, &["simulate"], vec![set]).unwrap_err();
    assert_eq!(err.code(), "WF-VAL-004");
}

#[test]
fn test_schemas_must_share_an_objective() {
    let registry = registry();
    let err = Task::from_registry(&registry, &["simulate", "collect"], vec![]).unwrap_err();
    match fault(err) {
        ValidationFault::MultipleSchemaObjectives(objectives) => {
            assert_eq!(objectives, vec!["simulate".to_string(), "collect".to_string()]);
        }
        other => panic!("unexpected fault {:?}", other),
    }
}

#[test]
fn test_unknown_schema_key_is_rejected() {
    let registry = registry();
    let err = Task::from_registry(&registry, &["mesh"], vec![]).unwrap_err();
    assert_eq!(err.code(), "WF-VAL-006");
}

#[test]
fn test_actions_must_use_known_environments() {
    let err = SchemaRegistry::from_yaml_str(
        r#"
task_schemas:
  - objective: simulate
    actions:
      - commands:
          - command: run
        environments:
          - environment: missing_env
"#,
    )
    .unwrap_err();
    assert_eq!(err.code, "WF-VAL-007");
}

#[test]
fn test_loose_arguments_conflict_with_element_sets() {
    let args = ElementSetArgs {
        inputs: vec![InputValue::new("p1", json!(1))],
        element_sets: vec![ElementSet::new()],
        ..ElementSetArgs::default()
    };
    assert!(matches!(
        args.into_element_sets(),
        Err(ValidationFault::ConflictingElementSetArguments)
    ));
}

#[test]
fn test_repeated_tasks_get_unique_names() {
    let dir = TempDir::new().unwrap();
    let registry = registry();
    let workflow = new_workflow(
        dir.path(),
        vec![
            sweep_task(&registry),
            sweep_task(&registry),
            Task::from_registry(&registry, &["collect"], vec![]).unwrap(),
        ],
    );

    assert_eq!(
        workflow.task_unique_names(),
        vec![
            "sweep_1".to_string(),
            "sweep_2".to_string(),
            "collect".to_string()
        ]
    );
    let second = workflow.task(1).unwrap();
    assert_eq!(second.insert_id(), 1);
    assert_eq!(second.dir_name(), "task_1_sweep_2");
    assert_eq!(workflow.task_index_by_name("collect").unwrap(), 2);
    assert!(matches!(
        workflow.task_index_by_name("sweep"),
        Err(WorkflowError::UnknownTask(_))
    ));
}
