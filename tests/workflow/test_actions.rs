mod common;

use common::config;
use paramflow::core::workflow::{
    resolve_element_actions, ActionKind, ActionScope, ElementSet, InputFile, InputValue,
    PlaceholderKind, SchemaRegistry, Task, Workflow, WorkflowError, WorkflowTemplate,
};
use serde_json::json;
use tempfile::TempDir;

const REGISTRY: &str = r#"
environments:
  - name: python_env
  - name: solver_env
task_schemas:
  - objective: solve
    inputs:
      - parameter: mesh
      - parameter: tolerance
        default_value: 0.001
    outputs:
      - parameter: residual
    actions:
      - commands:
          - command: "solver --input input.dat --mesh <<parameter:mesh>>"
        input_file_generators:
          - input_file: input_dat
            inputs: [mesh, tolerance]
            script: write_input.py
        output_file_parsers:
          - output: residual
            output_files: [output_dat]
            script: parse_residual.py
        environments:
          - environment: python_env
            scope: processing
          - environment: solver_env
            scope: main
      - commands:
          - command: "refine <<parameter:mesh>>"
        rules:
          - check_exists: inputs.mesh.refine
        environments:
          - environment: solver_env
  - objective: broken
    inputs:
      - parameter: mesh
    actions:
      - commands:
          - command: "run <<parameter:mesh>>"
        environments:
          - environment: python_env
            scope: "output_file_parser[output=residual]"
"#;

fn workflow(dir: &TempDir, schema: &str, set: ElementSet) -> Workflow {
    let registry = SchemaRegistry::from_yaml_str(REGISTRY).unwrap();
    let task = Task::from_registry(&registry, &[schema], vec![set]).unwrap();
    Workflow::from_template(
        &WorkflowTemplate::new("actions", vec![task]),
        Some(dir.path()),
        None,
        false,
        config(),
    )
    .unwrap()
}

#[test]
fn test_generator_main_and_parser_run_in_order() {
    let dir = TempDir::new().unwrap();
    let wk = workflow(
        &dir,
        "solve",
        ElementSet::new().with_input(InputValue::new("mesh", json!({"cells": 10}))),
    );
    let element = wk.element(0).unwrap();
    let actions = resolve_element_actions(&element).unwrap();

    let kinds: Vec<ActionKind> = actions.iter().map(|a| a.kind.clone()).collect();
    assert_eq!(
        kinds,
        vec![
            ActionKind::InputFileGenerator {
                file: "input_dat".to_string()
            },
            ActionKind::Main,
            ActionKind::OutputFileParser {
                output: "residual".to_string()
            },
        ]
    );
    assert_eq!(actions[0].environment, "python_env");
    assert_eq!(actions[0].scope, ActionScope::Processing);
    assert_eq!(actions[1].environment, "solver_env");
    assert_eq!(actions[1].scope, ActionScope::Main);
    assert_eq!(actions[0].placeholders[1].kind, PlaceholderKind::Script);
    assert_eq!(actions[0].placeholders[1].name, "write_input.py");
    assert_eq!(
        element.input_sources().get("inputs.tolerance").map(String::as_str),
        Some("default")
    );
}

#[test]
fn test_supplied_input_file_skips_its_generator() {
    let dir = TempDir::new().unwrap();
    let wk = workflow(
        &dir,
        "solve",
        ElementSet::new()
            .with_input(InputValue::new("mesh", json!({"cells": 10})))
            .with_input_file(InputFile::new("input_dat", "prepared/input.dat")),
    );
    let element = wk.element(0).unwrap();
    assert!(!element.data_index().contains_key("inputs.tolerance"));

    let actions = resolve_element_actions(&element).unwrap();
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[0].kind, ActionKind::Main);
}

#[test]
fn test_rules_select_actions_per_element() {
    let dir = TempDir::new().unwrap();
    let wk = workflow(
        &dir,
        "solve",
        ElementSet::new()
            .with_input(InputValue::new("mesh", json!({"cells": 10, "refine": true}))),
    );
    let element = wk.element(0).unwrap();
    let actions = resolve_element_actions(&element).unwrap();

    assert_eq!(actions.len(), 4);
    assert_eq!(actions[3].commands, vec!["refine <<parameter:mesh>>".to_string()]);
    assert_eq!(actions[3].scope, ActionScope::Any);
}

#[test]
fn test_missing_environment_is_reported() {
    let dir = TempDir::new().unwrap();
    let wk = workflow(
        &dir,
        "broken",
        ElementSet::new().with_input(InputValue::new("mesh", json!(1))),
    );
    let element = wk.element(0).unwrap();

    let err = resolve_element_actions(&element).unwrap_err();
    assert!(matches!(err, WorkflowError::MissingCompatibleEnvironment { .. }));
    assert_eq!(err.code(), "WF-RES-005");
}
