#![allow(dead_code)]

use paramflow::core::config::{EngineConfig, RetryConfig};
use paramflow::core::workflow::{
    ElementSet, SchemaRegistry, Task, ValueSequence, Workflow, WorkflowTemplate,
};
use serde_json::{json, Value};
use std::path::Path;

/// `sweep` consumes `a` and `b` and produces `y`; `collect` turns `y` into `z`;
/// `simulate` takes `p1` and `p2`; `report` has a defaulted `p5`.
pub const REGISTRY: &str = r#"
environments:
  - name: python_env
    executables:
      - label: python
        instances:
          - command: python3
task_schemas:
  - objective: sweep
    inputs:
      - parameter: a
      - parameter: b
    outputs:
      - parameter: y
    actions:
      - commands:
          - command: "sweep --a <<parameter:a>> --b <<parameter:b>>"
        environments:
          - environment: python_env
  - objective: collect
    inputs:
      - parameter: y
    outputs:
      - parameter: z
    actions:
      - commands:
          - command: "collect <<parameter:y>>"
        environments:
          - environment: python_env
  - objective: simulate
    inputs:
      - parameter: p1
      - parameter: p2
    outputs:
      - parameter: p3
    actions:
      - commands:
          - command: "simulate <<parameter:p1>> <<parameter:p2>>"
        environments:
          - environment: python_env
  - objective: report
    inputs:
      - parameter: z
      - parameter: p5
        default_value: 5
    actions:
      - commands:
          - command: "report <<parameter:z>> <<parameter:p5>>"
        environments:
          - environment: python_env
"#;

pub fn registry() -> SchemaRegistry {
    SchemaRegistry::from_yaml_str(REGISTRY).expect("test registry is valid")
}

/// Engine config that never sleeps between retries.
pub fn config() -> EngineConfig {
    EngineConfig {
        retry: RetryConfig::immediate(2),
        ..EngineConfig::default()
    }
}

pub fn task(registry: &SchemaRegistry, schema: &str, element_sets: Vec<ElementSet>) -> Task {
    Task::from_registry(registry, &[schema], element_sets).expect("test task is valid")
}

pub const A_VALUES: [i64; 3] = [10, 20, 30];
pub const B_VALUES: [i64; 2] = [1, 2];

/// `sweep` with `a` over three values (nesting order 0) and `b` over two
/// values (nesting order 1).
pub fn sweep_task(registry: &SchemaRegistry) -> Task {
    let set = ElementSet::new()
        .with_sequence(ValueSequence::new(
            "a",
            A_VALUES.iter().map(|v| json!(v)).collect(),
            Some(0.0),
        ))
        .with_sequence(ValueSequence::new(
            "b",
            B_VALUES.iter().map(|v| json!(v)).collect(),
            Some(1.0),
        ));
    task(registry, "sweep", vec![set])
}

/// `collect` with nothing declared; `y` resolves from the upstream `sweep`.
pub fn collect_task(registry: &SchemaRegistry) -> Task {
    task(registry, "collect", vec![])
}

pub fn new_workflow(dir: &Path, tasks: Vec<Task>) -> Workflow {
    Workflow::from_template(
        &WorkflowTemplate::new("wk", tasks),
        Some(dir),
        None,
        false,
        config(),
    )
    .expect("workflow is created")
}

pub fn value_at(workflow: &Workflow, element: usize, path: &str) -> Value {
    workflow
        .element(element)
        .expect("element exists")
        .get(path, true)
        .expect("path resolves")
        .expect("value present")
}
