//! Workflow templates: named task lists, loadable from YAML.
//!
//! ```yaml
//! name: sweep
//! tasks:
//!   - schemas: [simulate_fem]
//!     inputs:
//!       p1: 101
//!       p3.a: 2
//!     sequences:
//!       - path: p2
//!         values: [1, 2, 3]
//!         nesting_order: 0
//!     resources:
//!       any: {num_cores: 4}
//!   - schemas: [analyse]
//!     input_sources:
//!       p4: [task.simulate_fem.output]
//! ```

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::element_set::{
    ElementSet, ElementSetArgs, InputFile, InputSourceMode, InputValue, ResourceSpec,
    ValueSequence,
};
use crate::core::workflow::error::WorkflowError;
use crate::core::workflow::schema::SchemaRegistry;
use crate::core::workflow::sources::InputSource;
use crate::core::workflow::task::Task;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTemplate {
    pub name: String,
    pub tasks: Vec<Task>,
}

impl WorkflowTemplate {
    pub fn new(name: impl Into<String>, tasks: Vec<Task>) -> Self {
        WorkflowTemplate {
            name: name.into(),
            tasks,
        }
    }

    pub fn from_yaml_str(text: &str, registry: &SchemaRegistry) -> Result<Self, AppError> {
        let doc: TemplateDocument = serde_yaml::from_str(text).map_err(|err| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("failed to parse workflow template: {}", err),
            )
        })?;
        let tasks = doc
            .tasks
            .into_iter()
            .map(|task| task.into_task(registry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(WorkflowTemplate::new(doc.name, tasks))
    }

    pub fn load_from_file(path: &Path, registry: &SchemaRegistry) -> Result<Self, AppError> {
        let text = fs::read_to_string(path).map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to read {}: {}", path.display(), err),
            )
        })?;
        Self::from_yaml_str(&text, registry).map_err(|err| err.with_context("path", path.display().to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct TemplateDocument {
    name: String,
    #[serde(default)]
    tasks: Vec<TaskDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(item) => vec![item],
            OneOrMany::Many(items) => items,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TaskDocument {
    schemas: OneOrMany,
    #[serde(flatten)]
    element_set: ElementSetDocument,
    #[serde(default)]
    element_sets: Vec<ElementSetDocument>,
}

impl TaskDocument {
    fn into_task(self, registry: &SchemaRegistry) -> Result<Task, WorkflowError> {
        let mut args = self.element_set.into_args();
        args.element_sets = self
            .element_sets
            .into_iter()
            .map(|doc| doc.into_args().into_element_sets())
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();
        let element_sets: Vec<ElementSet> = args.into_element_sets()?;
        Task::from_registry(registry, &self.schemas.into_vec(), element_sets)
    }
}

/// `inputs` as a mapping of (sub-)paths to values, or a list of input values.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InputsDocument {
    Map(IndexMap<String, Value>),
    List(Vec<InputValue>),
}

impl InputsDocument {
    fn into_inputs(self) -> Vec<InputValue> {
        match self {
            InputsDocument::List(inputs) => inputs,
            InputsDocument::Map(map) => map
                .into_iter()
                .map(|(path, value)| match path.split_once('.') {
                    Some((parameter, sub_path)) => InputValue::sub_value(parameter, sub_path, value),
                    None => InputValue::new(path, value),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SequenceDocument {
    path: String,
    values: Vec<Value>,
    #[serde(default)]
    nesting_order: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct InputFileDocument {
    file: String,
    path: String,
}

#[derive(Debug, Default, Deserialize)]
struct ElementSetDocument {
    #[serde(default)]
    inputs: Option<InputsDocument>,
    #[serde(default)]
    input_files: Vec<InputFileDocument>,
    #[serde(default)]
    sequences: Vec<SequenceDocument>,
    #[serde(default)]
    resources: Option<IndexMap<String, IndexMap<String, Value>>>,
    #[serde(default)]
    repeats: Option<usize>,
    #[serde(default)]
    input_sources: IndexMap<String, Vec<InputSource>>,
    #[serde(default)]
    input_source_mode: Option<InputSourceMode>,
    #[serde(default)]
    nesting_order: IndexMap<String, f64>,
    #[serde(default)]
    sourceable_elements: Option<Vec<usize>>,
}

impl ElementSetDocument {
    fn into_args(self) -> ElementSetArgs {
        ElementSetArgs {
            inputs: self.inputs.map(InputsDocument::into_inputs).unwrap_or_default(),
            input_files: self
                .input_files
                .into_iter()
                .map(|f| InputFile::new(f.file, f.path))
                .collect(),
            sequences: self
                .sequences
                .into_iter()
                .map(|s| ValueSequence::new(&s.path, s.values, s.nesting_order))
                .collect(),
            resources: self.resources.map(|scopes| {
                scopes
                    .into_iter()
                    .map(|(scope, settings)| ResourceSpec::new(scope, settings))
                    .collect()
            }),
            repeats: self.repeats,
            input_sources: self.input_sources,
            input_source_mode: self.input_source_mode,
            nesting_order: self.nesting_order,
            sourceable_elements: self.sourceable_elements,
            element_sets: Vec::new(),
        }
    }
}
