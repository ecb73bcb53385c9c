//! Tasks: schema-typed groups of element sets.

use crate::core::workflow::element_set::ElementSet;
use crate::core::workflow::error::{ValidationFault, WorkflowError};
use crate::core::workflow::paths;
use crate::core::workflow::schema::{
    Environment, SchemaInput, SchemaOutput, SchemaRegistry, TaskSchema,
};
use crate::core::workflow::sources::TaskSourceKind;
use indexmap::IndexMap;
use std::collections::HashMap;

/// Per-input facts used when choosing sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputInfo {
    pub has_default: bool,
    pub is_required: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    name: String,
    schemas: Vec<TaskSchema>,
    element_sets: Vec<ElementSet>,
    environments: Vec<Environment>,
}

impl Task {
    /// Build and validate a task. Every schema must share one objective and
    /// every element set must fit the schemas' inputs.
    pub fn new(schemas: Vec<TaskSchema>, element_sets: Vec<ElementSet>) -> Result<Self, WorkflowError> {
        if schemas.is_empty() {
            return Err(ValidationFault::MissingTaskSchema.into());
        }
        let mut objectives: Vec<String> = Vec::new();
        for schema in &schemas {
            if !objectives.contains(&schema.objective) {
                objectives.push(schema.objective.clone());
            }
        }
        if objectives.len() > 1 {
            return Err(ValidationFault::MultipleSchemaObjectives(objectives).into());
        }

        let element_sets = if element_sets.is_empty() {
            vec![ElementSet::default()]
        } else {
            element_sets
        };

        let mut task = Task {
            name: task_name(&schemas),
            schemas,
            element_sets: Vec::new(),
            environments: Vec::new(),
        };
        let input_types = task.all_schema_input_types();
        for mut element_set in element_sets {
            element_set.validate()?;
            element_set.validate_against_schema_inputs(&input_types)?;
            task.element_sets.push(element_set);
        }
        Ok(task)
    }

    /// Build a task from registry schema keys, carrying along the
    /// environments its actions use.
    pub fn from_registry<S: AsRef<str>>(
        registry: &SchemaRegistry,
        schema_keys: &[S],
        element_sets: Vec<ElementSet>,
    ) -> Result<Self, WorkflowError> {
        let schemas = schema_keys
            .iter()
            .map(|key| registry.get(key.as_ref()).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let mut environments: Vec<Environment> = Vec::new();
        for action in schemas.iter().flat_map(|s| s.actions.iter()) {
            for env in &action.environments {
                if environments.iter().any(|e| e.name == env.environment) {
                    continue;
                }
                if let Some(found) = registry.environment(&env.environment) {
                    environments.push(found.clone());
                }
            }
        }
        Ok(Self::new(schemas, element_sets)?.with_environments(environments))
    }

    pub fn with_environments(mut self, environments: Vec<Environment>) -> Self {
        self.environments = environments;
        self
    }

    /// Reassemble an already-validated task from persisted parts.
    pub(crate) fn restore(name: String, schemas: Vec<TaskSchema>, element_sets: Vec<ElementSet>) -> Self {
        Task {
            name,
            schemas,
            element_sets,
            environments: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn objective(&self) -> &str {
        &self.schemas[0].objective
    }

    pub fn schemas(&self) -> &[TaskSchema] {
        &self.schemas
    }

    pub fn schema_keys(&self) -> Vec<String> {
        self.schemas.iter().map(TaskSchema::key).collect()
    }

    pub fn element_sets(&self) -> &[ElementSet] {
        &self.element_sets
    }

    pub fn environments(&self) -> &[Environment] {
        &self.environments
    }

    pub fn all_schema_inputs(&self) -> impl Iterator<Item = &SchemaInput> {
        self.schemas.iter().flat_map(|s| s.inputs.iter())
    }

    pub fn all_schema_outputs(&self) -> impl Iterator<Item = &SchemaOutput> {
        self.schemas.iter().flat_map(|s| s.outputs.iter())
    }

    pub fn all_schema_input_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for typ in self.schemas.iter().flat_map(|s| s.input_types()) {
            if !types.iter().any(|t| t == typ) {
                types.push(typ.to_string());
            }
        }
        types
    }

    pub fn all_schema_output_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for typ in self.schemas.iter().flat_map(|s| s.output_types()) {
            if !types.iter().any(|t| t == typ) {
                types.push(typ.to_string());
            }
        }
        types
    }

    /// Parameters this task makes available to later tasks, outputs first.
    pub fn provides_parameters(&self) -> Vec<(String, TaskSourceKind)> {
        let mut provided = Vec::new();
        for schema in &self.schemas {
            for typ in schema.output_types() {
                provided.push((typ.to_string(), TaskSourceKind::Output));
            }
            for typ in schema.input_types() {
                provided.push((typ.to_string(), TaskSourceKind::Input));
            }
        }
        provided
    }

    /// Whether an input type must be sourced: it appears in a command, or
    /// feeds a file generator whose file is not supplied by the element set.
    /// Sub-value paths follow their parent parameter.
    pub fn is_input_type_required(&self, inputs_path: &str, element_set: &ElementSet) -> bool {
        let typ = inputs_path.split('.').next().unwrap_or(inputs_path);
        let provided_files: Vec<&str> = element_set
            .input_files
            .iter()
            .map(|f| f.file.as_str())
            .collect();
        self.schemas.iter().flat_map(|s| s.actions.iter()).any(|action| {
            action.command_input_types().iter().any(|t| t == typ)
                || action.input_file_generators.iter().any(|generator| {
                    generator.inputs.iter().any(|i| i == typ)
                        && !provided_files.contains(&generator.input_file.as_str())
                })
        })
    }

    /// Schema input types and locally defined sub-value paths, keyed by path
    /// relative to `inputs.`.
    pub fn inputs_info(&self, element_set: &ElementSet) -> IndexMap<String, InputInfo> {
        let mut info = IndexMap::new();
        for input in self.all_schema_inputs() {
            info.entry(input.parameter.clone()).or_insert(InputInfo {
                has_default: input.default_value.is_some(),
                is_required: self.is_input_type_required(&input.parameter, element_set),
            });
        }
        for path in element_set.defined_sub_parameter_types() {
            let is_required = self.is_input_type_required(&path, element_set);
            info.entry(path).or_insert(InputInfo {
                has_default: false,
                is_required,
            });
        }
        info
    }

    pub fn required_schema_inputs(&self, element_set: &ElementSet) -> Vec<&SchemaInput> {
        let info = self.inputs_info(element_set);
        self.all_schema_inputs()
            .filter(|i| info.get(&i.parameter).is_some_and(|i| i.is_required))
            .collect()
    }

    /// Every normalised input path that records a source per element.
    pub fn all_sourced_normalised_paths(&self) -> Vec<String> {
        let mut sourced: Vec<String> = Vec::new();
        for element_set in &self.element_sets {
            for path in element_set.defined_sub_parameter_types() {
                let path = paths::normalise_input_path(&path);
                if !sourced.contains(&path) {
                    sourced.push(path);
                }
            }
        }
        for typ in self.all_schema_input_types() {
            let path = format!("{}.{}", paths::INPUTS, typ);
            if !sourced.contains(&path) {
                sourced.push(path);
            }
        }
        sourced
    }

    pub fn all_used_sequences_normalised_paths(&self) -> Vec<String> {
        let mut used: Vec<String> = Vec::new();
        for sequence in self.element_sets.iter().flat_map(|s| s.sequences.iter()) {
            if !sequence.is_unused && !used.contains(&sequence.path) {
                used.push(sequence.path.clone());
            }
        }
        used
    }

    /// Validate an element set against this task, as when adding elements.
    pub fn attach_element_set(&self, mut element_set: ElementSet) -> Result<ElementSet, WorkflowError> {
        element_set.validate()?;
        element_set.validate_against_schema_inputs(&self.all_schema_input_types())?;
        Ok(element_set)
    }
}

/// `objective[_method][_implementation]`, joining schemas with `_and` when the
/// next schema adds a method or implementation.
fn task_name(schemas: &[TaskSchema]) -> String {
    let mut name = schemas[0].objective.clone();
    for (idx, schema) in schemas.iter().enumerate() {
        for part in [&schema.method, &schema.implementation].into_iter().flatten() {
            name.push('_');
            name.push_str(part);
        }
        let need_and = schemas
            .get(idx + 1)
            .is_some_and(|next| next.method.is_some() || next.implementation.is_some());
        if need_and {
            name.push_str("_and");
        }
    }
    name
}

/// Repeat index of each name: 0 for names that occur once, otherwise the
/// 1-based occurrence number.
pub fn repeat_indices<S: AsRef<str>>(names: &[S]) -> Vec<usize> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in names {
        *counts.entry(name.as_ref()).or_default() += 1;
    }
    let mut seen: HashMap<&str, usize> = HashMap::new();
    names
        .iter()
        .map(|name| {
            let name = name.as_ref();
            if counts[name] > 1 {
                let repeat = seen.entry(name).or_default();
                *repeat += 1;
                *repeat
            } else {
                0
            }
        })
        .collect()
}

pub fn unique_name(name: &str, repeat_index: usize) -> String {
    if repeat_index > 0 {
        format!("{}_{}", name, repeat_index)
    } else {
        name.to_string()
    }
}

/// Unique names for tasks in order. Names occurring more than once get a
/// 1-based repeat suffix on every occurrence.
pub fn unique_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names
        .iter()
        .zip(repeat_indices(names))
        .map(|(name, idx)| unique_name(name.as_ref(), idx))
        .collect()
}
