//! Declared parametrisations of a task.

use crate::core::workflow::error::{ValidationFault, WorkflowError};
use crate::core::workflow::parameters::ParameterStore;
use crate::core::workflow::paths;
use crate::core::workflow::sources::InputSource;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

/// A single input value, or a sub-value when `path` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputValue {
    pub parameter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_group: Option<usize>,
}

impl InputValue {
    pub fn new(parameter: impl Into<String>, value: Value) -> Self {
        InputValue {
            parameter: parameter.into(),
            path: None,
            value,
            value_group: None,
        }
    }

    pub fn sub_value(parameter: impl Into<String>, path: impl Into<String>, value: Value) -> Self {
        InputValue {
            parameter: parameter.into(),
            path: Some(path.into()),
            value,
            value_group: None,
        }
    }

    pub fn is_sub_value(&self) -> bool {
        self.path.is_some()
    }

    /// Path relative to `inputs.`, e.g. `p1` or `p1.a`.
    pub fn inputs_path(&self) -> String {
        match &self.path {
            Some(path) => format!("{}.{}", self.parameter, path),
            None => self.parameter.clone(),
        }
    }

    pub fn normalised_path(&self) -> String {
        format!("{}.{}", paths::INPUTS, self.inputs_path())
    }
}

/// A file supplied directly instead of being generated from inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputFile {
    pub file: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_group: Option<usize>,
}

impl InputFile {
    pub fn new(file: impl Into<String>, path: impl Into<String>) -> Self {
        InputFile {
            file: file.into(),
            path: path.into(),
            value_group: None,
        }
    }

    pub fn normalised_path(&self) -> String {
        format!("{}.{}", paths::INPUT_FILES, self.file)
    }
}

/// Ordered values driving one input, sub-input or resource path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueSequence {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nesting_order: Option<f64>,
    pub values: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_groups: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_unused: bool,
}

impl ValueSequence {
    pub fn new(path: &str, values: Vec<Value>, nesting_order: Option<f64>) -> Self {
        ValueSequence {
            path: paths::normalise_input_path(path),
            nesting_order,
            values,
            value_groups: None,
            is_unused: false,
        }
    }

    /// Input parameter type driven by this sequence; `None` for resource sequences.
    pub fn input_type(&self) -> Option<&str> {
        paths::input_type(&self.path)
    }

    pub fn is_sub_value(&self) -> bool {
        self.input_type().is_some() && paths::depth(&self.path) > 2
    }

    /// Path relative to `inputs.`, for input sequences.
    pub fn inputs_path(&self) -> Option<&str> {
        self.input_type().map(|_| paths::strip_inputs_prefix(&self.path))
    }
}

/// Resource settings for one scope, persisted under `resources.<scope>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default = "default_resource_scope")]
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_group: Option<usize>,
    #[serde(flatten)]
    pub settings: IndexMap<String, Value>,
}

fn default_resource_scope() -> String {
    "any".to_string()
}

impl Default for ResourceSpec {
    fn default() -> Self {
        ResourceSpec {
            scope: default_resource_scope(),
            value_group: None,
            settings: IndexMap::new(),
        }
    }
}

impl ResourceSpec {
    pub fn new(scope: impl Into<String>, settings: IndexMap<String, Value>) -> Self {
        ResourceSpec {
            scope: scope.into(),
            value_group: None,
            settings,
        }
    }

    pub fn normalised_path(&self) -> String {
        format!("{}.{}", paths::RESOURCES, self.scope)
    }

    fn settings_value(&self) -> Value {
        Value::Object(
            self.settings
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSourceMode {
    Manual,
    Auto,
}

/// A declared parametrisation that expands into one or more elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSet {
    #[serde(default)]
    pub inputs: Vec<InputValue>,
    #[serde(default)]
    pub input_files: Vec<InputFile>,
    #[serde(default)]
    pub sequences: Vec<ValueSequence>,
    #[serde(default = "default_resources")]
    pub resources: Vec<ResourceSpec>,
    #[serde(default = "default_repeats")]
    pub repeats: usize,
    /// Candidate sources keyed by path relative to `inputs.`.
    #[serde(default)]
    pub input_sources: IndexMap<String, Vec<InputSource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_source_mode: Option<InputSourceMode>,
    /// Nesting orders keyed by normalised path.
    #[serde(default)]
    pub nesting_order: IndexMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sourceable_elements: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_input_sources: Option<IndexMap<String, Vec<InputSource>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_nesting_order: Option<IndexMap<String, f64>>,
}

fn default_resources() -> Vec<ResourceSpec> {
    vec![ResourceSpec::default()]
}

fn default_repeats() -> usize {
    1
}

impl Default for ElementSet {
    fn default() -> Self {
        ElementSet {
            inputs: Vec::new(),
            input_files: Vec::new(),
            sequences: Vec::new(),
            resources: default_resources(),
            repeats: default_repeats(),
            input_sources: IndexMap::new(),
            input_source_mode: None,
            nesting_order: IndexMap::new(),
            sourceable_elements: None,
            original_input_sources: None,
            original_nesting_order: None,
        }
    }
}

impl ElementSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(mut self, input: InputValue) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_input_file(mut self, file: InputFile) -> Self {
        self.input_files.push(file);
        self
    }

    pub fn with_sequence(mut self, sequence: ValueSequence) -> Self {
        self.sequences.push(sequence);
        self
    }

    pub fn with_resources(mut self, resources: Vec<ResourceSpec>) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_input_sources(mut self, path: &str, sources: Vec<InputSource>) -> Self {
        self.input_sources
            .insert(paths::strip_inputs_prefix(path).to_string(), sources);
        self
    }

    pub fn with_nesting_order(mut self, path: &str, order: f64) -> Self {
        self.nesting_order
            .insert(paths::normalise_input_path(path), order);
        self
    }

    pub fn with_sourceable_elements(mut self, elements: Vec<usize>) -> Self {
        self.sourceable_elements = Some(elements);
        self
    }

    pub fn input_source_mode(&self) -> InputSourceMode {
        self.input_source_mode.unwrap_or(if self.input_sources.is_empty() {
            InputSourceMode::Auto
        } else {
            InputSourceMode::Manual
        })
    }

    /// Reject duplicate input value definitions.
    pub fn validate(&self) -> Result<(), ValidationFault> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for input in &self.inputs {
            let path = input.inputs_path();
            if !seen.insert(path.clone()) && !duplicates.contains(&path) {
                duplicates.push(path);
            }
        }
        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(ValidationFault::MultipleInputValues(duplicates))
        }
    }

    /// Check against the owning task's schema input types, folding sequence
    /// nesting orders into `nesting_order`.
    pub fn validate_against_schema_inputs(
        &mut self,
        schema_input_types: &[String],
    ) -> Result<(), ValidationFault> {
        let known = |typ: &str| schema_input_types.iter().any(|t| t == typ);

        let mut unexpected: Vec<String> = Vec::new();
        for input in &self.inputs {
            if !known(&input.parameter) && !unexpected.contains(&input.parameter) {
                unexpected.push(input.parameter.clone());
            }
        }
        if !unexpected.is_empty() {
            return Err(ValidationFault::UnexpectedInput(unexpected));
        }

        for sequence in &self.sequences {
            if let Some(typ) = sequence.input_type() {
                if !known(typ) {
                    return Err(ValidationFault::UnexpectedSequenceInput {
                        input_type: typ.to_string(),
                        path: sequence.path.clone(),
                        available: schema_input_types.to_vec(),
                    });
                }
            }
            if let Some(order) = sequence.nesting_order {
                self.nesting_order
                    .entry(sequence.path.clone())
                    .or_insert(order);
            }
        }

        for (path, value) in &self.nesting_order {
            if *value < 0.0 {
                return Err(ValidationFault::InvalidNesting {
                    path: path.clone(),
                    value: *value,
                });
            }
        }
        Ok(())
    }

    /// Parameter types defined locally as whole values.
    pub fn defined_parameter_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        let candidates = self
            .inputs
            .iter()
            .filter(|i| !i.is_sub_value())
            .map(|i| i.parameter.clone())
            .chain(
                self.sequences
                    .iter()
                    .filter(|s| !s.is_sub_value())
                    .filter_map(|s| s.input_type().map(str::to_string)),
            );
        for typ in candidates {
            if !types.contains(&typ) {
                types.push(typ);
            }
        }
        types
    }

    /// Sub-parameter paths (`p1.a`) defined locally.
    pub fn defined_sub_parameter_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        let candidates = self
            .inputs
            .iter()
            .filter(|i| i.is_sub_value())
            .map(InputValue::inputs_path)
            .chain(
                self.sequences
                    .iter()
                    .filter(|s| s.is_sub_value())
                    .filter_map(|s| s.inputs_path().map(str::to_string)),
            );
        for path in candidates {
            if !types.contains(&path) {
                types.push(path);
            }
        }
        types
    }

    pub fn locally_defined_inputs(&self) -> Vec<String> {
        let mut all = self.defined_parameter_types();
        all.extend(self.defined_sub_parameter_types());
        all
    }

    pub fn sequence_by_path_mut(&mut self, path: &str) -> Option<&mut ValueSequence> {
        self.sequences.iter_mut().find(|s| s.path == path)
    }

    /// Copy taken just before merging into a workflow, remembering the
    /// caller's nesting orders and sources.
    pub fn prepare_persistent_copy(&self) -> ElementSet {
        let mut copy = self.clone();
        copy.original_nesting_order = Some(self.nesting_order.clone());
        copy.original_input_sources = Some(self.input_sources.clone());
        copy
    }
}

/// Element-set fields given loosely, or a list of complete element sets;
/// never both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementSetArgs {
    pub inputs: Vec<InputValue>,
    pub input_files: Vec<InputFile>,
    pub sequences: Vec<ValueSequence>,
    pub resources: Option<Vec<ResourceSpec>>,
    pub repeats: Option<usize>,
    pub input_sources: IndexMap<String, Vec<InputSource>>,
    pub input_source_mode: Option<InputSourceMode>,
    pub nesting_order: IndexMap<String, f64>,
    pub sourceable_elements: Option<Vec<usize>>,
    pub element_sets: Vec<ElementSet>,
}

impl ElementSetArgs {
    fn has_loose_fields(&self) -> bool {
        !self.inputs.is_empty()
            || !self.input_files.is_empty()
            || !self.sequences.is_empty()
            || self.resources.is_some()
            || self.repeats.is_some()
            || !self.input_sources.is_empty()
            || self.input_source_mode.is_some()
            || !self.nesting_order.is_empty()
            || self.sourceable_elements.is_some()
    }

    pub fn into_element_sets(self) -> Result<Vec<ElementSet>, ValidationFault> {
        if !self.element_sets.is_empty() {
            if self.has_loose_fields() {
                return Err(ValidationFault::ConflictingElementSetArguments);
            }
            return Ok(self.element_sets);
        }
        Ok(vec![ElementSet {
            inputs: self.inputs,
            input_files: self.input_files,
            sequences: self.sequences,
            resources: self.resources.unwrap_or_else(default_resources),
            repeats: self.repeats.unwrap_or_else(default_repeats),
            input_sources: self
                .input_sources
                .into_iter()
                .map(|(k, v)| (paths::strip_inputs_prefix(&k).to_string(), v))
                .collect(),
            input_source_mode: self.input_source_mode,
            nesting_order: self
                .nesting_order
                .into_iter()
                .map(|(k, v)| (paths::normalise_input_path(&k), v))
                .collect(),
            sourceable_elements: self.sourceable_elements,
            original_input_sources: None,
            original_nesting_order: None,
        }])
    }
}

/// Result of persisting one locally defined value.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedValue {
    pub path: String,
    pub groups: Vec<usize>,
    pub is_new: bool,
}

impl InputValue {
    pub fn make_persistent(
        &mut self,
        params: &ParameterStore<'_>,
        pending: bool,
    ) -> Result<PersistedValue, WorkflowError> {
        let (group, is_new) = match self.value_group {
            Some(group) => (group, false),
            None => {
                let group = params.create(&self.value, pending, true)?;
                self.value_group = Some(group);
                (group, true)
            }
        };
        Ok(PersistedValue {
            path: self.normalised_path(),
            groups: vec![group],
            is_new,
        })
    }
}

impl InputFile {
    pub fn make_persistent(
        &mut self,
        params: &ParameterStore<'_>,
        pending: bool,
    ) -> Result<PersistedValue, WorkflowError> {
        let (group, is_new) = match self.value_group {
            Some(group) => (group, false),
            None => {
                let group = params.create(&json!({ "path": self.path }), pending, true)?;
                self.value_group = Some(group);
                (group, true)
            }
        };
        Ok(PersistedValue {
            path: self.normalised_path(),
            groups: vec![group],
            is_new,
        })
    }
}

impl ValueSequence {
    pub fn make_persistent(
        &mut self,
        params: &ParameterStore<'_>,
        pending: bool,
    ) -> Result<PersistedValue, WorkflowError> {
        if let Some(groups) = &self.value_groups {
            return Ok(PersistedValue {
                path: self.path.clone(),
                groups: groups.clone(),
                is_new: false,
            });
        }
        let groups = self
            .values
            .iter()
            .map(|value| params.create(value, pending, true))
            .collect::<Result<Vec<_>, _>>()?;
        self.value_groups = Some(groups.clone());
        Ok(PersistedValue {
            path: self.path.clone(),
            groups,
            is_new: true,
        })
    }
}

impl ResourceSpec {
    pub fn make_persistent(
        &mut self,
        params: &ParameterStore<'_>,
        pending: bool,
    ) -> Result<PersistedValue, WorkflowError> {
        let (group, is_new) = match self.value_group {
            Some(group) => (group, false),
            None => {
                let group = params.create(&self.settings_value(), pending, true)?;
                self.value_group = Some(group);
                (group, true)
            }
        };
        Ok(PersistedValue {
            path: self.normalised_path(),
            groups: vec![group],
            is_new,
        })
    }
}
