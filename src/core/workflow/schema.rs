#![allow(clippy::result_large_err)]

//! Task schemas, actions and environments.
//!
//! A [`SchemaRegistry`] is loaded once, validated, and treated as immutable for
//! the lifetime of every workflow built from it.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow::error::{ValidationFault, WorkflowError};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;

static PARAMETER_PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
static SCOPE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn parameter_placeholder() -> &'static Regex {
    PARAMETER_PLACEHOLDER.get_or_init(|| {
        Regex::new(r"<<parameter:(.*?)>>").expect("parameter placeholder pattern is valid")
    })
}

fn scope_pattern() -> &'static Regex {
    SCOPE_PATTERN
        .get_or_init(|| Regex::new(r"^(\w*)(?:\[(.*)\])?$").expect("scope pattern is valid"))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaInput {
    pub parameter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaOutput {
    pub parameter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSchema {
    pub objective: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<String>,
    #[serde(default)]
    pub inputs: Vec<SchemaInput>,
    #[serde(default)]
    pub outputs: Vec<SchemaOutput>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl TaskSchema {
    /// Registry key: `objective[_method][_implementation]`.
    pub fn key(&self) -> String {
        let mut key = self.objective.clone();
        for part in [&self.method, &self.implementation].into_iter().flatten() {
            key.push('_');
            key.push_str(part);
        }
        key
    }

    pub fn input_types(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().map(|i| i.parameter.as_str())
    }

    pub fn output_types(&self) -> impl Iterator<Item = &str> {
        self.outputs.iter().map(|o| o.parameter.as_str())
    }

    pub fn input(&self, parameter: &str) -> Option<&SchemaInput> {
        self.inputs.iter().find(|i| i.parameter == parameter)
    }
}

/// Scope an action environment applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionScope {
    Any,
    Main,
    Processing,
    InputFileGenerator { file: Option<String> },
    OutputFileParser { output: Option<String> },
}

impl FromStr for ActionScope {
    type Err = ValidationFault;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationFault::InvalidActionScope {
            scope: raw.to_string(),
            reason: reason.to_string(),
        };
        let caps = scope_pattern()
            .captures(raw.trim())
            .ok_or_else(|| invalid("expected `keyword` or `keyword[key=value]`"))?;
        let keyword = caps.get(1).map(|m| m.as_str()).unwrap_or_default();

        let mut kwargs: IndexMap<String, String> = IndexMap::new();
        if let Some(args) = caps.get(2) {
            for pair in args.as_str().split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| invalid("scope arguments must be key=value pairs"))?;
                kwargs.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        let allowed: &[&str] = match keyword {
            "any" | "main" | "processing" => &[],
            "input_file_generator" => &["file"],
            "output_file_parser" => &["output"],
            _ => return Err(invalid("unknown scope keyword")),
        };
        if let Some(unknown) = kwargs.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(invalid(&format!("unexpected argument {:?}", unknown)));
        }

        Ok(match keyword {
            "any" => ActionScope::Any,
            "main" => ActionScope::Main,
            "processing" => ActionScope::Processing,
            "input_file_generator" => ActionScope::InputFileGenerator {
                file: kwargs.shift_remove("file"),
            },
            _ => ActionScope::OutputFileParser {
                output: kwargs.shift_remove("output"),
            },
        })
    }
}

impl fmt::Display for ActionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionScope::Any => write!(f, "any"),
            ActionScope::Main => write!(f, "main"),
            ActionScope::Processing => write!(f, "processing"),
            ActionScope::InputFileGenerator { file: None } => write!(f, "input_file_generator"),
            ActionScope::InputFileGenerator { file: Some(file) } => {
                write!(f, "input_file_generator[file={}]", file)
            }
            ActionScope::OutputFileParser { output: None } => write!(f, "output_file_parser"),
            ActionScope::OutputFileParser {
                output: Some(output),
            } => write!(f, "output_file_parser[output={}]", output),
        }
    }
}

impl Serialize for ActionScope {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ActionScope {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvironment {
    pub environment: String,
    #[serde(default = "default_scope")]
    pub scope: ActionScope,
}

fn default_scope() -> ActionScope {
    ActionScope::Any
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub command: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputFileGenerator {
    pub input_file: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    pub script: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputFileParser {
    pub output: String,
    #[serde(default)]
    pub output_files: Vec<String>,
    pub script: String,
}

/// Element-level precondition for running an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_exists: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_missing: Option<String>,
}

impl ActionRule {
    pub fn exists(path: impl Into<String>) -> Self {
        ActionRule {
            check_exists: Some(path.into()),
            check_missing: None,
        }
    }

    pub fn missing(path: impl Into<String>) -> Self {
        ActionRule {
            check_exists: None,
            check_missing: Some(path.into()),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationFault> {
        match (&self.check_exists, &self.check_missing) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(ValidationFault::InvalidActionRule),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Action {
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default)]
    pub environments: Vec<ActionEnvironment>,
    #[serde(default)]
    pub input_file_generators: Vec<InputFileGenerator>,
    #[serde(default)]
    pub output_file_parsers: Vec<OutputFileParser>,
    #[serde(default)]
    pub rules: Vec<ActionRule>,
}

impl Action {
    /// Parameter types referenced through `<<parameter:X>>` in any command.
    pub fn command_input_types(&self) -> Vec<String> {
        let mut types = Vec::new();
        for command in &self.commands {
            for caps in parameter_placeholder().captures_iter(&command.command) {
                let typ = caps[1].to_string();
                if !types.contains(&typ) {
                    types.push(typ);
                }
            }
        }
        types
    }

    /// Environment of the first scope in `candidates` this action declares.
    pub fn environment_for(&self, candidates: &[ActionScope]) -> Option<&str> {
        candidates.iter().find_map(|scope| {
            self.environments
                .iter()
                .find(|env| &env.scope == scope)
                .map(|env| env.environment.as_str())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableInstance {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_cores: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Executable {
    pub label: String,
    #[serde(default)]
    pub instances: Vec<ExecutableInstance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub executables: Vec<Executable>,
}

#[derive(Debug, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    task_schemas: Vec<TaskSchema>,
    #[serde(default)]
    environments: Vec<Environment>,
}

/// Validated set of task schemas and environments.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    task_schemas: IndexMap<String, TaskSchema>,
    environments: IndexMap<String, Environment>,
}

impl SchemaRegistry {
    pub fn new(
        task_schemas: Vec<TaskSchema>,
        environments: Vec<Environment>,
    ) -> Result<Self, WorkflowError> {
        let mut registry = SchemaRegistry::default();
        for env in environments {
            registry.environments.insert(env.name.clone(), env);
        }
        for schema in task_schemas {
            let key = schema.key();
            if registry.task_schemas.contains_key(&key) {
                return Err(ValidationFault::DuplicateTaskSchema(key).into());
            }
            registry.task_schemas.insert(key, schema);
        }
        registry.validate()?;
        Ok(registry)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, AppError> {
        let doc: RegistryDocument = serde_yaml::from_str(text).map_err(|err| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("failed to parse schema registry: {}", err),
            )
        })?;
        Ok(Self::new(doc.task_schemas, doc.environments)?)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, AppError> {
        let text = fs::read_to_string(path).map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to read {}: {}", path.display(), err),
            )
        })?;
        Self::from_yaml_str(&text).map_err(|err| err.with_context("path", path.display().to_string()))
    }

    fn validate(&self) -> Result<(), WorkflowError> {
        let known: HashSet<&str> = self.environments.keys().map(String::as_str).collect();
        for schema in self.task_schemas.values() {
            for action in &schema.actions {
                for env in &action.environments {
                    if !known.contains(env.environment.as_str()) {
                        return Err(ValidationFault::UnknownEnvironment(env.environment.clone()).into());
                    }
                }
                for rule in &action.rules {
                    rule.validate()?;
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<&TaskSchema, WorkflowError> {
        self.task_schemas
            .get(key)
            .ok_or_else(|| ValidationFault::UnknownTaskSchema(key.to_string()).into())
    }

    pub fn environment(&self, name: &str) -> Option<&Environment> {
        self.environments.get(name)
    }

    pub fn task_schemas(&self) -> impl Iterator<Item = &TaskSchema> {
        self.task_schemas.values()
    }

    pub fn environments(&self) -> impl Iterator<Item = &Environment> {
        self.environments.values()
    }
}
