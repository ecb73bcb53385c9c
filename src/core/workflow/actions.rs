//! Per-element action resolution.
//!
//! Each schema action expands, for one element, into input-file generator
//! actions, the main command action, and output-file parser actions, each
//! bound to the first environment whose scope matches.

use crate::core::workflow::element::Element;
use crate::core::workflow::error::WorkflowError;
use crate::core::workflow::paths;
use crate::core::workflow::schema::{Action, ActionRule, ActionScope};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();

fn placeholder_pattern() -> &'static Regex {
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"<<(executable|parameter|script|file):(.*?)>>")
            .expect("placeholder pattern is valid")
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
    InputFileGenerator { file: String },
    Main,
    OutputFileParser { output: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    Executable,
    Parameter,
    Script,
    File,
}

/// A `<<kind:name>>` reference inside a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Placeholder {
    pub kind: PlaceholderKind,
    pub name: String,
}

/// An action bound to one element, ready for command-file generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementAction {
    #[serde(flatten)]
    pub kind: ActionKind,
    pub commands: Vec<String>,
    pub environment: String,
    pub scope: ActionScope,
    pub placeholders: Vec<Placeholder>,
}

impl ElementAction {
    fn new(kind: ActionKind, commands: Vec<String>, environment: &str, scope: ActionScope) -> Self {
        let placeholders = parse_placeholders(&commands);
        ElementAction {
            kind,
            commands,
            environment: environment.to_string(),
            scope,
            placeholders,
        }
    }
}

/// Distinct placeholders in order of first appearance.
pub fn parse_placeholders(commands: &[String]) -> Vec<Placeholder> {
    let mut found: Vec<Placeholder> = Vec::new();
    for command in commands {
        for caps in placeholder_pattern().captures_iter(command) {
            let kind = match &caps[1] {
                "executable" => PlaceholderKind::Executable,
                "parameter" => PlaceholderKind::Parameter,
                "script" => PlaceholderKind::Script,
                _ => PlaceholderKind::File,
            };
            let placeholder = Placeholder {
                kind,
                name: caps[2].to_string(),
            };
            if !found.contains(&placeholder) {
                found.push(placeholder);
            }
        }
    }
    found
}

fn rule_holds(element: &Element<'_>, rule: &ActionRule) -> Result<bool, WorkflowError> {
    let (path, want_present) = match (&rule.check_exists, &rule.check_missing) {
        (Some(path), None) => (path, true),
        (None, Some(path)) => (path, false),
        _ => return Ok(true),
    };
    let path = paths::normalise_input_path(path);
    let present = if paths::depth(&path) == 2 {
        element.data_index().contains_key(&path)
    } else {
        element.get(&path, false)?.is_some()
    };
    Ok(present == want_present)
}

fn environment_or_fault<'a>(
    action: &'a Action,
    candidates: &[ActionScope],
    what: String,
) -> Result<(&'a str, ActionScope), WorkflowError> {
    candidates
        .iter()
        .find_map(|scope| {
            action
                .environment_for(std::slice::from_ref(scope))
                .map(|env| (env, scope.clone()))
        })
        .ok_or(WorkflowError::MissingCompatibleEnvironment { action: what })
}

/// Resolve the actions `element` would run, in execution order.
pub fn resolve_element_actions(element: &Element<'_>) -> Result<Vec<ElementAction>, WorkflowError> {
    let task = element.task().template()?;
    let mut resolved = Vec::new();

    for schema in task.schemas() {
        for action in &schema.actions {
            let mut applies = true;
            for rule in &action.rules {
                applies &= rule_holds(element, rule)?;
            }
            if !applies {
                continue;
            }

            for generator in &action.input_file_generators {
                let file_path = format!("{}.{}", paths::INPUT_FILES, generator.input_file);
                if element.data_index().contains_key(&file_path) {
                    continue;
                }
                let (environment, scope) = environment_or_fault(
                    action,
                    &[
                        ActionScope::InputFileGenerator {
                            file: Some(generator.input_file.clone()),
                        },
                        ActionScope::InputFileGenerator { file: None },
                        ActionScope::Processing,
                        ActionScope::Any,
                    ],
                    format!("input file generator of {:?}", generator.input_file),
                )?;
                resolved.push(ElementAction::new(
                    ActionKind::InputFileGenerator {
                        file: generator.input_file.clone(),
                    },
                    vec![format!(
                        "<<executable:python>> <<script:{}>>",
                        generator.script
                    )],
                    environment,
                    scope,
                ));
            }

            if !action.commands.is_empty() {
                let (environment, scope) = environment_or_fault(
                    action,
                    &[ActionScope::Main, ActionScope::Any],
                    format!("main action of task schema {:?}", schema.key()),
                )?;
                resolved.push(ElementAction::new(
                    ActionKind::Main,
                    action.commands.iter().map(|c| c.command.clone()).collect(),
                    environment,
                    scope,
                ));
            }

            for parser in &action.output_file_parsers {
                let (environment, scope) = environment_or_fault(
                    action,
                    &[
                        ActionScope::OutputFileParser {
                            output: Some(parser.output.clone()),
                        },
                        ActionScope::OutputFileParser { output: None },
                        ActionScope::Processing,
                        ActionScope::Any,
                    ],
                    format!("output file parser of {:?}", parser.output),
                )?;
                resolved.push(ElementAction::new(
                    ActionKind::OutputFileParser {
                        output: parser.output.clone(),
                    },
                    vec![format!("<<executable:python>> <<script:{}>>", parser.script)],
                    environment,
                    scope,
                ));
            }
        }
    }
    Ok(resolved)
}
