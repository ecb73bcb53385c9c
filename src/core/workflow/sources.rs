//! Input sources: where each task input may take its values from.

use crate::core::workflow::element_set::ElementSet;
use crate::core::workflow::error::WorkflowError;
use crate::core::workflow::task::Task;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskSourceKind {
    Input,
    Output,
}

impl TaskSourceKind {
    /// Root of the data-index path this kind reads from (`inputs` / `outputs`).
    pub fn data_root(self) -> &'static str {
        match self {
            TaskSourceKind::Input => "inputs",
            TaskSourceKind::Output => "outputs",
        }
    }

    /// Upper-case label used in per-element source strings.
    pub fn label(self) -> &'static str {
        match self {
            TaskSourceKind::Input => "INPUT",
            TaskSourceKind::Output => "OUTPUT",
        }
    }
}

/// Reference to an upstream task, by insert ID or by unique name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskRef {
    InsertId(usize),
    Name(String),
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskRef::InsertId(id) => write!(f, "{}", id),
            TaskRef::Name(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputSource {
    Local,
    Default,
    Task {
        task_ref: TaskRef,
        source_kind: TaskSourceKind,
        elements: Option<Vec<usize>>,
    },
}

impl InputSource {
    pub fn task(task_ref: TaskRef, source_kind: TaskSourceKind) -> Self {
        InputSource::Task {
            task_ref,
            source_kind,
            elements: None,
        }
    }

    pub fn task_output(insert_id: usize) -> Self {
        Self::task(TaskRef::InsertId(insert_id), TaskSourceKind::Output)
    }

    /// Whether this source is among `available`. Task sources match on task and
    /// kind; requested elements must be a subset of those available.
    pub fn is_in(&self, available: &[InputSource]) -> bool {
        available.iter().any(|candidate| match (self, candidate) {
            (InputSource::Local, InputSource::Local) => true,
            (InputSource::Default, InputSource::Default) => true,
            (
                InputSource::Task {
                    task_ref,
                    source_kind,
                    elements,
                },
                InputSource::Task {
                    task_ref: other_ref,
                    source_kind: other_kind,
                    elements: other_elements,
                },
            ) => {
                task_ref == other_ref
                    && source_kind == other_kind
                    && match (elements, other_elements) {
                        (Some(wanted), Some(offered)) => {
                            wanted.iter().all(|e| offered.contains(e))
                        }
                        _ => true,
                    }
            }
            _ => false,
        })
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Local => write!(f, "local"),
            InputSource::Default => write!(f, "default"),
            InputSource::Task {
                task_ref,
                source_kind,
                elements,
            } => {
                let kind = match source_kind {
                    TaskSourceKind::Input => "input",
                    TaskSourceKind::Output => "output",
                };
                write!(f, "task.{}.{}", task_ref, kind)?;
                if let Some(elements) = elements {
                    let joined = elements
                        .iter()
                        .map(usize::to_string)
                        .collect::<Vec<_>>()
                        .join(",");
                    write!(f, "[{}]", joined)?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for InputSource {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        match raw {
            "local" => return Ok(InputSource::Local),
            "default" => return Ok(InputSource::Default),
            _ => {}
        }
        let rest = raw
            .strip_prefix("task.")
            .ok_or_else(|| format!("unknown input source {:?}", raw))?;
        let (body, elements) = match rest.split_once('[') {
            Some((body, tail)) => {
                let list = tail
                    .strip_suffix(']')
                    .ok_or_else(|| format!("unterminated element list in {:?}", raw))?;
                let elements = list
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| s.parse::<usize>().map_err(|e| format!("{:?}: {}", raw, e)))
                    .collect::<Result<Vec<_>, _>>()?;
                (body, Some(elements))
            }
            None => (rest, None),
        };
        let (task, kind) = body
            .rsplit_once('.')
            .ok_or_else(|| format!("expected task.<ref>.<input|output> in {:?}", raw))?;
        let source_kind = match kind {
            "input" => TaskSourceKind::Input,
            "output" => TaskSourceKind::Output,
            other => return Err(format!("unknown task source kind {:?} in {:?}", other, raw)),
        };
        let task_ref = match task.parse::<usize>() {
            Ok(id) => TaskRef::InsertId(id),
            Err(_) => TaskRef::Name(task.to_string()),
        };
        Ok(InputSource::Task {
            task_ref,
            source_kind,
            elements,
        })
    }
}

impl Serialize for InputSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for InputSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// What a preceding task in the workflow can offer as a source.
#[derive(Debug, Clone)]
pub struct UpstreamTask<'a> {
    pub insert_id: usize,
    pub unique_name: &'a str,
    pub task: &'a Task,
    pub element_indices: &'a [usize],
}

/// The task being resolved: its template and identity in the workflow.
#[derive(Debug, Clone, Copy)]
pub struct SourceTarget<'a> {
    pub task: &'a Task,
    pub insert_id: usize,
    pub unique_name: &'a str,
}

/// Ordered candidate sources per input path: local, then upstream tasks in
/// workflow order, then the schema default.
pub fn available_sources(
    task: &Task,
    element_set: &ElementSet,
    upstream: &[UpstreamTask<'_>],
) -> IndexMap<String, Vec<InputSource>> {
    let locally_defined = element_set.locally_defined_inputs();
    let mut available = IndexMap::new();
    for (inputs_path, info) in task.inputs_info(element_set) {
        let mut sources = Vec::new();
        if locally_defined.contains(&inputs_path) {
            sources.push(InputSource::Local);
        }
        for source_task in upstream {
            for (typ, kind) in source_task.task.provides_parameters() {
                if typ != inputs_path {
                    continue;
                }
                let elements = match &element_set.sourceable_elements {
                    Some(sourceable) => {
                        let shared: Vec<usize> = source_task
                            .element_indices
                            .iter()
                            .copied()
                            .filter(|idx| sourceable.contains(idx))
                            .collect();
                        if shared.is_empty() {
                            continue;
                        }
                        Some(shared)
                    }
                    None => None,
                };
                sources.push(InputSource::Task {
                    task_ref: TaskRef::InsertId(source_task.insert_id),
                    source_kind: kind,
                    elements,
                });
            }
        }
        if info.has_default {
            sources.push(InputSource::Default);
        }
        available.insert(inputs_path, sources);
    }
    available
}

/// Rewrite a by-name task reference to an insert ID. A reference to the task
/// itself becomes `Local` when it names inputs and is rejected for outputs.
pub fn resolve_task_reference(
    source: &InputSource,
    target: SourceTarget<'_>,
    upstream: &[UpstreamTask<'_>],
) -> Result<InputSource, WorkflowError> {
    let InputSource::Task {
        task_ref,
        source_kind,
        elements,
    } = source
    else {
        return Ok(source.clone());
    };

    let refers_to_self = match task_ref {
        TaskRef::Name(name) => name == target.unique_name,
        TaskRef::InsertId(id) => *id == target.insert_id,
    };
    if refers_to_self {
        return match source_kind {
            TaskSourceKind::Output => Err(WorkflowError::InvalidTaskReference {
                input_source: source.to_string(),
                reason: "a task cannot source its inputs from its own outputs".to_string(),
            }),
            TaskSourceKind::Input => {
                warn!(
                    source = %source,
                    task = target.unique_name,
                    "input source refers to the task's own inputs, using local source instead"
                );
                Ok(InputSource::Local)
            }
        };
    }

    match task_ref {
        TaskRef::InsertId(_) => Ok(source.clone()),
        TaskRef::Name(name) => {
            let insert_id = upstream
                .iter()
                .find(|t| t.unique_name == name)
                .map(|t| t.insert_id)
                .ok_or_else(|| WorkflowError::InvalidTaskReference {
                    input_source: source.to_string(),
                    reason: format!("no preceding task is named {:?}", name),
                })?;
            Ok(InputSource::Task {
                task_ref: TaskRef::InsertId(insert_id),
                source_kind: *source_kind,
                elements: elements.clone(),
            })
        }
    }
}

/// Validate declared sources and fill in the first available source for every
/// required input that has none. All unsourced inputs are reported together.
pub fn ensure_sources(
    target: SourceTarget<'_>,
    element_set: &mut ElementSet,
    upstream: &[UpstreamTask<'_>],
) -> Result<(), WorkflowError> {
    let available = available_sources(target.task, element_set, upstream);
    let inputs_info = target.task.inputs_info(element_set);

    for inputs_path in inputs_info.keys() {
        let Some(specified) = element_set.input_sources.get(inputs_path).cloned() else {
            continue;
        };
        let offered = available.get(inputs_path).map(Vec::as_slice).unwrap_or(&[]);
        let mut resolved = Vec::with_capacity(specified.len());
        for source in &specified {
            let source = resolve_task_reference(source, target, upstream)?;
            if !source.is_in(offered) {
                return Err(WorkflowError::InvalidInputSource {
                    path: inputs_path.clone(),
                    input_source: source.to_string(),
                    available: offered.iter().map(InputSource::to_string).collect(),
                });
            }
            resolved.push(source);
        }
        element_set.input_sources.insert(inputs_path.clone(), resolved);
    }

    let mut missing = Vec::new();
    for (inputs_path, info) in &inputs_info {
        if !info.is_required || element_set.input_sources.contains_key(inputs_path) {
            continue;
        }
        match available.get(inputs_path).and_then(|sources| sources.first()) {
            Some(source) => {
                element_set
                    .input_sources
                    .insert(inputs_path.clone(), vec![source.clone()]);
            }
            None => missing.push(inputs_path.clone()),
        }
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::MissingInputs { paths: missing })
    }
}
