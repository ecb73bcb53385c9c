//! Root metadata object of a persisted workflow.

use crate::core::workflow::element_set::ElementSet;
use crate::core::workflow::error::WorkflowError;
use crate::core::workflow::schema::{Environment, TaskSchema};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const FORMAT_VERSION: u32 = 1;

/// Normalised path -> parameter-group handle for one element.
pub type DataIndex = IndexMap<String, usize>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedData {
    #[serde(default)]
    pub task_schemas: IndexMap<String, TaskSchema>,
    #[serde(default)]
    pub environments: IndexMap<String, Environment>,
}

/// Persisted template of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplateRecord {
    pub name: String,
    pub insert_id: usize,
    pub dir_name: String,
    pub schemas: Vec<String>,
    #[serde(default)]
    pub element_sets: Vec<ElementSet>,
    /// Schema input type -> group holding its default value.
    #[serde(default)]
    pub default_groups: IndexMap<String, usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TemplateRecord {
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<TaskTemplateRecord>,
}

/// Per-task element bookkeeping. The keyed maps run parallel to `element_indices`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(default)]
    pub element_indices: Vec<usize>,
    #[serde(default)]
    pub element_input_sources: IndexMap<String, Vec<Option<String>>>,
    #[serde(default)]
    pub element_set_indices: Vec<usize>,
    #[serde(default)]
    pub element_sequence_indices: IndexMap<String, Vec<Option<usize>>>,
}

impl TaskRecord {
    pub fn num_elements(&self) -> usize {
        self.element_indices.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub format_version: u32,
    #[serde(default)]
    pub shared_data: SharedData,
    pub template: TemplateRecord,
    #[serde(default)]
    pub elements: Vec<DataIndex>,
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
    #[serde(default)]
    pub task_name_repeat_idx: Vec<usize>,
}

impl WorkflowMetadata {
    pub fn new(name: impl Into<String>) -> Self {
        WorkflowMetadata {
            format_version: FORMAT_VERSION,
            shared_data: SharedData::default(),
            template: TemplateRecord {
                name: name.into(),
                tasks: Vec::new(),
            },
            elements: Vec::new(),
            tasks: Vec::new(),
            task_name_repeat_idx: Vec::new(),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WorkflowError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WorkflowError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Hash of the serialised form; equal metadata always hashes equal.
    pub fn content_hash(&self) -> Result<String, WorkflowError> {
        Ok(compute_sha256_hex(&self.to_bytes()?))
    }

    pub fn num_tasks(&self) -> usize {
        self.template.tasks.len()
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    /// Owning task and position within it of `element`, if any.
    pub fn locate_element(&self, element: usize) -> Option<(usize, usize)> {
        self.tasks.iter().enumerate().find_map(|(task_index, task)| {
            task.element_indices
                .iter()
                .position(|&idx| idx == element)
                .map(|position| (task_index, position))
        })
    }

    /// [`Self::locate_element`] for every element at once, by global index.
    pub fn element_locations(&self) -> Vec<Option<(usize, usize)>> {
        let mut locations = vec![None; self.elements.len()];
        for (task_index, task) in self.tasks.iter().enumerate() {
            for (position, &element) in task.element_indices.iter().enumerate() {
                if let Some(slot) = locations.get_mut(element) {
                    *slot = Some((task_index, position));
                }
            }
        }
        locations
    }
}

/// Compute the SHA-256 hash encoded as lowercase hex.
pub fn compute_sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
