//! Read-only views over tasks and elements of a loaded workflow, and the
//! element dependency graph derived from recorded input sources.

use crate::core::workflow::element_set::{ElementSet, InputValue, ResourceSpec};
use crate::core::workflow::error::WorkflowError;
use crate::core::workflow::metadata::{DataIndex, TaskRecord, TaskTemplateRecord};
use crate::core::workflow::paths;
use crate::core::workflow::task::Task;
use crate::core::workflow::workflow::Workflow;
use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, IntoNeighbors, Reversed, Visitable};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Directed graph over global element indices; an edge runs from the
/// element providing a value to the element consuming it.
pub struct ElementGraph {
    graph: DiGraph<usize, ()>,
}

impl ElementGraph {
    pub fn build(workflow: &Workflow) -> Self {
        let mut graph = DiGraph::new();
        for idx in 0..workflow.num_elements() {
            graph.add_node(idx);
        }
        for element in workflow.elements() {
            let consumer = NodeIndex::new(element.global_index());
            for provider in element.direct_dependencies() {
                graph.update_edge(NodeIndex::new(provider), consumer, ());
            }
        }
        ElementGraph { graph }
    }

    /// Every element the given elements depend on, directly or transitively.
    pub fn dependencies(&self, elements: &[usize]) -> Vec<usize> {
        reachable(Reversed(&self.graph), elements)
    }

    /// Every element depending on the given elements, directly or transitively.
    pub fn dependents(&self, elements: &[usize]) -> Vec<usize> {
        reachable(&self.graph, elements)
    }
}

fn reachable<G>(graph: G, starts: &[usize]) -> Vec<usize>
where
    G: IntoNeighbors<NodeId = NodeIndex> + Visitable<NodeId = NodeIndex>,
{
    let mut found = BTreeSet::new();
    for &start in starts {
        let mut bfs = Bfs::new(graph, NodeIndex::new(start));
        while let Some(node) = bfs.next(graph) {
            found.insert(node.index());
        }
    }
    found.retain(|idx| !starts.contains(idx));
    found.into_iter().collect()
}

/// Tasks owning any of `elements`, ascending, without `exclude`.
fn owning_tasks(workflow: &Workflow, elements: &[usize], exclude: Option<usize>) -> Vec<usize> {
    let locations = workflow.metadata().element_locations();
    let tasks: BTreeSet<usize> = elements
        .iter()
        .filter_map(|&idx| locations.get(idx).copied().flatten())
        .map(|(task, _)| task)
        .filter(|&task| Some(task) != exclude)
        .collect();
    tasks.into_iter().collect()
}

/// A task as placed in a workflow.
#[derive(Clone, Copy)]
pub struct WorkflowTask<'a> {
    workflow: &'a Workflow,
    index: usize,
}

impl<'a> WorkflowTask<'a> {
    pub(crate) fn new(workflow: &'a Workflow, index: usize) -> Self {
        WorkflowTask { workflow, index }
    }

    fn template_record(&self) -> &'a TaskTemplateRecord {
        &self.workflow.metadata().template.tasks[self.index]
    }

    fn record(&self) -> &'a TaskRecord {
        &self.workflow.metadata().tasks[self.index]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn insert_id(&self) -> usize {
        self.template_record().insert_id
    }

    pub fn name(&self) -> &'a str {
        &self.template_record().name
    }

    pub fn unique_name(&self) -> String {
        self.workflow.task_unique_names()[self.index].clone()
    }

    pub fn dir_name(&self) -> &'a str {
        &self.template_record().dir_name
    }

    pub fn template(&self) -> Result<Task, WorkflowError> {
        self.workflow.task_template(self.index)
    }

    pub fn element_sets(&self) -> &'a [ElementSet] {
        &self.template_record().element_sets
    }

    pub fn element_indices(&self) -> &'a [usize] {
        &self.record().element_indices
    }

    pub fn num_elements(&self) -> usize {
        self.record().num_elements()
    }

    pub fn elements(&self) -> Vec<Element<'a>> {
        self.element_indices()
            .iter()
            .enumerate()
            .map(|(position, &idx)| Element::new(self.workflow, idx, self.index, position))
            .collect()
    }

    /// Per-path source strings, parallel to [`Self::element_indices`].
    pub fn element_input_sources(&self) -> &'a IndexMap<String, Vec<Option<String>>> {
        &self.record().element_input_sources
    }

    pub fn element_sequence_indices(&self) -> &'a IndexMap<String, Vec<Option<usize>>> {
        &self.record().element_sequence_indices
    }

    pub fn element_set_indices(&self) -> &'a [usize] {
        &self.record().element_set_indices
    }

    /// Global indices of the elements generated by one element set.
    pub fn elements_of_element_set(&self, set_index: usize) -> Vec<usize> {
        self.element_indices()
            .iter()
            .zip(self.element_set_indices())
            .filter(|(_, &set)| set == set_index)
            .map(|(&idx, _)| idx)
            .collect()
    }

    pub fn element_dependencies(&self) -> Vec<usize> {
        ElementGraph::build(self.workflow).dependencies(self.element_indices())
    }

    pub fn dependent_elements(&self) -> Vec<usize> {
        ElementGraph::build(self.workflow).dependents(self.element_indices())
    }

    /// Indices of tasks this task's elements depend on, transitively.
    pub fn task_dependencies(&self) -> Vec<usize> {
        owning_tasks(self.workflow, &self.element_dependencies(), Some(self.index))
    }

    /// Indices of tasks with elements depending on this task, transitively.
    pub fn dependent_tasks(&self) -> Vec<usize> {
        owning_tasks(self.workflow, &self.dependent_elements(), Some(self.index))
    }

    pub fn element_set_element_dependencies(&self, set_index: usize) -> Vec<usize> {
        ElementGraph::build(self.workflow).dependencies(&self.elements_of_element_set(set_index))
    }

    pub fn element_set_dependent_elements(&self, set_index: usize) -> Vec<usize> {
        ElementGraph::build(self.workflow).dependents(&self.elements_of_element_set(set_index))
    }

    pub fn element_set_task_dependencies(&self, set_index: usize) -> Vec<usize> {
        owning_tasks(
            self.workflow,
            &self.element_set_element_dependencies(set_index),
            Some(self.index),
        )
    }
}

/// One element: a concrete point in a task's parameter space.
#[derive(Clone, Copy)]
pub struct Element<'a> {
    workflow: &'a Workflow,
    global_index: usize,
    task_index: usize,
    position: usize,
}

impl<'a> Element<'a> {
    pub(crate) fn new(
        workflow: &'a Workflow,
        global_index: usize,
        task_index: usize,
        position: usize,
    ) -> Self {
        Element {
            workflow,
            global_index,
            task_index,
            position,
        }
    }

    pub fn global_index(&self) -> usize {
        self.global_index
    }

    pub fn task_index(&self) -> usize {
        self.task_index
    }

    /// Position of this element within its task.
    pub fn index(&self) -> usize {
        self.position
    }

    pub fn task(&self) -> WorkflowTask<'a> {
        WorkflowTask::new(self.workflow, self.task_index)
    }

    pub fn data_index(&self) -> &'a DataIndex {
        &self.workflow.metadata().elements[self.global_index]
    }

    fn record(&self) -> &'a TaskRecord {
        &self.workflow.metadata().tasks[self.task_index]
    }

    pub fn element_set_index(&self) -> usize {
        self.record().element_set_indices[self.position]
    }

    /// Source of each input path, as `local`, `default` or `element.<i>.<KIND>`.
    pub fn input_sources(&self) -> IndexMap<String, String> {
        self.record()
            .element_input_sources
            .iter()
            .filter_map(|(path, column)| {
                column
                    .get(self.position)
                    .cloned()
                    .flatten()
                    .map(|source| (path.clone(), source))
            })
            .collect()
    }

    pub fn sequence_indices(&self) -> IndexMap<String, usize> {
        self.record()
            .element_sequence_indices
            .iter()
            .filter_map(|(path, column)| {
                column
                    .get(self.position)
                    .copied()
                    .flatten()
                    .map(|idx| (path.clone(), idx))
            })
            .collect()
    }

    /// Assemble the value at `path`.
    ///
    /// The deepest stored prefix of `path` provides the base value; stored
    /// paths extending `path` are overlaid on it. With `strict`, a path with
    /// no stored data is a [`WorkflowError::PathNotFound`], otherwise `None`.
    pub fn get(&self, path: &str, strict: bool) -> Result<Option<Value>, WorkflowError> {
        let path = paths::normalise_input_path(path);
        let segments = paths::split(&path);
        let params = self.workflow.parameters();

        let mut value: Option<Value> = None;
        let mut overlays = Vec::new();
        for (key, &handle) in self.data_index() {
            if paths::is_prefix_of(key, &path) {
                let stored = params.read(handle)?;
                if let Some(found) = paths::get_in(&stored, &segments[paths::depth(key)..]) {
                    value = Some(found.clone());
                }
            } else if paths::is_prefix_of(&path, key) {
                overlays.push((key, handle));
            }
        }
        for (key, handle) in overlays {
            let key_segments = paths::split(key);
            let stored = params.read(handle)?;
            let target = value.get_or_insert_with(|| Value::Object(Map::new()));
            paths::set_in(target, &key_segments[segments.len()..], stored);
        }

        match value {
            Some(value) => Ok(Some(value)),
            None if strict => Err(WorkflowError::PathNotFound {
                element: self.global_index,
                path,
            }),
            None => Ok(None),
        }
    }

    fn values_of(&self, root: &str, types: Vec<String>) -> Result<IndexMap<String, Value>, WorkflowError> {
        let mut values = IndexMap::new();
        for typ in types {
            if let Some(value) = self.get(&format!("{}.{}", root, typ), false)? {
                values.insert(typ, value);
            }
        }
        Ok(values)
    }

    /// Input values keyed by schema input type.
    pub fn inputs(&self) -> Result<IndexMap<String, Value>, WorkflowError> {
        let task = self.workflow.task_template(self.task_index)?;
        self.values_of(paths::INPUTS, task.all_schema_input_types())
    }

    /// Output values keyed by schema output type; unset outputs read as null.
    pub fn outputs(&self) -> Result<IndexMap<String, Value>, WorkflowError> {
        let task = self.workflow.task_template(self.task_index)?;
        self.values_of(paths::OUTPUTS, task.all_schema_output_types())
    }

    pub fn resources(&self) -> Result<IndexMap<String, Value>, WorkflowError> {
        let scopes = self
            .data_index()
            .keys()
            .filter_map(|key| key.strip_prefix("resources."))
            .map(str::to_string)
            .collect();
        self.values_of(paths::RESOURCES, scopes)
    }

    /// Elements whose data this element consumes directly.
    pub fn direct_dependencies(&self) -> Vec<usize> {
        let mut deps: Vec<usize> = self
            .input_sources()
            .values()
            .filter_map(|source| {
                let rest = source.strip_prefix("element.")?;
                rest.split('.').next()?.parse().ok()
            })
            .collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }

    pub fn element_dependencies(&self) -> Vec<usize> {
        ElementGraph::build(self.workflow).dependencies(&[self.global_index])
    }

    pub fn dependent_elements(&self) -> Vec<usize> {
        ElementGraph::build(self.workflow).dependents(&[self.global_index])
    }

    pub fn task_dependencies(&self) -> Vec<usize> {
        owning_tasks(self.workflow, &self.element_dependencies(), None)
    }

    pub fn dependent_tasks(&self) -> Vec<usize> {
        owning_tasks(self.workflow, &self.dependent_elements(), None)
    }

    /// Locally sourced inputs and resources of this element, reusing the
    /// stored parameter groups, for seeding a new element set.
    pub fn to_element_set_data(&self) -> Result<(Vec<InputValue>, Vec<ResourceSpec>), WorkflowError> {
        let params = self.workflow.parameters();
        let sources = self.input_sources();
        let mut inputs = Vec::new();
        let mut resources = Vec::new();

        for (path, &handle) in self.data_index() {
            if let Some(relative) = path.strip_prefix("inputs.") {
                if sources.get(path).map(String::as_str) != Some("local") {
                    continue;
                }
                let value = params.read(handle)?;
                let mut input = match relative.split_once('.') {
                    Some((parameter, sub_path)) => InputValue::sub_value(parameter, sub_path, value),
                    None => InputValue::new(relative, value),
                };
                input.value_group = Some(handle);
                inputs.push(input);
            } else if let Some(scope) = path.strip_prefix("resources.") {
                let settings = match params.read(handle)? {
                    Value::Object(map) => map.into_iter().collect(),
                    _ => IndexMap::new(),
                };
                let mut resource = ResourceSpec::new(scope, settings);
                resource.value_group = Some(handle);
                resources.push(resource);
            }
        }
        Ok((inputs, resources))
    }
}

impl std::fmt::Debug for Element<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Element")
            .field("global_index", &self.global_index)
            .field("task_index", &self.task_index)
            .field("data_index", self.data_index())
            .finish()
    }
}

impl std::fmt::Debug for WorkflowTask<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowTask")
            .field("index", &self.index)
            .field("name", &self.name())
            .field("element_indices", &self.element_indices())
            .finish()
    }
}
