//! Persistent workflows and the batch-update transaction boundary.
//!
//! All structural mutation goes through [`Workflow::batch_update`]. Inside a
//! batch, metadata is edited in memory, new parameter groups are written with
//! `is_pending_add` set, and events are buffered. Only the outermost batch
//! commits. It first checks the on-disk metadata still matches what was
//! loaded, then promotes the pending groups and appends the events, and
//! finally replaces the metadata. Each step retries transient storage faults.
//! Until the metadata write succeeds the commit can be undone completely: a
//! failure restores the in-memory metadata, removes every group and event the
//! batch wrote, and deletes the container if the batch was creating it.

use crate::core::config::EngineConfig;
use crate::core::error::AppError;
use crate::core::workflow::element::{Element, WorkflowTask};
use crate::core::workflow::element_set::{ElementSet, ElementSetArgs, PersistedValue};
use crate::core::workflow::error::{ValidationFault, WorkflowError};
use crate::core::workflow::event_log::{EventKind, EventLog};
use crate::core::workflow::metadata::{DataIndex, TaskRecord, TaskTemplateRecord, WorkflowMetadata};
use crate::core::workflow::parameters::{HandleLedger, ParameterStore};
use crate::core::workflow::paths;
use crate::core::workflow::resolver::{self, ElementIndices, Multiplicity, UNNESTED};
use crate::core::workflow::retry::with_retry;
use crate::core::workflow::schema::{SchemaRegistry, TaskSchema};
use crate::core::workflow::sources::{
    ensure_sources, InputSource, SourceTarget, TaskRef, UpstreamTask,
};
use crate::core::workflow::store::{DirectoryStore, WorkflowStore};
use crate::core::workflow::task::{self, Task};
use crate::core::workflow::template::WorkflowTemplate;
use indexmap::IndexMap;
use serde_json::json;
use std::iter;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// How new elements of one task flow on to one downstream task.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementPropagation {
    /// Unique name of the downstream task.
    pub task: String,
    /// Nesting orders for the propagated element set; defaults to the base set's.
    pub nesting_order: Option<IndexMap<String, f64>>,
    /// Index of the downstream element set used as the base.
    pub element_set: usize,
}

impl ElementPropagation {
    pub fn new(task: impl Into<String>) -> Self {
        ElementPropagation {
            task: task.into(),
            nesting_order: None,
            element_set: 0,
        }
    }

    pub fn with_nesting_order(mut self, nesting_order: IndexMap<String, f64>) -> Self {
        self.nesting_order = Some(nesting_order);
        self
    }
}

/// Arguments of [`Workflow::add_elements`].
#[derive(Debug, Clone, Default)]
pub struct AddElements {
    pub element_sets: ElementSetArgs,
    /// Element of the same task whose local inputs and resources seed the new set.
    pub base_element: Option<usize>,
    /// `Some` to propagate new elements downstream; tasks not listed use defaults.
    pub propagate_to: Option<Vec<ElementPropagation>>,
}

/// Locally persisted values and chosen sources of one element set, keyed by
/// normalised path.
#[derive(Debug, Default)]
struct PersistedInputs {
    data: IndexMap<String, Vec<usize>>,
    sources: IndexMap<String, Vec<String>>,
    sequence_indices: IndexMap<String, Vec<usize>>,
    new_groups: Vec<usize>,
}

impl PersistedInputs {
    fn add_local(&mut self, persisted: PersistedValue) {
        if persisted.is_new {
            self.new_groups.extend(persisted.groups.iter().copied());
        }
        self.sources.insert(
            persisted.path.clone(),
            vec!["local".to_string(); persisted.groups.len()],
        );
        self.data.insert(persisted.path, persisted.groups);
    }

    fn bind(&mut self, key: &str, groups: Vec<usize>, labels: Vec<String>, append: bool) {
        if append {
            self.data.entry(key.to_string()).or_default().extend(groups);
            self.sources.entry(key.to_string()).or_default().extend(labels);
        } else {
            self.data.insert(key.to_string(), groups);
            self.sources.insert(key.to_string(), labels);
        }
    }
}

/// Per-element data produced from resolved value indices.
#[derive(Debug, Default)]
struct GeneratedElements {
    elements: Vec<DataIndex>,
    input_sources: IndexMap<String, Vec<String>>,
    sequence_indices: IndexMap<String, Vec<usize>>,
}

pub struct Workflow {
    store: Box<dyn WorkflowStore>,
    config: EngineConfig,
    metadata: WorkflowMetadata,
    committed_hash: String,
    event_log: EventLog,
    handles: HandleLedger,
    in_batch: bool,
    /// Unsaved events may already be on disk.
    events_flushed: bool,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("location", &self.store.location())
            .field("name", &self.metadata.template.name)
            .field("tasks", &self.metadata.num_tasks())
            .field("elements", &self.metadata.num_elements())
            .field("in_batch", &self.in_batch)
            .finish()
    }
}

fn parameter_store<'a>(
    store: &'a dyn WorkflowStore,
    handles: &'a HandleLedger,
    config: &EngineConfig,
) -> ParameterStore<'a> {
    ParameterStore::new(store, handles, config.store.array_extract_threshold)
}

fn with_parent(parents: &[usize], event: usize) -> Vec<usize> {
    parents.iter().copied().chain(iter::once(event)).collect()
}

impl Workflow {
    /// Create a workflow directory `<path>/<name>` from a template. `path`
    /// defaults to the configured workflow directory, `name` to the template's.
    pub fn from_template(
        template: &WorkflowTemplate,
        path: Option<&Path>,
        name: Option<&str>,
        overwrite: bool,
        config: EngineConfig,
    ) -> Result<Self, WorkflowError> {
        let name = name.unwrap_or(&template.name).to_string();
        let parent = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.workflow.default_dir.clone());
        let store = DirectoryStore::new(parent.join(&name), config.store.metadata_file.clone());
        Self::create_in_store(Box::new(store), template, &name, overwrite, config)
    }

    /// Create a workflow from a YAML template file.
    pub fn from_yaml_file(
        template_path: &Path,
        registry: &SchemaRegistry,
        path: Option<&Path>,
        name: Option<&str>,
        overwrite: bool,
        config: EngineConfig,
    ) -> Result<Self, AppError> {
        let template = WorkflowTemplate::load_from_file(template_path, registry)?;
        Ok(Self::from_template(&template, path, name, overwrite, config)?)
    }

    /// Create a workflow in an arbitrary store.
    pub fn create_in_store(
        store: Box<dyn WorkflowStore>,
        template: &WorkflowTemplate,
        name: &str,
        overwrite: bool,
        config: EngineConfig,
    ) -> Result<Self, WorkflowError> {
        store.initialise(overwrite)?;
        let metadata = WorkflowMetadata::new(name);
        let mut workflow = Workflow {
            store,
            config,
            committed_hash: metadata.content_hash()?,
            metadata,
            event_log: EventLog::default(),
            handles: HandleLedger::default(),
            in_batch: false,
            events_flushed: false,
        };
        workflow.batch(true, |wk| {
            let root = wk
                .event_log
                .add(EventKind::CreateWorkflow, &[], json!({ "name": name }), vec![]);
            for task in &template.tasks {
                wk.add_task_with_parents(task.clone(), &[root])?;
            }
            Ok(())
        })?;
        info!(
            path = %workflow.location().display(),
            tasks = workflow.num_tasks(),
            elements = workflow.num_elements(),
            "created workflow"
        );
        Ok(workflow)
    }

    pub fn load(path: impl Into<PathBuf>, config: EngineConfig) -> Result<Self, WorkflowError> {
        let store = DirectoryStore::new(path, config.store.metadata_file.clone());
        Self::load_from_store(Box::new(store), config)
    }

    pub fn load_from_store(
        store: Box<dyn WorkflowStore>,
        config: EngineConfig,
    ) -> Result<Self, WorkflowError> {
        let metadata = WorkflowMetadata::from_bytes(&store.read_metadata()?)?;
        let event_log = EventLog::from_saved(store.read_events()?);
        let handles = HandleLedger::scan(store.as_ref())?;
        let workflow = Workflow {
            store,
            config,
            committed_hash: metadata.content_hash()?,
            metadata,
            event_log,
            handles,
            in_batch: false,
            events_flushed: false,
        };
        info!(
            path = %workflow.location().display(),
            tasks = workflow.num_tasks(),
            elements = workflow.num_elements(),
            "loaded workflow"
        );
        Ok(workflow)
    }

    /// Copy the committed state of this workflow to a new directory and load it.
    pub fn copy_to(&self, dest: impl Into<PathBuf>) -> Result<Workflow, WorkflowError> {
        let target = DirectoryStore::new(dest, self.config.store.metadata_file.clone());
        target.initialise(false)?;
        let copied = (|| {
            for handle in self.store.parameter_handles()? {
                let group = self
                    .store
                    .read_parameter_group(handle)?
                    .ok_or(WorkflowError::MissingParameterGroup(handle))?;
                let children = group
                    .value
                    .arrays
                    .iter()
                    .map(|array| {
                        Ok((
                            array.child.clone(),
                            self.store.read_parameter_child(handle, &array.child)?,
                        ))
                    })
                    .collect::<Result<Vec<_>, WorkflowError>>()?;
                target.write_parameter_group(handle, &group, &children)?;
            }
            target.append_events(&self.store.read_events()?)?;
            target.write_metadata(&self.store.read_metadata()?)
        })();
        if let Err(err) = copied {
            if let Err(cleanup) = target.destroy() {
                error!("failed to remove partial workflow copy: {}", cleanup);
            }
            return Err(err);
        }
        Self::load_from_store(Box::new(target), self.config.clone())
    }

    /// Remove the workflow from durable storage.
    pub fn delete(self) -> Result<(), WorkflowError> {
        with_retry(&self.config.retry, "delete workflow", || self.store.destroy())?;
        info!(path = %self.location().display(), "deleted workflow");
        Ok(())
    }

    pub fn location(&self) -> &Path {
        self.store.location()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metadata(&self) -> &WorkflowMetadata {
        &self.metadata
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn parameters(&self) -> ParameterStore<'_> {
        parameter_store(self.store.as_ref(), &self.handles, &self.config)
    }

    pub fn name(&self) -> &str {
        &self.metadata.template.name
    }

    pub fn num_tasks(&self) -> usize {
        self.metadata.num_tasks()
    }

    pub fn num_elements(&self) -> usize {
        self.metadata.num_elements()
    }

    /// Unique task names in task order.
    pub fn task_unique_names(&self) -> Vec<String> {
        self.metadata
            .template
            .tasks
            .iter()
            .enumerate()
            .map(|(idx, record)| {
                let repeat = self
                    .metadata
                    .task_name_repeat_idx
                    .get(idx)
                    .copied()
                    .unwrap_or(0);
                task::unique_name(&record.name, repeat)
            })
            .collect()
    }

    /// Unique task name -> insert ID.
    pub fn task_insert_ids(&self) -> IndexMap<String, usize> {
        self.task_unique_names()
            .into_iter()
            .zip(self.metadata.template.tasks.iter().map(|t| t.insert_id))
            .collect()
    }

    pub fn task_index_by_name(&self, unique_name: &str) -> Result<usize, WorkflowError> {
        self.task_unique_names()
            .iter()
            .position(|name| name == unique_name)
            .ok_or_else(|| WorkflowError::UnknownTask(unique_name.to_string()))
    }

    pub fn task_index_by_insert_id(&self, insert_id: usize) -> Option<usize> {
        self.metadata
            .template
            .tasks
            .iter()
            .position(|t| t.insert_id == insert_id)
    }

    pub fn task(&self, index: usize) -> Result<WorkflowTask<'_>, WorkflowError> {
        if index >= self.num_tasks() {
            return Err(WorkflowError::UnknownTask(index.to_string()));
        }
        Ok(WorkflowTask::new(self, index))
    }

    pub fn tasks(&self) -> Vec<WorkflowTask<'_>> {
        (0..self.num_tasks())
            .map(|index| WorkflowTask::new(self, index))
            .collect()
    }

    pub fn element(&self, global_index: usize) -> Result<Element<'_>, WorkflowError> {
        let (task_index, position) = self
            .metadata
            .locate_element(global_index)
            .ok_or(WorkflowError::UnknownElement(global_index))?;
        Ok(Element::new(self, global_index, task_index, position))
    }

    pub fn elements(&self) -> Vec<Element<'_>> {
        self.metadata
            .tasks
            .iter()
            .enumerate()
            .flat_map(|(task_index, record)| {
                record
                    .element_indices
                    .iter()
                    .enumerate()
                    .map(move |(position, &global)| (task_index, global, position))
            })
            .map(|(task_index, global, position)| Element::new(self, global, task_index, position))
            .collect()
    }

    /// Rebuild the task template at `index` from persisted metadata.
    pub fn task_template(&self, index: usize) -> Result<Task, WorkflowError> {
        let record = self
            .metadata
            .template
            .tasks
            .get(index)
            .ok_or_else(|| WorkflowError::UnknownTask(index.to_string()))?;
        let schemas = record
            .schemas
            .iter()
            .map(|key| self.shared_schema(key).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Task::restore(
            record.name.clone(),
            schemas,
            record.element_sets.clone(),
        ))
    }

    pub fn shared_schema(&self, key: &str) -> Result<&TaskSchema, WorkflowError> {
        self.metadata
            .shared_data
            .task_schemas
            .get(key)
            .ok_or_else(|| ValidationFault::UnknownTaskSchema(key.to_string()).into())
    }

    /// Run `operation` as one transaction. Nested calls join the outer one.
    pub fn batch_update<T, F>(&mut self, operation: F) -> Result<T, WorkflowError>
    where
        F: FnOnce(&mut Self) -> Result<T, WorkflowError>,
    {
        self.batch(false, operation)
    }

    fn batch<T, F>(&mut self, is_creation: bool, operation: F) -> Result<T, WorkflowError>
    where
        F: FnOnce(&mut Self) -> Result<T, WorkflowError>,
    {
        if self.in_batch {
            return operation(self);
        }
        self.in_batch = true;
        let snapshot = self.metadata.clone();
        let outcome = match operation(self) {
            Ok(value) => self.commit().map(|()| value),
            Err(err) => Err(err),
        };
        self.in_batch = false;

        outcome.map_err(|err| {
            error!(
                code = err.code(),
                path = %self.location().display(),
                "batch update failed, rolling back: {}",
                err
            );
            self.rollback(snapshot, is_creation);
            err
        })
    }

    fn commit(&mut self) -> Result<(), WorkflowError> {
        let params = parameter_store(self.store.as_ref(), &self.handles, &self.config);
        let new_groups = params.uncommitted_handles();
        let hash = self.metadata.content_hash()?;
        let modified =
            self.event_log.has_unsaved() || hash != self.committed_hash || !new_groups.is_empty();
        if !modified {
            return Ok(());
        }

        if self.store.exists() {
            let on_disk = WorkflowMetadata::from_bytes(&self.store.read_metadata()?)?;
            if on_disk.content_hash()? != self.committed_hash {
                return Err(WorkflowError::ConcurrentModification);
            }
        }

        let bytes = self.metadata.to_bytes()?;
        let retry = &self.config.retry;
        with_retry(retry, "promote parameter groups", || params.promote_pending())?;
        self.events_flushed = true;
        with_retry(retry, "append workflow events", || {
            self.store.append_events(self.event_log.unsaved())
        })?;
        // The metadata write is the commit point; nothing after it is undone.
        with_retry(retry, "write workflow metadata", || {
            self.store.write_metadata(&bytes)
        })?;

        params.mark_committed();
        let events = self.event_log.unsaved().len();
        self.event_log.mark_saved();
        self.events_flushed = false;
        self.committed_hash = hash;
        info!(
            path = %self.store.location().display(),
            events,
            parameter_groups = new_groups.len(),
            elements = self.metadata.num_elements(),
            "committed batch update"
        );
        Ok(())
    }

    fn rollback(&mut self, snapshot: WorkflowMetadata, is_creation: bool) {
        self.metadata = snapshot;
        let saved = self.event_log.num_saved();
        self.event_log.discard_unsaved();
        let events_flushed = std::mem::take(&mut self.events_flushed);
        let retry = &self.config.retry;
        let store = self.store.as_ref();
        if is_creation {
            if let Err(err) = with_retry(retry, "delete workflow", || store.destroy()) {
                error!("failed to delete partially created workflow: {}", err);
            }
            return;
        }
        let params = parameter_store(store, &self.handles, &self.config);
        if let Err(err) = with_retry(retry, "discard parameter groups", || params.discard_uncommitted()) {
            error!("failed to discard uncommitted parameter groups: {}", err);
        }
        if events_flushed {
            if let Err(err) = with_retry(retry, "remove unsaved events", || store.remove_events(saved)) {
                error!("failed to remove unsaved events: {}", err);
            }
        }
    }

    /// Append a task and expand its element sets. Returns the new task index.
    pub fn add_task(&mut self, task: Task) -> Result<usize, WorkflowError> {
        self.batch(false, |wk| wk.add_task_with_parents(task, &[]))
    }

    fn add_task_with_parents(&mut self, task: Task, parents: &[usize]) -> Result<usize, WorkflowError> {
        let new_index = self.num_tasks();
        let event = self.event_log.add(
            EventKind::AddTask,
            parents,
            json!({ "task_index": new_index }),
            vec![],
        );
        let parents = with_parent(parents, event);
        self.add_empty_task(&task, new_index, &parents)?;
        self.add_elements_with_parents(new_index, task.element_sets().to_vec(), None, &parents)?;
        Ok(new_index)
    }

    fn add_empty_task(
        &mut self,
        task: &Task,
        new_index: usize,
        parents: &[usize],
    ) -> Result<(), WorkflowError> {
        let insert_id = self
            .metadata
            .template
            .tasks
            .iter()
            .map(|t| t.insert_id + 1)
            .max()
            .unwrap_or(0);

        for schema in task.schemas() {
            self.metadata
                .shared_data
                .task_schemas
                .entry(schema.key())
                .or_insert_with(|| schema.clone());
        }
        for env in task.environments() {
            self.metadata
                .shared_data
                .environments
                .entry(env.name.clone())
                .or_insert_with(|| env.clone());
        }

        let params = parameter_store(self.store.as_ref(), &self.handles, &self.config);
        let mut default_groups = IndexMap::new();
        let mut new_groups = Vec::new();
        for input in task.all_schema_inputs() {
            let Some(default) = &input.default_value else {
                continue;
            };
            if default_groups.contains_key(&input.parameter) {
                continue;
            }
            let handle = params.create(default, true, true)?;
            default_groups.insert(input.parameter.clone(), handle);
            new_groups.push(handle);
        }

        let mut names: Vec<String> = self
            .metadata
            .template
            .tasks
            .iter()
            .map(|t| t.name.clone())
            .collect();
        names.push(task.name().to_string());
        let repeat_idx = task::repeat_indices(&names);
        let unique_name = task::unique_name(task.name(), repeat_idx[new_index]);
        self.metadata.task_name_repeat_idx = repeat_idx;

        self.event_log.add(
            EventKind::AddEmptyTask,
            parents,
            json!({
                "task_index": new_index,
                "insert_id": insert_id,
                "unique_name": unique_name,
            }),
            new_groups,
        );
        self.metadata.template.tasks.push(TaskTemplateRecord {
            name: task.name().to_string(),
            insert_id,
            dir_name: format!("task_{}_{}", insert_id, unique_name),
            schemas: task.schema_keys(),
            element_sets: Vec::new(),
            default_groups,
        });
        self.metadata.tasks.push(TaskRecord::default());
        debug!(task = %unique_name, insert_id, "added empty task");
        Ok(())
    }

    /// Add elements to an existing task. Returns the global indices of every
    /// new element, including those propagated downstream.
    pub fn add_elements(
        &mut self,
        task_index: usize,
        request: AddElements,
    ) -> Result<Vec<usize>, WorkflowError> {
        self.batch(false, |wk| wk.add_elements_request(task_index, request))
    }

    fn add_elements_request(
        &mut self,
        task_index: usize,
        request: AddElements,
    ) -> Result<Vec<usize>, WorkflowError> {
        if task_index >= self.num_tasks() {
            return Err(WorkflowError::UnknownTask(task_index.to_string()));
        }
        let AddElements {
            element_sets: mut args,
            base_element,
            propagate_to,
        } = request;

        if let Some(base) = base_element {
            let element = self.element(base)?;
            if element.task_index() != task_index {
                return Err(WorkflowError::ForeignBaseElement {
                    element: base,
                    task: self.task_unique_names()[task_index].clone(),
                });
            }
            if args.element_sets.is_empty() {
                let (inputs, resources) = element.to_element_set_data()?;
                if args.inputs.is_empty() {
                    args.inputs = inputs;
                }
                if args.resources.is_none() {
                    args.resources = Some(resources);
                }
            }
        }

        let element_sets = args.into_element_sets()?;
        self.add_elements_with_parents(task_index, element_sets, propagate_to, &[])
    }

    fn add_elements_with_parents(
        &mut self,
        task_index: usize,
        element_sets: Vec<ElementSet>,
        propagate_to: Option<Vec<ElementPropagation>>,
        parents: &[usize],
    ) -> Result<Vec<usize>, WorkflowError> {
        let event = self.event_log.add(
            EventKind::AddElements,
            parents,
            json!({ "task_index": task_index }),
            vec![],
        );
        let parents = with_parent(parents, event);

        let mut new_indices = Vec::new();
        for element_set in element_sets {
            let element_set = element_set.prepare_persistent_copy();
            new_indices.extend(self.add_element_set(task_index, element_set, &parents)?);
        }

        let Some(propagate_to) = propagate_to else {
            return Ok(new_indices);
        };

        let mut sources = vec![self.metadata.template.tasks[task_index].insert_id];
        let names = self.task_unique_names();
        for downstream in task_index + 1..self.num_tasks() {
            let propagation = propagate_to
                .iter()
                .find(|p| p.task == names[downstream])
                .cloned()
                .unwrap_or_else(|| ElementPropagation::new(names[downstream].clone()));
            let record = &self.metadata.template.tasks[downstream];
            let Some(base) = record.element_sets.get(propagation.element_set) else {
                continue;
            };
            if !depends_on_any(base, &sources) {
                continue;
            }
            let element_set = propagated_element_set(base, &propagation, new_indices.clone());
            let downstream_insert_id = record.insert_id;
            let added =
                self.add_elements_with_parents(downstream, vec![element_set], None, &parents)?;
            debug!(
                task = %names[downstream],
                count = added.len(),
                "propagated elements downstream"
            );
            new_indices.extend(added);
            sources.push(downstream_insert_id);
        }
        Ok(new_indices)
    }

    fn add_element_set(
        &mut self,
        task_index: usize,
        element_set: ElementSet,
        parents: &[usize],
    ) -> Result<Vec<usize>, WorkflowError> {
        let task = self.task_template(task_index)?;
        let mut element_set = task.attach_element_set(element_set)?;

        let names = self.task_unique_names();
        let upstream_tasks = (0..task_index)
            .map(|idx| self.task_template(idx))
            .collect::<Result<Vec<_>, _>>()?;
        let upstream: Vec<UpstreamTask<'_>> = upstream_tasks
            .iter()
            .enumerate()
            .map(|(idx, upstream_task)| UpstreamTask {
                insert_id: self.metadata.template.tasks[idx].insert_id,
                unique_name: &names[idx],
                task: upstream_task,
                element_indices: &self.metadata.tasks[idx].element_indices,
            })
            .collect();
        let target = SourceTarget {
            task: &task,
            insert_id: self.metadata.template.tasks[task_index].insert_id,
            unique_name: &names[task_index],
        };
        ensure_sources(target, &mut element_set, &upstream)?;

        let persisted = self.make_new_elements_persistent(task_index, &task, &mut element_set)?;
        let multiplicities: Vec<Multiplicity> = persisted
            .data
            .iter()
            .map(|(path, groups)| {
                Multiplicity::new(
                    path.clone(),
                    groups.len(),
                    element_set
                        .nesting_order
                        .get(path)
                        .copied()
                        .unwrap_or(UNNESTED),
                )
            })
            .collect();
        let value_indices = resolver::resolve(&multiplicities)?;

        let params = parameter_store(self.store.as_ref(), &self.handles, &self.config);
        let mut outputs: IndexMap<String, Vec<usize>> = IndexMap::new();
        for typ in task.all_schema_output_types() {
            let handles = (0..value_indices.len())
                .map(|_| params.reserve(true))
                .collect::<Result<Vec<_>, _>>()?;
            outputs.insert(format!("{}.{}", paths::OUTPUTS, typ), handles);
        }

        let generated = generate_new_elements(&persisted, &outputs, &value_indices);
        let first = self.metadata.num_elements();
        let element_indices: Vec<usize> = (first..first + generated.elements.len()).collect();

        let mut new_groups = persisted.new_groups.clone();
        new_groups.extend(outputs.values().flatten().copied());
        self.event_log.add(
            EventKind::AddElementSet,
            parents,
            json!({ "task_index": task_index, "element_indices": element_indices }),
            new_groups,
        );

        self.metadata.template.tasks[task_index]
            .element_sets
            .push(element_set);
        let task_after = self.task_template(task_index)?;
        let set_index = task_after.element_sets().len() - 1;
        let count = generated.elements.len();

        let record = &mut self.metadata.tasks[task_index];
        let existing = record.num_elements();
        for path in task_after.all_sourced_normalised_paths() {
            record
                .element_input_sources
                .entry(path)
                .or_insert_with(|| vec![None; existing]);
        }
        for path in task_after.all_used_sequences_normalised_paths() {
            record
                .element_sequence_indices
                .entry(path)
                .or_insert_with(|| vec![None; existing]);
        }
        for (path, column) in record.element_input_sources.iter_mut() {
            match generated.input_sources.get(path) {
                Some(values) => column.extend(values.iter().cloned().map(Some)),
                None => column.extend(iter::repeat(None).take(count)),
            }
        }
        for (path, column) in record.element_sequence_indices.iter_mut() {
            match generated.sequence_indices.get(path) {
                Some(values) => column.extend(values.iter().copied().map(Some)),
                None => column.extend(iter::repeat(None).take(count)),
            }
        }
        record
            .element_set_indices
            .extend(iter::repeat(set_index).take(count));
        record.element_indices.extend(element_indices.iter().copied());
        self.metadata.elements.extend(generated.elements);

        debug!(
            task = %names[task_index],
            element_set = set_index,
            count,
            "added element set"
        );
        Ok(element_indices)
    }

    /// Persist local values of `element_set` and bind task and default
    /// sources of its required inputs.
    fn make_new_elements_persistent(
        &self,
        task_index: usize,
        task: &Task,
        element_set: &mut ElementSet,
    ) -> Result<PersistedInputs, WorkflowError> {
        let params = parameter_store(self.store.as_ref(), &self.handles, &self.config);
        let mut persisted = PersistedInputs::default();

        for resource in element_set.resources.iter_mut() {
            persisted.add_local(resource.make_persistent(&params, true)?);
        }
        for input in element_set.inputs.iter_mut() {
            persisted.add_local(input.make_persistent(&params, true)?);
        }
        for input_file in element_set.input_files.iter_mut() {
            persisted.add_local(input_file.make_persistent(&params, true)?);
        }
        for sequence in element_set.sequences.iter_mut() {
            let value = sequence.make_persistent(&params, true)?;
            persisted
                .sequence_indices
                .insert(value.path.clone(), (0..value.groups.len()).collect());
            persisted.add_local(value);
        }

        let required: Vec<String> = task
            .required_schema_inputs(element_set)
            .into_iter()
            .map(|input| input.parameter.clone())
            .collect();

        for typ in required {
            let key = format!("{}.{}", paths::INPUTS, typ);
            let sources = element_set.input_sources.get(&typ).cloned().unwrap_or_default();
            let has_local = sources.contains(&InputSource::Local);
            let mut bound = false;

            for source in &sources {
                let (groups, labels) = match source {
                    InputSource::Local => continue,
                    InputSource::Default => {
                        let group = self.metadata.template.tasks[task_index]
                            .default_groups
                            .get(&typ)
                            .copied()
                            .ok_or_else(|| WorkflowError::MissingInputs {
                                paths: vec![typ.clone()],
                            })?;
                        (vec![group], vec!["default".to_string()])
                    }
                    InputSource::Task {
                        task_ref,
                        source_kind,
                        elements,
                    } => {
                        let TaskRef::InsertId(insert_id) = task_ref else {
                            return Err(WorkflowError::InvalidTaskReference {
                                input_source: source.to_string(),
                                reason: "task reference was not resolved".to_string(),
                            });
                        };
                        let source_index = self
                            .task_index_by_insert_id(*insert_id)
                            .ok_or_else(|| WorkflowError::UnknownTask(insert_id.to_string()))?;
                        let source_elements: Vec<usize> = self.metadata.tasks[source_index]
                            .element_indices
                            .iter()
                            .copied()
                            .filter(|idx| elements.as_ref().map_or(true, |sel| sel.contains(idx)))
                            .collect();
                        if source_elements.is_empty() {
                            continue;
                        }
                        let source_key = format!("{}.{}", source_kind.data_root(), typ);
                        let groups = source_elements
                            .iter()
                            .map(|&idx| {
                                self.metadata.elements[idx]
                                    .get(&source_key)
                                    .copied()
                                    .ok_or_else(|| WorkflowError::PathNotFound {
                                        element: idx,
                                        path: source_key.clone(),
                                    })
                            })
                            .collect::<Result<Vec<_>, _>>()?;
                        let labels = source_elements
                            .iter()
                            .map(|idx| format!("element.{}.{}", idx, source_kind.label()))
                            .collect();
                        (groups, labels)
                    }
                };

                let append = has_local || bound;
                persisted.bind(&key, groups, labels, append);
                if !append && persisted.sequence_indices.shift_remove(&key).is_some() {
                    if let Some(sequence) = element_set.sequence_by_path_mut(&key) {
                        sequence.is_unused = true;
                    }
                }
                bound = true;
            }
        }
        Ok(persisted)
    }
}

/// Compose per-element data indices. Deeper paths come later so they
/// override shorter prefixes when values are assembled.
fn generate_new_elements(
    persisted: &PersistedInputs,
    outputs: &IndexMap<String, Vec<usize>>,
    value_indices: &[ElementIndices],
) -> GeneratedElements {
    let mut generated = GeneratedElements::default();
    for (position, assignment) in value_indices.iter().enumerate() {
        let mut entries: Vec<(String, usize)> = assignment
            .iter()
            .map(|(path, &value_index)| (path.clone(), persisted.data[path][value_index]))
            .collect();
        entries.extend(
            outputs
                .iter()
                .map(|(path, handles)| (path.clone(), handles[position])),
        );
        entries.sort_by_key(|(path, _)| paths::depth(path));
        generated.elements.push(entries.into_iter().collect());

        for (path, &value_index) in assignment {
            if let Some(sources) = persisted.sources.get(path) {
                generated
                    .input_sources
                    .entry(path.clone())
                    .or_default()
                    .push(sources[value_index].clone());
            }
            if let Some(sequence) = persisted.sequence_indices.get(path) {
                generated
                    .sequence_indices
                    .entry(path.clone())
                    .or_default()
                    .push(sequence[value_index]);
            }
        }
    }
    generated
}

fn depends_on_any(element_set: &ElementSet, insert_ids: &[usize]) -> bool {
    element_set.input_sources.values().flatten().any(|source| {
        matches!(
            source,
            InputSource::Task { task_ref: TaskRef::InsertId(id), .. } if insert_ids.contains(id)
        )
    })
}

/// New element set for a downstream task, built from its base set and
/// restricted to the newly added upstream elements.
fn propagated_element_set(
    base: &ElementSet,
    propagation: &ElementPropagation,
    sourceable_elements: Vec<usize>,
) -> ElementSet {
    let nesting_order = propagation
        .nesting_order
        .clone()
        .or_else(|| base.original_nesting_order.clone())
        .unwrap_or_else(|| base.nesting_order.clone());
    ElementSet {
        inputs: base.inputs.clone(),
        input_files: base.input_files.clone(),
        sequences: base
            .sequences
            .iter()
            .filter(|s| !s.is_unused)
            .cloned()
            .collect(),
        resources: base.resources.clone(),
        repeats: base.repeats,
        nesting_order,
        sourceable_elements: Some(sourceable_elements),
        ..ElementSet::default()
    }
}
