use crate::{
    cli::args::{
        ActionsArgs, CopyArgs, DeleteArgs, GetArgs, MakeArgs, OutputFormat, ParamArgs, ShowArgs,
    },
    core::{
        config::EngineConfig,
        workflow::{
            resolve_element_actions, DataIndex, SchemaRegistry, Workflow, WorkflowTemplate,
        },
    },
    Result,
};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::info;

#[derive(Serialize)]
struct ElementSummary {
    index: usize,
    element_set: usize,
    data_index: DataIndex,
    input_sources: IndexMap<String, String>,
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    sequence_indices: IndexMap<String, usize>,
}

#[derive(Serialize)]
struct TaskSummary {
    index: usize,
    insert_id: usize,
    unique_name: String,
    dir_name: String,
    num_element_sets: usize,
    elements: Vec<ElementSummary>,
}

#[derive(Serialize)]
struct WorkflowSummary {
    name: String,
    path: String,
    num_elements: usize,
    tasks: Vec<TaskSummary>,
}

fn summarise(workflow: &Workflow) -> WorkflowSummary {
    let tasks = workflow
        .tasks()
        .into_iter()
        .map(|task| TaskSummary {
            index: task.index(),
            insert_id: task.insert_id(),
            unique_name: task.unique_name(),
            dir_name: task.dir_name().to_string(),
            num_element_sets: task.element_sets().len(),
            elements: task
                .elements()
                .into_iter()
                .map(|element| ElementSummary {
                    index: element.global_index(),
                    element_set: element.element_set_index(),
                    data_index: element.data_index().clone(),
                    input_sources: element.input_sources(),
                    sequence_indices: element.sequence_indices(),
                })
                .collect(),
        })
        .collect();
    WorkflowSummary {
        name: workflow.name().to_string(),
        path: workflow.location().display().to_string(),
        num_elements: workflow.num_elements(),
        tasks,
    }
}

pub fn make(args: MakeArgs, config: EngineConfig) -> Result<()> {
    let registry = SchemaRegistry::load_from_file(&args.schemas)?;
    let template = WorkflowTemplate::load_from_file(&args.template, &registry)?;
    let workflow = Workflow::from_template(
        &template,
        args.path.as_deref(),
        args.name.as_deref(),
        args.overwrite,
        config,
    )?;
    println!(
        "Created workflow {} at {}",
        workflow.name(),
        workflow.location().display()
    );
    println!(
        "  {} task(s), {} element(s)",
        workflow.num_tasks(),
        workflow.num_elements()
    );
    Ok(())
}

pub fn show(args: ShowArgs, config: EngineConfig) -> Result<()> {
    let workflow = Workflow::load(&args.workflow, config)?;
    let summary = summarise(&workflow);
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => {
            println!("Workflow {} ({})", summary.name, summary.path);
            println!(
                "  {} task(s), {} element(s)",
                summary.tasks.len(),
                summary.num_elements
            );
            for task in &summary.tasks {
                println!(
                    "\n[{}] {} ({} element set(s), {} element(s))",
                    task.index,
                    task.unique_name,
                    task.num_element_sets,
                    task.elements.len()
                );
                for element in &task.elements {
                    println!("  element {} (set {})", element.index, element.element_set);
                    for (path, handle) in &element.data_index {
                        match element.input_sources.get(path) {
                            Some(source) => println!("    {} -> #{} [{}]", path, handle, source),
                            None => println!("    {} -> #{}", path, handle),
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

pub fn get(args: GetArgs, config: EngineConfig) -> Result<()> {
    let workflow = Workflow::load(&args.workflow, config)?;
    let value = workflow
        .element(args.element)?
        .get(&args.path, args.strict)?
        .unwrap_or(serde_json::Value::Null);
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub fn actions(args: ActionsArgs, config: EngineConfig) -> Result<()> {
    let workflow = Workflow::load(&args.workflow, config)?;
    let element = workflow.element(args.element)?;
    let resolved = resolve_element_actions(&element)?;
    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&resolved)?),
        OutputFormat::Text => {
            if resolved.is_empty() {
                println!("Element {} has no actions to run", args.element);
            }
            for (idx, action) in resolved.iter().enumerate() {
                println!(
                    "[{}] {:?} in environment {} (scope {})",
                    idx, action.kind, action.environment, action.scope
                );
                for command in &action.commands {
                    println!("    {}", command);
                }
            }
        }
    }
    Ok(())
}

pub fn param(args: ParamArgs, config: EngineConfig) -> Result<()> {
    let workflow = Workflow::load(&args.workflow, config)?;
    let value = workflow.parameters().read(args.handle)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub fn copy(args: CopyArgs, config: EngineConfig) -> Result<()> {
    let workflow = Workflow::load(&args.workflow, config)?;
    let copied = workflow.copy_to(&args.dest)?;
    info!(
        from = %workflow.location().display(),
        to = %copied.location().display(),
        "copied workflow"
    );
    println!("Copied workflow to {}", copied.location().display());
    Ok(())
}

pub fn delete(args: DeleteArgs, config: EngineConfig) -> Result<()> {
    let workflow = Workflow::load(&args.workflow, config)?;
    let location = workflow.location().to_path_buf();
    workflow.delete()?;
    println!("Deleted workflow {}", location.display());
    Ok(())
}
