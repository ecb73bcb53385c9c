pub mod args;
pub mod commands;

pub use args::{
    ActionsArgs, CopyArgs, DeleteArgs, GetArgs, MakeArgs, OutputFormat, ParamArgs, ShowArgs,
};
use crate::core::ConfigLoader;
use clap::{Parser, Subcommand};
use std::env;
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
WORKFLOW COMMANDS:\n{subcommands}\n";

#[derive(Parser, Debug)]
#[command(name = "paramflow")]
#[command(version = crate::VERSION)]
#[command(about = "Persistent parametrised workflows: expand tasks into elements and inspect them")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: make a workflow from a template, show its tasks, then get element values or actions."
)]
pub struct Args {
    /// Workspace holding paramflow.toml and .paramflow/ (default: current directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace
            .clone()
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        about = "Create a workflow from a template",
        long_about = "Make loads task schemas, builds every task in the template, resolves input sources and nesting, and persists the resulting elements in one transaction.",
        after_help = "Example:\n    paramflow make sweep.yaml --schemas schemas.yaml --path ./runs"
    )]
    Make(MakeArgs),
    #[command(
        about = "Summarise tasks and elements of a workflow",
        long_about = "Show lists each task with its unique name, element sets and elements, including the data index and input sources of every element.",
        after_help = "Example:\n    paramflow show ./runs/sweep --format json"
    )]
    Show(ShowArgs),
    #[command(
        about = "Print the value at a parameter path of one element",
        long_about = "Get assembles the value from the deepest stored prefix of the path and overlays any stored sub-values.",
        after_help = "Example:\n    paramflow get ./runs/sweep --element 3 inputs.p1"
    )]
    Get(GetArgs),
    #[command(
        about = "Resolve the actions an element would run",
        long_about = "Actions evaluates action rules against the element's data and binds each input-file generator, main command and output-file parser to a compatible environment.",
        after_help = "Example:\n    paramflow actions ./runs/sweep --element 0"
    )]
    Actions(ActionsArgs),
    #[command(
        about = "Print a parameter group by handle",
        after_help = "Example:\n    paramflow param ./runs/sweep 4"
    )]
    Param(ParamArgs),
    #[command(
        about = "Copy a workflow to a new directory",
        after_help = "Example:\n    paramflow copy ./runs/sweep ./runs/sweep_backup"
    )]
    Copy(CopyArgs),
    #[command(
        about = "Delete a workflow directory",
        after_help = "Example:\n    paramflow delete ./runs/sweep"
    )]
    Delete(DeleteArgs),
}

impl Command {
    /// Whether stdout carries machine-readable output only.
    pub fn emits_json(&self) -> bool {
        match self {
            Command::Show(args) => args.format == OutputFormat::Json,
            Command::Actions(args) => args.format == OutputFormat::Json,
            Command::Get(_) | Command::Param(_) => true,
            Command::Make(_) | Command::Copy(_) | Command::Delete(_) => false,
        }
    }
}

pub fn run(args: Args) -> crate::Result<()> {
    let config = ConfigLoader::load_from_workspace(&args.workspace_root())?;
    match args.command {
        Command::Make(make_args) => commands::make(make_args, config),
        Command::Show(show_args) => commands::show(show_args, config),
        Command::Get(get_args) => commands::get(get_args, config),
        Command::Actions(actions_args) => commands::actions(actions_args, config),
        Command::Param(param_args) => commands::param(param_args, config),
        Command::Copy(copy_args) => commands::copy(copy_args, config),
        Command::Delete(delete_args) => commands::delete(delete_args, config),
    }
}
