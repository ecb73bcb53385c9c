use clap::Args;
use std::path::PathBuf;

#[derive(Clone, Copy, clap::ValueEnum, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// JSON payload suitable for downstream tooling
    Json,
}

#[derive(Args, Debug)]
pub struct MakeArgs {
    /// Workflow template (YAML) listing tasks and their element sets
    #[arg(value_name = "TEMPLATE")]
    pub template: PathBuf,

    /// Task schema and environment definitions (YAML)
    #[arg(long, value_name = "FILE")]
    pub schemas: PathBuf,

    /// Directory to create the workflow in (default: [workflow].default_dir)
    #[arg(long, value_name = "DIR")]
    pub path: Option<PathBuf>,

    /// Workflow name (default: the template's name)
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Replace an existing workflow at the target location
    #[arg(long)]
    pub overwrite: bool,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Path of a persisted workflow
    #[arg(value_name = "WORKFLOW")]
    pub workflow: PathBuf,

    /// Emit either terminal-friendly text or machine-readable JSON
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Path of a persisted workflow
    #[arg(value_name = "WORKFLOW")]
    pub workflow: PathBuf,

    /// Global element index
    #[arg(long, value_name = "INDEX")]
    pub element: usize,

    /// Parameter path such as inputs.p1, p1.a or outputs.p2
    #[arg(value_name = "PATH")]
    pub path: String,

    /// Fail instead of printing null when the path holds no data
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct ActionsArgs {
    /// Path of a persisted workflow
    #[arg(value_name = "WORKFLOW")]
    pub workflow: PathBuf,

    /// Global element index
    #[arg(long, value_name = "INDEX")]
    pub element: usize,

    /// Emit either terminal-friendly text or machine-readable JSON
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,
}

#[derive(Args, Debug)]
pub struct ParamArgs {
    /// Path of a persisted workflow
    #[arg(value_name = "WORKFLOW")]
    pub workflow: PathBuf,

    /// Parameter group handle
    #[arg(value_name = "HANDLE")]
    pub handle: usize,
}

#[derive(Args, Debug)]
pub struct CopyArgs {
    /// Path of a persisted workflow
    #[arg(value_name = "WORKFLOW")]
    pub workflow: PathBuf,

    /// Destination directory; must not exist
    #[arg(value_name = "DEST")]
    pub dest: PathBuf,
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Path of a persisted workflow
    #[arg(value_name = "WORKFLOW")]
    pub workflow: PathBuf,
}
