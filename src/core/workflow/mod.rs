//! Persistent workflow engine.
//!
//! A [`Workflow`] holds tasks built from [`TaskSchema`]s. Each task's element
//! sets are expanded into elements by resolving input sources and nesting
//! orders; values live in handle-addressed parameter groups inside a
//! [`WorkflowStore`], and every structural change commits atomically through
//! [`Workflow::batch_update`].

pub mod actions;
pub mod element;
pub mod element_set;
pub mod encoding;
pub mod error;
pub mod event_log;
pub mod metadata;
pub mod parameters;
pub mod paths;
pub mod resolver;
pub mod retry;
pub mod schema;
pub mod sources;
pub mod store;
pub mod task;
pub mod template;
#[allow(clippy::module_inception)]
pub mod workflow;

pub use actions::{resolve_element_actions, ActionKind, ElementAction, Placeholder, PlaceholderKind};
pub use element::{Element, ElementGraph, WorkflowTask};
pub use element_set::{
    ElementSet, ElementSetArgs, InputFile, InputSourceMode, InputValue, ResourceSpec,
    ValueSequence,
};
pub use error::{ValidationFault, WorkflowError};
pub use event_log::{Event, EventKind, EventLog};
pub use metadata::{DataIndex, WorkflowMetadata};
pub use parameters::{HandleLedger, ParameterStore};
pub use resolver::{resolve, ElementIndices, Multiplicity, UNNESTED};
pub use schema::{
    Action, ActionEnvironment, ActionRule, ActionScope, Command, Environment, SchemaInput,
    SchemaOutput, SchemaRegistry, TaskSchema,
};
pub use sources::{InputSource, TaskRef, TaskSourceKind};
pub use store::{DirectoryStore, StoredGroup, WorkflowStore};
pub use task::Task;
pub use template::WorkflowTemplate;
pub use workflow::{AddElements, ElementPropagation, Workflow};
