use crate::cli::Command;
use std::env;

/// Execution contexts that influence how logging is routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// A person reading text output in a terminal.
    Interactive,
    /// Output consumed by another program, e.g. `--format json` or a scheduler.
    Machine,
}

impl ExecutionContext {
    /// Returns `true` when console sinks should be disabled.
    pub fn disables_console(self) -> bool {
        matches!(self, ExecutionContext::Machine)
    }
}

/// Derive the active execution context from a parsed CLI command plus overrides.
pub fn detect_context(command: &Command) -> ExecutionContext {
    if batch_override_enabled() || command.emits_json() {
        ExecutionContext::Machine
    } else {
        ExecutionContext::Interactive
    }
}

fn batch_override_enabled() -> bool {
    env::var("PARAMFLOW_BATCH")
        .map(|value| value.trim() == "1")
        .unwrap_or(false)
}
