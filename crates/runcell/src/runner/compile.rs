//! Compilation phase
//!
//! Runs the language's compiler inside the workspace, if it has one.

use tracing::{debug, instrument};

use crate::adapter::EntryDescriptor;
use crate::config::Language;
use crate::process;
use crate::runner::{DispatchError, format_secs};
use crate::types::{ExecutionLimits, ExecutionOutcome, FailureKind};
use crate::workspace::Workspace;

/// Compile the staged source
///
/// Returns `Ok(None)` when compilation succeeded or the language is
/// interpreted, and `Ok(Some(outcome))` when the dispatch ends here.
#[instrument(skip_all, fields(language = %language.name))]
pub(crate) async fn compile(
    language: &Language,
    workspace: &Workspace,
    entry: &EntryDescriptor,
    limits: &ExecutionLimits,
) -> Result<Option<ExecutionOutcome>, DispatchError> {
    let Some(command) = language.compile_command(workspace.path(), entry)? else {
        return Ok(None);
    };
    let command = command.file_size_limit(limits.file_size_limit);

    let result = process::run(&command, &[], limits.time_limit, limits.output_cap).await?;

    debug!(
        success = result.is_success(),
        exit_code = ?result.exit_code,
        timed_out = result.timed_out,
        "compilation complete"
    );

    if result.timed_out {
        return Ok(Some(ExecutionOutcome::timed_out(format!(
            "Compilation timed out after {} seconds",
            format_secs(limits.time_limit)
        ))));
    }

    if !result.is_success() {
        // Diagnostics are reported verbatim, stdout first
        let outcome = ExecutionOutcome::errored(
            FailureKind::CompileError,
            String::new(),
            result.combined_output(),
        )
        .with_exit_code(result.exit_code);
        return Ok(Some(outcome));
    }

    Ok(None)
}
