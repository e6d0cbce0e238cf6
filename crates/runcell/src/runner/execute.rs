//! Run phase
//!
//! Executes the staged (and possibly compiled) program with the caller's
//! input and maps the process result to a terminal outcome.

use tracing::{debug, instrument};

use crate::adapter::EntryDescriptor;
use crate::config::Language;
use crate::process;
use crate::runner::{DispatchError, format_secs};
use crate::types::{ExecutionLimits, ExecutionOutcome, FailureKind, ProcessResult};
use crate::workspace::Workspace;

/// Run the program in the workspace
#[instrument(skip_all, fields(language = %language.name))]
pub(crate) async fn execute(
    language: &Language,
    workspace: &Workspace,
    entry: &EntryDescriptor,
    input: &[u8],
    limits: &ExecutionLimits,
) -> Result<ExecutionOutcome, DispatchError> {
    let command = language
        .run_command(workspace.path(), entry)?
        .file_size_limit(limits.file_size_limit);
    debug!(argv = ?command.argv(), "executing program");

    let result = process::run(&command, input, limits.time_limit, limits.output_cap).await?;

    debug!(
        exit_code = ?result.exit_code,
        signal = ?result.signal,
        timed_out = result.timed_out,
        "execution complete"
    );

    Ok(map_result(&result, limits))
}

/// Map a run-phase process result to an outcome
fn map_result(result: &ProcessResult, limits: &ExecutionLimits) -> ExecutionOutcome {
    if result.timed_out {
        return ExecutionOutcome::timed_out(format!(
            "Code execution timed out after {} seconds",
            format_secs(limits.time_limit)
        ));
    }

    let stdout = result.stdout.to_text();
    let mut stderr = result.stderr.to_text();

    if result.is_success() {
        return ExecutionOutcome::completed(stdout, stderr);
    }

    if stderr.is_empty()
        && let Some(signal) = result.signal
    {
        stderr = format!("process terminated by signal {signal}");
    }

    ExecutionOutcome::errored(FailureKind::RuntimeError, stdout, stderr)
        .with_exit_code(result.exit_code)
}
