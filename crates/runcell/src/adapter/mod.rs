//! Language adapters
//!
//! A configured [`Language`] is the adapter for that language: it stages
//! source into a workspace and turns its command templates into concrete
//! compile and run invocations. Adapters hold no per-request state, so one
//! configuration serves every concurrent dispatch.

use std::path::Path;

use thiserror::Error;
use tracing::{debug, instrument};

pub use crate::adapter::entry::extract_entry;
use crate::config::Language;
use crate::process::{ProcessCommand, ProcessError};
use crate::workspace::{Workspace, WorkspaceError};

mod entry;

/// Names derived from the source when it is staged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDescriptor {
    /// Entry symbol (extracted or fallback), or "main" for languages without one
    pub entry: String,

    /// Source file name inside the workspace
    pub source_name: String,

    /// Compiler output name, for compiled languages
    pub output_name: Option<String>,
}

/// Errors that occur while staging source into a workspace
#[derive(Debug, Error)]
pub enum StageError {
    #[error("source is empty")]
    EmptySource,

    #[error("invalid entry pattern: {0}")]
    EntryPattern(#[from] regex::Error),

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("invalid command: {0}")]
    Command(#[from] ProcessError),
}

/// Entry name used by languages without entry extraction
const DEFAULT_ENTRY: &str = "main";

impl Language {
    /// Derive entry, source, and output names from source text
    pub fn describe_entry(&self, source: &str) -> Result<EntryDescriptor, StageError> {
        let entry = match self.entry {
            Some(ref config) => extract_entry(config, source)?,
            None => DEFAULT_ENTRY.to_owned(),
        };

        Ok(EntryDescriptor {
            source_name: self.source_name(&entry),
            output_name: self.output_name(&entry),
            entry,
        })
    }

    /// Write the source into the workspace under its language-specific name
    #[instrument(skip(self, workspace, source), fields(language = %self.name))]
    pub async fn stage(
        &self,
        workspace: &Workspace,
        source: &str,
    ) -> Result<EntryDescriptor, StageError> {
        if source.trim().is_empty() {
            return Err(StageError::EmptySource);
        }

        let descriptor = self.describe_entry(source)?;
        workspace
            .write_file(&descriptor.source_name, source.as_bytes())
            .await?;

        debug!(
            entry = %descriptor.entry,
            source_name = %descriptor.source_name,
            "staged source"
        );
        Ok(descriptor)
    }

    /// Build the compiler invocation, or `None` for interpreted languages
    pub fn compile_command(
        &self,
        workspace_dir: &Path,
        entry: &EntryDescriptor,
    ) -> Result<Option<ProcessCommand>, StageError> {
        let Some(ref compile) = self.compile else {
            return Ok(None);
        };

        let output = entry.output_name.as_deref().unwrap_or(DEFAULT_ENTRY);
        let argv = Language::expand_command(
            &compile.command,
            &entry.source_name,
            output,
            &entry.entry,
        );

        let mut command = base_command(argv, workspace_dir, &compile.path)?;
        for (key, value) in &compile.env {
            command = command.env(key, value);
        }
        Ok(Some(command))
    }

    /// Build the invocation that executes the staged program
    pub fn run_command(
        &self,
        workspace_dir: &Path,
        entry: &EntryDescriptor,
    ) -> Result<ProcessCommand, StageError> {
        let binary = entry
            .output_name
            .as_deref()
            .unwrap_or(&entry.source_name);
        let argv =
            Language::expand_command(&self.run.command, &entry.source_name, binary, &entry.entry);

        let mut command = base_command(argv, workspace_dir, &self.run.path)?;
        for (key, value) in &self.run.env {
            command = command.env(key, value);
        }
        Ok(command)
    }
}

/// Command running inside `workspace_dir` with a minimal environment
///
/// A program starting with `./` is resolved against the workspace.
fn base_command(
    mut argv: Vec<String>,
    workspace_dir: &Path,
    path: &str,
) -> Result<ProcessCommand, StageError> {
    if let Some(first) = argv.first_mut()
        && let Some(relative) = first.strip_prefix("./")
    {
        *first = workspace_dir.join(relative).to_string_lossy().into_owned();
    }

    let dir = workspace_dir.to_string_lossy();
    Ok(ProcessCommand::from_argv(argv)?
        .working_dir(workspace_dir)
        .env("PATH", path)
        .env("HOME", dir.as_ref())
        .env("TMPDIR", dir.as_ref()))
}
