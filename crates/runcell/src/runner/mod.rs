//! Execution dispatcher for Runcell
//!
//! Sequences one request through workspace setup, staging, the optional
//! compile phase, the run phase, and teardown, and normalizes every result
//! into an [`ExecutionOutcome`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::adapter::StageError;
use crate::config::{Config, Language};
use crate::process::ProcessError;
use crate::types::{
    DispatchState, ExecutionLimits, ExecutionOutcome, ExecutionRequest, FailureKind,
};
use crate::workspace::{Workspace, WorkspaceError, WorkspaceManager};

mod compile;
mod execute;

/// Failures that end a dispatch before a process result could be mapped
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("language '{0}' is not supported")]
    UnsupportedLanguage(String),

    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("stage error: {0}")]
    Stage(#[from] StageError),

    #[error("process error: {0}")]
    Process(#[from] ProcessError),
}

impl DispatchError {
    /// Classify this error for the outcome
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::UnsupportedLanguage(_) => FailureKind::UnsupportedLanguage,
            Self::Workspace(_) => FailureKind::ResourceError,
            Self::Stage(_) => FailureKind::StageError,
            Self::Process(ProcessError::Launch { .. }) => FailureKind::LaunchError,
            Self::Process(ProcessError::EmptyCommand) => FailureKind::StageError,
            Self::Process(_) => FailureKind::ResourceError,
        }
    }

    /// Convert into an errored outcome with the error as detail
    pub fn into_outcome(self) -> ExecutionOutcome {
        ExecutionOutcome::errored(self.failure_kind(), String::new(), self.to_string())
    }
}

/// High-level runner for code execution
///
/// Clones share the same workspace pool, so every clone counts against one
/// concurrency bound.
#[derive(Debug, Clone)]
pub struct Runner {
    config: Arc<Config>,
    workspaces: Arc<WorkspaceManager>,
}

impl Runner {
    /// Create a new runner with the given configuration
    pub fn new(config: Config) -> Self {
        let workspaces =
            WorkspaceManager::new(config.workspace_root(), config.max_concurrent_executions);
        Self {
            config: Arc::new(config),
            workspaces: Arc::new(workspaces),
        }
    }

    /// Create a new runner with default configuration
    pub fn with_defaults() -> Self {
        Self::new(Config::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the workspace pool
    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Dispatch a request with the configured limits
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        self.execute_with_limits(request, &self.config.limits())
            .await
    }

    /// Dispatch a request with explicit limits
    ///
    /// Never fails: every error is captured in the returned outcome. The
    /// workspace is gone and no child process is running when this returns.
    #[instrument(skip(self, request, limits), fields(language = %request.language))]
    pub async fn execute_with_limits(
        &self,
        request: &ExecutionRequest,
        limits: &ExecutionLimits,
    ) -> ExecutionOutcome {
        let accepted = Instant::now();
        debug!(state = ?DispatchState::Pending, "dispatch accepted");

        let outcome = match self.dispatch(request, limits).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if let DispatchError::Process(ProcessError::Launch { ref program, .. }) = e {
                    error!(program, error = %e, "toolchain could not be launched");
                } else {
                    warn!(error = %e, "dispatch failed");
                }
                e.into_outcome()
            }
        }
        .with_elapsed(accepted.elapsed());

        info!(
            state = ?outcome.status,
            failure_kind = ?outcome.failure_kind,
            exit_code = ?outcome.exit_code,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "dispatch finished"
        );
        outcome
    }

    async fn dispatch(
        &self,
        request: &ExecutionRequest,
        limits: &ExecutionLimits,
    ) -> Result<ExecutionOutcome, DispatchError> {
        let language = self
            .config
            .get_language(&request.language)
            .map_err(|_| DispatchError::UnsupportedLanguage(request.language.clone()))?;

        let workspace = self.workspaces.acquire().await?;
        debug!(
            state = ?DispatchState::Running,
            workspace = %workspace.path().display(),
            "dispatch running"
        );

        let result = run_phases(language, &workspace, request, limits).await;

        if let Err(e) = workspace.release().await {
            warn!(error = %e, "failed to release workspace");
        }
        result
    }
}

/// Stage, compile if needed, then run
async fn run_phases(
    language: &Language,
    workspace: &Workspace,
    request: &ExecutionRequest,
    limits: &ExecutionLimits,
) -> Result<ExecutionOutcome, DispatchError> {
    let entry = language.stage(workspace, &request.source).await?;

    if let Some(failed) = compile::compile(language, workspace, &entry, limits).await? {
        return Ok(failed);
    }

    execute::execute(language, workspace, &entry, request.input.as_bytes(), limits).await
}

/// Render a time limit for user-facing messages ("10", "0.5")
fn format_secs(duration: Duration) -> String {
    duration.as_secs_f64().to_string()
}
