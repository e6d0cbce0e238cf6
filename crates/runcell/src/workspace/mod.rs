//! Per-request workspaces
//!
//! Each dispatch gets a private, uniquely named directory that is deleted
//! when the dispatch ends. The manager also bounds how many workspaces (and
//! therefore dispatches) can exist at once.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, warn};

/// Prefix of every workspace directory name
pub const WORKSPACE_PREFIX: &str = "runcell-";

/// Errors that occur while managing workspaces
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace under {root}: {source}")]
    CreateFailed {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove workspace {path}: {source}")]
    RemoveFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("workspace manager is closed")]
    Closed,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An isolated directory owned by a single dispatch
///
/// # Cleanup
///
/// Call [`release()`](Self::release) when done. A workspace that is dropped
/// without being released (panic, cancelled future) is removed synchronously
/// in `Drop` and a warning is logged.
#[derive(Debug)]
pub struct Workspace {
    /// Backing directory, `None` once released
    dir: Option<TempDir>,

    /// Path to the workspace directory
    path: PathBuf,

    /// Pool permit, returned after the directory is gone
    _permit: Option<OwnedSemaphorePermit>,
}

impl Workspace {
    /// Create a workspace directory under `root`
    ///
    /// This does blocking filesystem work; async callers go through
    /// [`WorkspaceManager::acquire`], which runs it on the blocking pool.
    #[instrument]
    pub fn create(root: &Path) -> Result<Self, WorkspaceError> {
        std::fs::create_dir_all(root).map_err(|source| WorkspaceError::CreateFailed {
            root: root.to_path_buf(),
            source,
        })?;

        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(root)
            .map_err(|source| WorkspaceError::CreateFailed {
                root: root.to_path_buf(),
                source,
            })?;
        let path = dir.path().to_path_buf();

        debug!(?path, "workspace created");

        Ok(Self {
            dir: Some(dir),
            path,
            _permit: None,
        })
    }

    /// Get the path to the workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the host path to a file inside the workspace
    ///
    /// Returns an error if the path contains path traversal attempts.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        if name.is_empty() || name.contains("..") || name.starts_with('/') {
            return Err(WorkspaceError::InvalidPath(format!(
                "path traversal not allowed: {name}"
            )));
        }
        Ok(self.path.join(name))
    }

    /// Write a file into the workspace
    #[instrument(skip(self, content))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<(), WorkspaceError> {
        let path = self.file_path(name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file to workspace");
        Ok(())
    }

    /// Read a file from the workspace
    #[instrument(skip(self))]
    pub async fn read_file(&self, name: &str) -> Result<Vec<u8>, WorkspaceError> {
        let path = self.file_path(name)?;
        let content = tokio::fs::read(&path).await?;
        debug!(?path, len = content.len(), "read file from workspace");
        Ok(content)
    }

    /// Check if a file exists in the workspace
    pub async fn file_exists(&self, name: &str) -> Result<bool, WorkspaceError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::metadata(&path).await.is_ok())
    }

    /// Delete the workspace and everything written into it
    #[must_use = "release errors should be handled"]
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn release(mut self) -> Result<(), WorkspaceError> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };

        let path = self.path.clone();
        let result = tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(|e| WorkspaceError::RemoveFailed {
                path: path.clone(),
                source: std::io::Error::other(e),
            })?;

        result.map_err(|source| {
            warn!(path = %path.display(), error = %source, "workspace removal failed");
            WorkspaceError::RemoveFailed { path, source }
        })?;

        debug!("workspace released");
        Ok(())
    }

    /// Check if the workspace has not been released yet
    pub fn is_active(&self) -> bool {
        self.dir.is_some()
    }

    /// Attach a pool permit to this workspace
    pub(crate) fn with_permit(mut self, permit: OwnedSemaphorePermit) -> Self {
        self._permit = Some(permit);
        self
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            warn!(
                path = %self.path.display(),
                "Workspace dropped without explicit release, removing synchronously"
            );
            if let Err(e) = dir.close() {
                warn!(path = %self.path.display(), error = %e, "workspace removal on drop failed");
            }
        }
    }
}

/// Hands out workspaces, at most `capacity` at a time
#[derive(Debug)]
pub struct WorkspaceManager {
    /// Directory under which workspaces are created
    root: PathBuf,

    /// Maximum number of live workspaces
    capacity: usize,

    /// Semaphore to limit concurrent workspaces
    semaphore: Arc<Semaphore>,
}

impl WorkspaceManager {
    /// Create a new workspace manager
    pub fn new(root: impl Into<PathBuf>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            root: root.into(),
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Acquire a fresh workspace, waiting if all slots are in use
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn acquire(&self) -> Result<Workspace, WorkspaceError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| WorkspaceError::Closed)?;

        let root = self.root.clone();
        let workspace = tokio::task::spawn_blocking(move || Workspace::create(&root))
            .await
            .map_err(|e| WorkspaceError::CreateFailed {
                root: self.root.clone(),
                source: std::io::Error::other(e),
            })??;
        Ok(workspace.with_permit(permit))
    }

    /// Get the directory under which workspaces are created
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the number of free slots
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get the maximum number of live workspaces
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stop handing out workspaces; pending and future acquires fail
    pub fn close(&self) {
        self.semaphore.close();
    }
}
