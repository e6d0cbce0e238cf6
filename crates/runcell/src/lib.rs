//! A library for dispatching untrusted code to external toolchains.
//!
//! Runcell accepts source code in one of several configured languages,
//! compiles it if needed, runs it against optional input, and returns a
//! normalized outcome regardless of language or failure mode.
//!
//! # Features
//!
//! - **Per-request workspaces**: a private temporary directory for every dispatch, always removed.
//! - **Multi-language**: compiled and interpreted languages described by TOML command templates.
//! - **Bounded execution**: wall-clock limits that kill the whole process group, capped output capture, and a file size limit.
//! - **Backpressure**: a configurable maximum number of concurrent dispatches.
//!
//! Runcell is not a sandbox. Children run with the privileges of the host
//! process, a cleared environment, and no kernel-level isolation.

pub use adapter::{EntryDescriptor, StageError, extract_entry};
pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language};
pub use process::{ProcessCommand, ProcessError, run};
pub use runner::{DispatchError, Runner};
pub use types::{
    CapturedOutput, DispatchState, ExecutionLimits, ExecutionOutcome, ExecutionRequest,
    FailureKind, ProcessResult, TRUNCATION_MARKER,
};
pub use workspace::{Workspace, WorkspaceError, WorkspaceManager};

pub mod adapter;
pub mod config;
pub mod process;
pub mod runner;
pub mod types;
pub mod workspace;
