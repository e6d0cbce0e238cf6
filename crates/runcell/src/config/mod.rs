use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{
    CompileConfig, DEFAULT_CHILD_PATH, EntryConfig, FileExtension, Language, RunConfig,
};
use crate::types::ExecutionLimits;

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../runcell.example.toml");

/// Prefix for environment variables that override file settings
pub const ENV_PREFIX: &str = "RUNCELL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for Runcell
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Wall-clock limit in seconds for each compile or run process
    #[serde(default = "default_time_limit")]
    pub time_limit: f64,

    /// Maximum bytes kept from each of stdout and stderr
    #[serde(default = "default_output_cap")]
    pub output_cap: u64,

    /// Largest file a compile or run process may write, in bytes
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Maximum number of dispatches running at once
    #[serde(default = "default_max_concurrent_executions")]
    pub max_concurrent_executions: usize,

    /// Directory under which workspaces are created (system temp dir if unset)
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,

    /// Language configurations keyed by language ID
    #[serde(default)]
    pub languages: HashMap<String, Language>,
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            time_limit: default_time_limit(),
            output_cap: default_output_cap(),
            max_file_size: default_max_file_size(),
            max_concurrent_executions: default_max_concurrent_executions(),
            workspace_root: None,
            languages: HashMap::new(),
        }
    }

    /// Get a language by ID
    pub fn get_language(&self, id: &str) -> Result<&Language, ConfigError> {
        self.languages
            .get(id)
            .ok_or_else(|| ConfigError::LanguageNotFound(id.to_string()))
    }

    /// Get the directory under which workspaces are created
    pub fn workspace_root(&self) -> PathBuf {
        self.workspace_root
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Time, output, and file size limits derived from this config
    ///
    /// A `time_limit` that is not a valid duration (only possible if the
    /// config was built by hand rather than loaded) falls back to the default.
    pub fn limits(&self) -> ExecutionLimits {
        let defaults = ExecutionLimits::default();
        ExecutionLimits {
            time_limit: Duration::try_from_secs_f64(self.time_limit)
                .unwrap_or(defaults.time_limit),
            output_cap: usize::try_from(self.output_cap).unwrap_or(usize::MAX),
            file_size_limit: self.max_file_size,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_time_limit() -> f64 {
    10.0
}

fn default_output_cap() -> u64 {
    1024 * 1024
}

fn default_max_file_size() -> u64 {
    64 * 1024 * 1024
}

fn default_max_concurrent_executions() -> usize {
    4
}
