use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Configuration for a programming language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    /// Human-readable name for the language (e.g., "C++ 17 (GCC)")
    pub name: String,

    /// File extension
    pub extension: FileExtension,

    /// Source file name template (defaults to `main.{extension}`)
    ///
    /// May reference `{entry}`, e.g. `{entry}.java`.
    #[serde(default)]
    pub source_name: Option<String>,

    /// Entry symbol extraction (None if the language has no named entry point)
    #[serde(default)]
    pub entry: Option<EntryConfig>,

    /// Compilation configuration (None for interpreted languages)
    #[serde(default)]
    pub compile: Option<CompileConfig>,

    /// Execution configuration
    pub run: RunConfig,
}

impl Language {
    /// Check if the language is compiled
    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Get the source file name for this language given the entry name
    pub fn source_name(&self, entry: &str) -> String {
        match self.source_name {
            Some(ref template) => template.replace("{entry}", entry),
            None => format!("main.{}", self.extension),
        }
    }

    /// Get the compiler output name given the entry name
    pub fn output_name(&self, entry: &str) -> Option<String> {
        self.compile
            .as_ref()
            .map(|compile| compile.output_name.replace("{entry}", entry))
    }

    /// Expand placeholders in the given command
    pub fn expand_command(
        command: &[String],
        source: &str,
        binary: &str,
        entry: &str,
    ) -> Vec<String> {
        command
            .iter()
            .map(|arg| {
                arg.replace("{source}", source)
                    .replace("{output}", binary)
                    .replace("{binary}", binary)
                    .replace("{entry}", entry)
            })
            .collect()
    }
}

/// File extension without dot (e.g., "cpp")
#[derive(Debug, Clone, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        let contains_invalid = extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c));
        if contains_invalid {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/' or '.' characters",
            )
        })
    }
}

impl std::fmt::Display for FileExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Best-effort extraction of a named entry point from source text
///
/// This is a text scan, not a parser. The first match of `pattern` supplies
/// the entry name; `fallback` is used when nothing matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryConfig {
    /// Regular expression whose first capture group is the entry name
    pattern: String,

    /// Entry name used when the pattern does not match
    pub fallback: String,

    /// `pattern`, compiled on first use
    #[serde(skip)]
    compiled: OnceLock<Regex>,
}

impl EntryConfig {
    pub fn new(pattern: impl Into<String>, fallback: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            fallback: fallback.into(),
            compiled: OnceLock::new(),
        }
    }

    /// Get the pattern source
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Get the compiled pattern, compiling it once per config
    pub fn regex(&self) -> Result<&Regex, regex::Error> {
        if let Some(regex) = self.compiled.get() {
            return Ok(regex);
        }
        let regex = Regex::new(&self.pattern)?;
        Ok(self.compiled.get_or_init(|| regex))
    }
}

/// Configuration for the compilation step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {output}, {entry}
    pub command: Vec<String>,

    /// Output name (e.g., "main", "{entry}.class")
    #[serde(default = "default_output_name")]
    pub output_name: String,

    /// Environment variables to set during compilation
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// PATH environment variable for the compiler
    #[serde(default = "default_child_path")]
    pub path: String,
}

/// Default PATH for child processes
pub const DEFAULT_CHILD_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Configuration for the execution step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Command and arguments with placeholders
    /// Placeholders: {source}, {binary}, {entry}
    pub command: Vec<String>,

    /// Environment Variables to set
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// PATH environment variable for the program
    ///
    /// Defaults to "/usr/local/bin:/usr/bin:/bin" if not specified.
    #[serde(default = "default_child_path")]
    pub path: String,
}

fn default_output_name() -> String {
    "main".to_owned()
}

fn default_child_path() -> String {
    DEFAULT_CHILD_PATH.to_owned()
}
