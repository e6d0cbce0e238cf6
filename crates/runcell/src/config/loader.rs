//! Configuration file loading for Runcell
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat, Map};

use crate::config::{Config, ConfigError, ENV_PREFIX};

impl Config {
    /// Load configuration from a file, with `RUNCELL_*` environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load(path.as_ref(), None)
    }

    /// Load configuration from a file, taking `RUNCELL_*` overrides from
    /// `vars` instead of the process environment
    pub fn from_file_with_env<I, K, V>(path: impl AsRef<Path>, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: Map<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        Self::load(path.as_ref(), Some(vars))
    }

    fn load(path: &Path, vars: Option<Map<String, String>>) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.time_limit > 0.0 && Duration::try_from_secs_f64(self.time_limit).is_ok()) {
            return Err(ConfigError::Invalid(format!(
                "time_limit must be a positive number of seconds, got {}",
                self.time_limit
            )));
        }
        if self.output_cap == 0 {
            return Err(ConfigError::Invalid(
                "output_cap must be greater than zero".to_owned(),
            ));
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::Invalid(
                "max_file_size must be greater than zero".to_owned(),
            ));
        }
        if self.max_concurrent_executions == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_executions must be at least 1".to_owned(),
            ));
        }

        for (id, lang) in &self.languages {
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if lang.extension.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty extension"
                )));
            }
            if lang.run.command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty run command"
                )));
            }
            if let Some(ref compile) = lang.compile
                && compile.command.is_empty()
            {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty compile command"
                )));
            }
            if let Some(ref entry) = lang.entry {
                let pattern = entry.regex().map_err(|e| {
                    ConfigError::Invalid(format!("language '{id}' has invalid entry pattern: {e}"))
                })?;
                if pattern.captures_len() < 2 {
                    return Err(ConfigError::Invalid(format!(
                        "language '{id}' entry pattern needs a capture group"
                    )));
                }
                if entry.fallback.is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "language '{id}' has empty entry fallback"
                    )));
                }
            }
        }

        Ok(())
    }
}
