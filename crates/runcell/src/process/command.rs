//! Command builder for child processes
//!
//! Builds a fully specified invocation: program, arguments, a cleared
//! environment with only the given variables, a working directory, and an
//! optional cap on the size of files the child may write.

use std::collections::BTreeMap;
#[cfg(unix)]
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::process::ProcessError;

/// Builder for a child process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    /// Program name or path
    program: String,
    args: Vec<String>,
    /// Complete child environment; nothing is inherited
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    /// RLIMIT_FSIZE applied in the child before exec
    file_size_limit: Option<u64>,
}

impl ProcessCommand {
    /// Create a new command for `program`
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            file_size_limit: None,
        }
    }

    /// Create a command from an argv vector (program first)
    pub fn from_argv(argv: Vec<String>) -> Result<Self, ProcessError> {
        let mut argv = argv.into_iter();
        let program = argv.next().ok_or(ProcessError::EmptyCommand)?;
        Ok(Self::new(program).args(argv))
    }

    /// Add an argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Limit the size of any file the child writes, in bytes
    ///
    /// Writes past the limit fail with `EFBIG` and raise `SIGXFSZ`, whose
    /// default action terminates the writer. Only enforced on unix.
    pub fn file_size_limit(mut self, bytes: u64) -> Self {
        self.file_size_limit = Some(bytes);
        self
    }

    /// Get the program
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Get the arguments
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Get an environment variable
    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// Get the working directory
    pub fn get_working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Get the file size limit
    pub fn get_file_size_limit(&self) -> Option<u64> {
        self.file_size_limit
    }

    /// Program followed by arguments
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Build the tokio command
    ///
    /// All three standard streams are piped. On unix the child leads a new
    /// process group so its descendants can be signalled together.
    pub(crate) fn build(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref dir) = self.working_dir {
            command.current_dir(dir);
        }

        #[cfg(unix)]
        {
            command.process_group(0);

            if let Some(limit) = self.file_size_limit {
                use nix::sys::resource::{Resource, setrlimit};

                // SAFETY: setrlimit is a single async-signal-safe syscall and
                // the closure touches no state shared with the parent
                unsafe {
                    command.pre_exec(move || {
                        setrlimit(Resource::RLIMIT_FSIZE, limit, limit).map_err(io::Error::from)
                    });
                }
            }
        }

        command
    }
}
