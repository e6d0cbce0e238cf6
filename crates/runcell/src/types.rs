use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

/// Marker appended to a stream whose captured text hit the output cap
pub const TRUNCATION_MARKER: &str = "\n\n[Output truncated due to size limit]";

/// A single request to compile (if needed) and run a program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Language ID as configured (e.g. "cpp", "python")
    pub language: String,

    /// Program source text
    pub source: String,

    /// Data written to the program's stdin
    #[serde(default)]
    pub input: String,
}

impl ExecutionRequest {
    /// Create a request with empty input
    pub fn new(language: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            source: source.into(),
            input: String::new(),
        }
    }

    /// Set the data fed to the program's stdin
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = input.into();
        self
    }
}

/// Time and output bounds applied to each phase of a dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionLimits {
    /// Wall-clock budget for a single process
    pub time_limit: Duration,

    /// Maximum bytes kept from each output stream
    pub output_cap: usize,

    /// Largest file a process may write, in bytes
    pub file_size_limit: u64,
}

impl ExecutionLimits {
    /// 1 MiB, the default output cap
    pub const MIB: usize = 1024 * 1024;

    /// Set the wall-clock budget
    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }

    /// Set the per-stream output cap in bytes
    pub fn with_output_cap(mut self, bytes: usize) -> Self {
        self.output_cap = bytes;
        self
    }

    /// Set the largest file a process may write
    pub fn with_file_size_limit(mut self, bytes: u64) -> Self {
        self.file_size_limit = bytes;
        self
    }

    /// Apply optional overrides on top of these limits
    pub fn with_overrides(self, time_limit: Option<Duration>, output_cap: Option<usize>) -> Self {
        Self {
            time_limit: time_limit.unwrap_or(self.time_limit),
            output_cap: output_cap.unwrap_or(self.output_cap),
            ..self
        }
    }
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(10),
            output_cap: Self::MIB,
            file_size_limit: 64 * Self::MIB as u64,
        }
    }
}

/// Bytes captured from one output stream of a child process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Captured prefix, at most the output cap in length
    pub bytes: Vec<u8>,

    /// Whether the stream produced more than was kept
    pub truncated: bool,
}

impl CapturedOutput {
    /// Whether nothing was captured
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decode the captured bytes, appending the truncation marker if needed
    ///
    /// A multi-byte character split by the cap is dropped rather than
    /// replaced. Invalid bytes decode to U+FFFD, which is wider than the byte
    /// it replaces, so the decoded text is cut back to the captured length on
    /// a character boundary and marked as truncated. The result is never
    /// longer than the captured bytes plus the marker.
    pub fn to_text(&self) -> String {
        let mut bytes = self.bytes.as_slice();
        if self.truncated
            && let Err(e) = std::str::from_utf8(bytes)
            && e.error_len().is_none()
        {
            bytes = &bytes[..e.valid_up_to()];
        }

        let limit = self.bytes.len();
        let mut text = String::from_utf8_lossy(bytes).into_owned();
        let widened = text.len() > limit;
        if widened {
            let mut end = limit;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }

        if self.truncated || widened {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}

/// Result of running one child process
#[derive(Debug, Clone, Default)]
pub struct ProcessResult {
    /// Exit code if the process exited normally
    pub exit_code: Option<i32>,

    /// Signal number if the process was killed by a signal
    pub signal: Option<i32>,

    /// Whether the process was killed for exceeding its time limit
    pub timed_out: bool,

    /// Captured standard output
    pub stdout: CapturedOutput,

    /// Captured standard error
    pub stderr: CapturedOutput,

    /// Wall-clock time from spawn to exit
    pub elapsed: Duration,
}

impl ProcessResult {
    /// Check if the process exited with code 0 within its time limit
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Compiler-style combined output: stdout, then stderr
    pub fn combined_output(&self) -> String {
        let stdout = self.stdout.to_text();
        let stderr = self.stderr.to_text();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, _) => stderr,
            (false, true) => stdout,
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}

/// Lifecycle of a dispatch
///
/// `Pending -> Running -> {Completed, Errored, TimedOut}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    /// Accepted but not started
    Pending,

    /// Workspace acquired, phases in progress
    Running,

    /// The program ran and exited with code 0
    Completed,

    /// Any failure other than a timeout
    Errored,

    /// The compile or run phase exceeded its time limit
    TimedOut,
}

impl DispatchState {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored | Self::TimedOut)
    }
}

/// Why a dispatch did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The submitted source failed to build
    CompileError,

    /// The program exited with a nonzero code or was killed by a signal
    RuntimeError,

    /// The compile or run phase exceeded the time limit
    Timeout,

    /// The workspace could not be allocated or an I/O failure occurred
    ResourceError,

    /// The source could not be written into the workspace
    StageError,

    /// The compiler or interpreter binary could not be started
    LaunchError,

    /// No adapter is configured for the requested language
    UnsupportedLanguage,
}

impl FailureKind {
    /// Whether the failure points at the environment rather than the code
    pub fn is_operational(&self) -> bool {
        matches!(
            self,
            Self::ResourceError | Self::StageError | Self::LaunchError
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CompileError => "compile error",
            Self::RuntimeError => "runtime error",
            Self::Timeout => "timeout",
            Self::ResourceError => "resource error",
            Self::StageError => "stage error",
            Self::LaunchError => "launch error",
            Self::UnsupportedLanguage => "unsupported language",
        };
        f.write_str(name)
    }
}

/// Normalized result of a dispatch, identical in shape for every language
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionOutcome {
    /// Terminal dispatch state
    pub status: DispatchState,

    /// Whether the program ran and exited with code 0
    pub succeeded: bool,

    /// Program stdout (possibly truncated)
    pub stdout: String,

    /// Program stderr, compiler diagnostics, or failure detail
    pub stderr: String,

    /// Wall-clock time from acceptance to the terminal state
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,

    /// Failure classification, `None` on success
    pub failure_kind: Option<FailureKind>,

    /// Exit code of the last process that ran, if it exited normally
    pub exit_code: Option<i32>,
}

impl ExecutionOutcome {
    /// Outcome of a program that ran to completion with exit code 0
    pub fn completed(stdout: String, stderr: String) -> Self {
        Self {
            status: DispatchState::Completed,
            succeeded: true,
            stdout,
            stderr,
            elapsed: Duration::ZERO,
            failure_kind: None,
            exit_code: Some(0),
        }
    }

    /// Outcome of a dispatch that failed for a reason other than a timeout
    pub fn errored(kind: FailureKind, stdout: String, stderr: String) -> Self {
        Self {
            status: DispatchState::Errored,
            succeeded: false,
            stdout,
            stderr,
            elapsed: Duration::ZERO,
            failure_kind: Some(kind),
            exit_code: None,
        }
    }

    /// Outcome of a phase killed for exceeding its time limit
    pub fn timed_out(message: String) -> Self {
        Self {
            status: DispatchState::TimedOut,
            succeeded: false,
            stdout: String::new(),
            stderr: message,
            elapsed: Duration::ZERO,
            failure_kind: Some(FailureKind::Timeout),
            exit_code: None,
        }
    }

    /// Set the exit code
    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    /// Set the elapsed time
    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    /// User-facing sentence describing the terminal state
    pub fn message(&self) -> &'static str {
        match self.status {
            DispatchState::Completed => "Code executed successfully!",
            DispatchState::TimedOut => {
                "Code execution timed out. Your program may have an infinite loop or is taking too long."
            }
            DispatchState::Errored => match self.failure_kind {
                Some(FailureKind::CompileError) => {
                    "Compilation failed. Check the error output for details."
                }
                Some(FailureKind::UnsupportedLanguage) => "The requested language is not supported.",
                Some(kind) if kind.is_operational() => {
                    "The execution environment failed. Contact support if this persists."
                }
                _ => "Code execution failed. Check the error output for details.",
            },
            DispatchState::Pending => "Code execution is pending...",
            DispatchState::Running => "Code is currently executing...",
        }
    }
}

fn serialize_secs<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}
