//! Child process execution
//!
//! Runs a single command with piped stdin, a wall-clock limit that kills the
//! whole process group, and stdout/stderr capture bounded to a byte cap.

use std::io;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

pub use crate::process::command::ProcessCommand;
use crate::process::group::ProcessGroup;
use crate::types::{CapturedOutput, ProcessResult};

mod command;
mod group;

/// How long to wait for output pipes to close once the process has exited
const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Read buffer size for output pipes
const READ_CHUNK: usize = 8192;

/// Errors that occur while running a child process
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("empty command")]
    EmptyCommand,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Run a command to completion or until `time_limit` elapses
///
/// `input` is written to stdin, which is then closed. Each of stdout and
/// stderr keeps at most `output_cap` bytes; the rest is read and discarded
/// so the child never blocks on a full pipe. On timeout the child's process
/// group is killed and the result is marked `timed_out`.
#[instrument(skip(command, input), fields(program = command.program()))]
pub async fn run(
    command: &ProcessCommand,
    input: &[u8],
    time_limit: Duration,
    output_cap: usize,
) -> Result<ProcessResult, ProcessError> {
    debug!(argv = ?command.argv(), "spawning process");

    let started = Instant::now();
    let mut child = command.build().spawn().map_err(|source| {
        let program = command.program().to_owned();
        match source.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                ProcessError::Launch { program, source }
            }
            _ => ProcessError::Spawn { program, source },
        }
    })?;
    let mut group = ProcessGroup::new(child.id());

    let stdin_task = child
        .stdin
        .take()
        .map(|stdin| tokio::spawn(feed_stdin(stdin, input.to_vec())));
    let stdout_task = tokio::spawn(read_capped(child.stdout.take(), output_cap));
    let stderr_task = tokio::spawn(read_capped(child.stderr.take(), output_cap));

    let exit = tokio::time::timeout(time_limit, wait_for_exit(&mut child, &group)).await;
    let timed_out = match exit {
        Ok(exited) => {
            exited?;
            false
        }
        Err(_) => {
            warn!(?time_limit, "time limit exceeded, killing process group");
            true
        }
    };
    let elapsed = started.elapsed();

    // Also stops descendants that outlived the leader; they may hold the
    // pipes open
    group.kill();
    if timed_out {
        // Covers platforms without process groups
        let _ = child.start_kill();
    }
    let status = child.wait().await?;

    if let Some(task) = stdin_task {
        task.abort();
    }
    let stdout = collect_output(stdout_task, "stdout").await;
    let stderr = collect_output(stderr_task, "stderr").await;

    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal: Option<i32> = None;

    let result = ProcessResult {
        exit_code: status.code(),
        signal,
        timed_out,
        stdout,
        stderr,
        elapsed,
    };

    debug!(
        exit_code = ?result.exit_code,
        signal = ?result.signal,
        timed_out,
        elapsed_ms = elapsed.as_millis() as u64,
        stdout_truncated = result.stdout.truncated,
        stderr_truncated = result.stderr.truncated,
        "process finished"
    );

    Ok(result)
}

/// Resolve once the child has exited
///
/// On Linux the child is left unreaped, keeping its group ID reserved until
/// the group has been killed. Elsewhere the child is reaped here and the
/// following group kill can race with PID reuse.
#[cfg(target_os = "linux")]
async fn wait_for_exit(child: &mut Child, group: &ProcessGroup) -> io::Result<()> {
    if let Err(e) = group.wait_exited().await {
        debug!(error = %e, "waiting without reaping failed, reaping directly");
        child.wait().await?;
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
async fn wait_for_exit(child: &mut Child, _group: &ProcessGroup) -> io::Result<()> {
    child.wait().await.map(drop)
}

/// Write `input` to the child's stdin, then close it
async fn feed_stdin(mut stdin: ChildStdin, input: Vec<u8>) {
    if !input.is_empty()
        && let Err(e) = stdin.write_all(&input).await
        && e.kind() != io::ErrorKind::BrokenPipe
    {
        debug!(error = %e, "failed to write stdin");
    }
    // Dropping the handle closes the pipe and signals EOF
}

/// Drain a pipe, keeping at most `cap` bytes
async fn read_capped<R>(reader: Option<R>, cap: usize) -> CapturedOutput
where
    R: AsyncRead + Unpin,
{
    let mut captured = CapturedOutput::default();
    let Some(mut reader) = reader else {
        return captured;
    };

    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!(error = %e, "output pipe read failed");
                break;
            }
        };

        let room = cap.saturating_sub(captured.bytes.len());
        if n > room {
            captured.bytes.extend_from_slice(&buf[..room]);
            captured.truncated = true;
        } else {
            captured.bytes.extend_from_slice(&buf[..n]);
        }
    }

    captured
}

/// Join a reader task, abandoning it if the pipe stays open too long
async fn collect_output(task: JoinHandle<CapturedOutput>, stream: &str) -> CapturedOutput {
    let abort = task.abort_handle();
    match tokio::time::timeout(PIPE_DRAIN_GRACE, task).await {
        Ok(Ok(captured)) => captured,
        Ok(Err(e)) => {
            warn!(stream, error = %e, "output reader failed");
            CapturedOutput::default()
        }
        Err(_) => {
            abort.abort();
            warn!(stream, "output pipe still open after exit, discarding reader");
            CapturedOutput::default()
        }
    }
}
