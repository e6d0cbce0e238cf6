use std::time::{Duration, Instant};

use runcell::{DispatchState, ExecutionLimits, ExecutionRequest, FailureKind, TRUNCATION_MARKER};

use super::test_runner;

/// Whether `pid` still names a live (non-zombie) process
fn is_running(pid: u32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // The state field follows the parenthesized command name
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next())
        .is_some_and(|state| state != 'Z' && state != 'X')
}

#[tokio::test]
async fn test_infinite_loop_times_out() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());
    let limits = ExecutionLimits::default().with_time_limit(Duration::from_millis(500));

    let started = Instant::now();
    let outcome = runner
        .execute_with_limits(
            &ExecutionRequest::new("shell", "while :; do :; done"),
            &limits,
        )
        .await;

    assert_eq!(outcome.status, DispatchState::TimedOut);
    assert_eq!(outcome.failure_kind, Some(FailureKind::Timeout));
    assert_eq!(outcome.stderr, "Code execution timed out after 0.5 seconds");
    assert!(outcome.stdout.is_empty());
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(outcome.message().starts_with("Code execution timed out."));
}

#[tokio::test]
#[cfg(target_os = "linux")]
async fn test_timeout_leaves_no_orphans() {
    let root = tempfile::tempdir().unwrap();
    let scratch = tempfile::tempdir().unwrap();
    let pid_file = scratch.path().join("child.pid");
    let runner = test_runner(root.path());
    let limits = ExecutionLimits::default().with_time_limit(Duration::from_millis(500));

    let source = format!(
        "sleep 60 &\necho $! > '{}'\nwait\n",
        pid_file.display()
    );
    let outcome = runner
        .execute_with_limits(&ExecutionRequest::new("shell", source), &limits)
        .await;
    assert_eq!(outcome.failure_kind, Some(FailureKind::Timeout));

    let pid: u32 = std::fs::read_to_string(&pid_file)
        .expect("script should record its child")
        .trim()
        .parse()
        .unwrap();

    // The kill is synchronous but reaping by init is not
    let deadline = Instant::now() + Duration::from_secs(2);
    while is_running(pid) && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(!is_running(pid), "background child {pid} survived the timeout");
}

#[tokio::test]
async fn test_output_is_truncated() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());
    let cap = 256;
    let limits = ExecutionLimits::default().with_output_cap(cap);

    let source = "i=0\nwhile [ $i -lt 1000 ]; do\n  echo 0123456789abcdef\n  i=$((i+1))\ndone\n";
    let outcome = runner
        .execute_with_limits(&ExecutionRequest::new("shell", source), &limits)
        .await;

    assert!(outcome.succeeded, "stderr: {}", outcome.stderr);
    assert!(outcome.stdout.ends_with(TRUNCATION_MARKER));
    assert!(outcome.stdout.len() <= cap + TRUNCATION_MARKER.len());
    assert!(outcome.stdout.starts_with("0123456789abcdef\n"));
    assert!(outcome.stderr.is_empty());
}

#[tokio::test]
async fn test_stderr_is_capped_independently() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());
    let limits = ExecutionLimits::default().with_output_cap(64);

    let source = "echo short\ni=0\nwhile [ $i -lt 100 ]; do echo noisy-diagnostic >&2; i=$((i+1)); done\nexit 1\n";
    let outcome = runner
        .execute_with_limits(&ExecutionRequest::new("shell", source), &limits)
        .await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::RuntimeError));
    assert_eq!(outcome.stdout, "short\n");
    assert!(outcome.stderr.ends_with(TRUNCATION_MARKER));
    assert!(outcome.stderr.len() <= 64 + TRUNCATION_MARKER.len());
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let root = tempfile::tempdir().unwrap();
    let config = runcell::Config {
        max_concurrent_executions: 1,
        ..super::test_config(root.path())
    };
    let runner = runcell::Runner::new(config);

    let request = ExecutionRequest::new("shell", "sleep 0.3");
    let started = Instant::now();
    let (first, second) = tokio::join!(runner.execute(&request), runner.execute(&request));

    assert!(first.succeeded && second.succeeded);
    // One slot: the second dispatch waits for the first
    assert!(started.elapsed() >= Duration::from_millis(600));
    assert_eq!(runner.workspaces().available(), 1);
}

#[tokio::test]
async fn test_timeout_in_workspace_root_with_spaces() {
    let parent = tempfile::tempdir().unwrap();
    let root = parent.path().join("dir with spaces");
    let runner = test_runner(&root);
    let limits = ExecutionLimits::default().with_time_limit(Duration::from_millis(200));

    let outcome = runner
        .execute_with_limits(&ExecutionRequest::new("shell", "sleep 10"), &limits)
        .await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::Timeout));
    assert_eq!(super::entry_count(&root), 0);
}

#[tokio::test]
async fn test_invalid_utf8_output_stays_within_cap() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());
    let cap = 1000;
    let limits = ExecutionLimits::default().with_output_cap(cap);

    let source = "i=0\nwhile [ $i -lt 1000 ]; do\n  printf '\\377\\377\\377\\377'\n  i=$((i+1))\ndone\n";
    let outcome = runner
        .execute_with_limits(&ExecutionRequest::new("shell", source), &limits)
        .await;

    assert!(outcome.succeeded, "stderr: {}", outcome.stderr);
    assert!(outcome.stdout.starts_with('\u{FFFD}'));
    assert!(outcome.stdout.ends_with(TRUNCATION_MARKER));
    assert!(outcome.stdout.len() <= cap + TRUNCATION_MARKER.len());
}

#[tokio::test]
async fn test_oversized_file_write_is_stopped() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());
    let limit = 64 * 1024;
    let limits = ExecutionLimits::default().with_file_size_limit(limit);

    // The shell reports the writer's status instead of dying with it
    let source = "head -c 1000000 /dev/zero > big.bin\necho \"status=$?\"\nwc -c < big.bin\n";
    let outcome = runner
        .execute_with_limits(&ExecutionRequest::new("shell", source), &limits)
        .await;

    assert!(outcome.succeeded, "stderr: {}", outcome.stderr);
    let mut lines = outcome.stdout.lines();
    assert_ne!(lines.next(), Some("status=0"));
    let written: u64 = lines.next().unwrap().trim().parse().unwrap();
    assert!(written <= limit, "wrote {written} bytes past a {limit} byte limit");
}
