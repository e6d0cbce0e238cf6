use std::time::Duration;

use runcell::{ExecutionLimits, ExecutionRequest, FailureKind};

use super::{entry_count, test_runner};

/// Dispatch `request` and assert the workspace root is empty afterwards
async fn assert_no_leftovers(language: &str, source: &str, expected: Option<FailureKind>) {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());
    let limits = ExecutionLimits::default().with_time_limit(Duration::from_millis(500));

    let outcome = runner
        .execute_with_limits(&ExecutionRequest::new(language, source), &limits)
        .await;

    assert_eq!(outcome.failure_kind, expected, "stderr: {}", outcome.stderr);
    assert_eq!(
        entry_count(root.path()),
        0,
        "workspace left behind after {expected:?}"
    );
    assert_eq!(runner.workspaces().available(), runner.workspaces().capacity());
}

#[tokio::test]
async fn test_cleanup_after_success() {
    assert_no_leftovers("shell", "echo ok > out.txt; mkdir -p a/b/c", None).await;
}

#[tokio::test]
async fn test_cleanup_after_runtime_error() {
    assert_no_leftovers("shell", "touch junk; exit 1", Some(FailureKind::RuntimeError)).await;
}

#[tokio::test]
async fn test_cleanup_after_timeout() {
    assert_no_leftovers("shell", "touch junk; sleep 10", Some(FailureKind::Timeout)).await;
}

#[tokio::test]
async fn test_cleanup_after_compile_error() {
    assert_no_leftovers("checked", "if then", Some(FailureKind::CompileError)).await;
}

#[tokio::test]
async fn test_cleanup_after_launch_error() {
    assert_no_leftovers("missing", "noop", Some(FailureKind::LaunchError)).await;
}

#[tokio::test]
async fn test_cleanup_when_dispatch_is_cancelled() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let request = ExecutionRequest::new("shell", "sleep 30");
    let cancelled =
        tokio::time::timeout(Duration::from_millis(300), runner.execute(&request)).await;
    assert!(cancelled.is_err());

    // Dropping the future drops the workspace, which removes it
    assert_eq!(entry_count(root.path()), 0);
    assert_eq!(runner.workspaces().available(), runner.workspaces().capacity());
}
