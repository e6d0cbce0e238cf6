use runcell::{DispatchState, ExecutionRequest, FailureKind};

use super::{entry_count, test_runner};

#[tokio::test]
async fn test_hello_world() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let outcome = runner
        .execute(&ExecutionRequest::new("shell", "echo 'Hello, World!'"))
        .await;

    assert!(outcome.succeeded, "stderr: {}", outcome.stderr);
    assert_eq!(outcome.status, DispatchState::Completed);
    assert_eq!(outcome.stdout, "Hello, World!\n");
    assert_eq!(outcome.failure_kind, None);
    assert_eq!(outcome.exit_code, Some(0));
    assert_eq!(outcome.message(), "Code executed successfully!");
}

#[tokio::test]
async fn test_input_is_fed_to_stdin() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let request = ExecutionRequest::new("shell", "read a\nread b\necho $((a + b))")
        .with_input("3\n4\n");
    let outcome = runner.execute(&request).await;

    assert!(outcome.succeeded, "stderr: {}", outcome.stderr);
    assert_eq!(outcome.stdout, "7\n");
}

#[tokio::test]
async fn test_empty_input_reads_eof() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let outcome = runner
        .execute(&ExecutionRequest::new("shell", "cat; echo done"))
        .await;

    assert!(outcome.succeeded);
    assert_eq!(outcome.stdout, "done\n");
}

#[tokio::test]
async fn test_success_keeps_stderr() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let outcome = runner
        .execute(&ExecutionRequest::new("shell", "echo out; echo note >&2"))
        .await;

    assert!(outcome.succeeded);
    assert_eq!(outcome.stdout, "out\n");
    assert_eq!(outcome.stderr, "note\n");
}

#[tokio::test]
async fn test_runtime_error() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let outcome = runner
        .execute(&ExecutionRequest::new(
            "shell",
            "echo partial; echo 'something broke' >&2; exit 3",
        ))
        .await;

    assert!(!outcome.succeeded);
    assert_eq!(outcome.status, DispatchState::Errored);
    assert_eq!(outcome.failure_kind, Some(FailureKind::RuntimeError));
    assert_eq!(outcome.stdout, "partial\n");
    assert_eq!(outcome.stderr, "something broke\n");
    assert_eq!(outcome.exit_code, Some(3));
}

#[tokio::test]
async fn test_killed_by_signal() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let outcome = runner
        .execute(&ExecutionRequest::new("shell", "kill -9 $$"))
        .await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::RuntimeError));
    assert_eq!(outcome.stderr, "process terminated by signal 9");
    assert_eq!(outcome.exit_code, None);
}

#[tokio::test]
async fn test_entry_extraction() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    // $0 is the staged file name, $1 the entry
    let source = "# entry: greeter\necho \"$0 $1\"";
    let outcome = runner
        .execute(&ExecutionRequest::new("named", source))
        .await;

    assert!(outcome.succeeded, "stderr: {}", outcome.stderr);
    assert_eq!(outcome.stdout, "greeter.sh greeter\n");
}

#[tokio::test]
async fn test_entry_fallback() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let outcome = runner
        .execute(&ExecutionRequest::new("named", "echo \"$0 $1\""))
        .await;

    assert!(outcome.succeeded, "stderr: {}", outcome.stderr);
    assert_eq!(outcome.stdout, "script.sh script\n");
}

#[tokio::test]
async fn test_environment_is_minimal() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let source = "[ -f \"$HOME/main.sh\" ] && echo home\n\
                  [ \"$TMPDIR\" = \"$HOME\" ] && echo tmp\n\
                  echo \"[$CARGO_MANIFEST_DIR]\"";
    let outcome = runner.execute(&ExecutionRequest::new("shell", source)).await;

    assert!(outcome.succeeded, "stderr: {}", outcome.stderr);
    assert_eq!(outcome.stdout, "home\ntmp\n[]\n");
}

#[tokio::test]
async fn test_launch_error() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let outcome = runner
        .execute(&ExecutionRequest::new("missing", "anything"))
        .await;

    assert!(!outcome.succeeded);
    assert_eq!(outcome.status, DispatchState::Errored);
    assert_eq!(outcome.failure_kind, Some(FailureKind::LaunchError));
    assert!(outcome.stdout.is_empty());
    assert!(outcome.stderr.contains("runcell-interpreter"));
    assert_eq!(entry_count(root.path()), 0);
}

#[tokio::test]
async fn test_unsupported_language_has_no_side_effects() {
    let root = tempfile::tempdir().unwrap();
    let workspaces = root.path().join("workspaces");
    let runner = test_runner(&workspaces);

    let outcome = runner
        .execute(&ExecutionRequest::new("brainfuck", "+[]"))
        .await;

    assert_eq!(outcome.status, DispatchState::Errored);
    assert_eq!(
        outcome.failure_kind,
        Some(FailureKind::UnsupportedLanguage)
    );
    assert!(outcome.stdout.is_empty());
    // The workspace root is created lazily on first acquire
    assert!(!workspaces.exists());
}

#[tokio::test]
async fn test_empty_source_is_stage_error() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let outcome = runner.execute(&ExecutionRequest::new("shell", "")).await;

    assert_eq!(outcome.failure_kind, Some(FailureKind::StageError));
    assert_eq!(entry_count(root.path()), 0);
}

#[tokio::test]
async fn test_outcome_serializes() {
    let root = tempfile::tempdir().unwrap();
    let runner = test_runner(root.path());

    let outcome = runner
        .execute(&ExecutionRequest::new("shell", "echo hi"))
        .await;
    let json = serde_json::to_value(&outcome).unwrap();

    assert_eq!(json["status"], "completed");
    assert_eq!(json["succeeded"], true);
    assert_eq!(json["stdout"], "hi\n");
    assert!(json["failure_kind"].is_null());
    assert!(json["elapsed"].as_f64().unwrap() > 0.0);
}
