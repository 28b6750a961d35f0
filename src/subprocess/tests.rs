use super::*;
use std::time::Duration;

#[cfg(unix)]
#[tokio::test]
async fn test_tokio_runner_captures_stdout_and_exit_code() {
    let runner = TokioProcessRunner;
    let cmd = ProcessCommandBuilder::new("sh")
        .args(["-c", "echo built; echo warn >&2; exit 3"])
        .build();

    let output = runner.run(cmd).await.unwrap();
    assert_eq!(output.status, ExitStatus::Error(3));
    assert_eq!(output.stdout.trim(), "built");
    assert_eq!(output.stderr.trim(), "warn");
    assert_eq!(output.combined_output(), "built\nwarn");
}

#[cfg(unix)]
#[tokio::test]
async fn test_tokio_runner_feeds_stdin() {
    let runner = TokioProcessRunner;
    let cmd = ProcessCommandBuilder::new("cat")
        .stdin("pipeline report".to_string())
        .build();

    let output = runner.run(cmd).await.unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, "pipeline report");
}

#[cfg(unix)]
#[tokio::test]
async fn test_tokio_runner_enforces_timeout() {
    let runner = TokioProcessRunner;
    let cmd = ProcessCommandBuilder::new("sleep")
        .arg("5")
        .timeout(Some(Duration::from_millis(100)))
        .build();

    let err = runner.run(cmd).await.unwrap_err();
    assert!(matches!(err, ProcessError::Timeout(d) if d == Duration::from_millis(100)));
}

#[cfg(unix)]
#[tokio::test]
async fn test_tokio_runner_passes_env_and_dir() {
    let dir = tempfile::tempdir().unwrap();
    let runner = TokioProcessRunner;
    let cmd = ProcessCommandBuilder::new("sh")
        .args(["-c", "echo $STAGE; pwd"])
        .env("STAGE", "production")
        .current_dir(dir.path())
        .build();

    let output = runner.run(cmd).await.unwrap();
    let lines: Vec<&str> = output.stdout.lines().collect();
    assert_eq!(lines[0], "production");
    assert!(lines[1].ends_with(dir.path().file_name().unwrap().to_str().unwrap()));
}

#[tokio::test]
async fn test_missing_program_is_command_not_found() {
    let runner = TokioProcessRunner;
    let cmd = ProcessCommandBuilder::new("seqplan-definitely-not-a-real-binary").build();

    let err = runner.run(cmd).await.unwrap_err();
    assert!(matches!(err, ProcessError::CommandNotFound(p) if p.contains("not-a-real")));
}

#[tokio::test]
async fn test_mock_runner_matches_args_and_records_calls() {
    let mut mock = MockProcessRunner::new();
    mock.expect_command("npx")
        .with_args(|args| args.first().map(String::as_str) == Some("jest"))
        .returns_stdout("{\"numFailedTests\":0}")
        .finish();
    mock.expect_command("npx")
        .returns_exit_code(2)
        .returns_stderr("eslint crashed")
        .finish();

    let jest = mock
        .run(ProcessCommandBuilder::new("npx").arg("jest").build())
        .await
        .unwrap();
    assert!(jest.status.success());

    let eslint = mock
        .run(ProcessCommandBuilder::new("npx").arg("eslint").build())
        .await
        .unwrap();
    assert_eq!(eslint.status.code(), Some(2));
    assert_eq!(eslint.stderr, "eslint crashed");

    assert!(mock.verify_called("npx", 2));
    assert_eq!(mock.get_call_history()[1].args, vec!["eslint"]);
}

#[tokio::test]
async fn test_mock_runner_times_limit_and_timeout() {
    let mut mock = MockProcessRunner::new();
    mock.expect_command("deploy").times(1).finish();
    mock.expect_command("slow")
        .times_out_after(Duration::from_secs(1))
        .finish();

    assert!(mock.run(ProcessCommandBuilder::new("deploy").build()).await.is_ok());
    assert!(matches!(
        mock.run(ProcessCommandBuilder::new("deploy").build()).await,
        Err(ProcessError::MockExpectationNotMet(_))
    ));
    assert!(matches!(
        mock.run(ProcessCommandBuilder::new("slow").build()).await,
        Err(ProcessError::Timeout(_))
    ));
}
