//! Integration tests for the CLI interface

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

fn seqplan(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("seqplan").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env_remove("SEQPLAN_REASONING_URL")
        .env_remove("SEQPLAN_KNOWLEDGE_URL")
        .env_remove("SEQPLAN_UI_URL");
    cmd
}

#[test]
fn test_cli_help_lists_commands() {
    let tmp = TempDir::new().unwrap();
    seqplan(&tmp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("validate"));
}

#[test]
fn test_plan_prints_cicd_plan_json() {
    let tmp = TempDir::new().unwrap();
    let output = seqplan(&tmp)
        .args(["plan", "cicd", "-p", "pipelineType=complete", "-p", "notifications=true"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: Value = serde_json::from_slice(&output.stdout).unwrap();
    let ids: Vec<&str> = plan["steps"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["lint", "test", "build", "deploy", "verify", "notify"]);
    assert_eq!(plan["steps"][5]["dependsOn"], json!(["verify"]));
}

#[test]
fn test_plan_reads_params_file_and_writes_output() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(
        tmp.path().join("params.json"),
        json!({ "workflowType": "analysis" }).to_string(),
    )
    .unwrap();
    seqplan(&tmp)
        .args(["plan", "data", "--params", "params.json", "-o", "out/plan.json"])
        .assert()
        .success();

    let plan: Value =
        serde_json::from_str(&std::fs::read_to_string(tmp.path().join("out/plan.json")).unwrap())
            .unwrap();
    assert_eq!(plan["domain"], "data");
    assert_eq!(plan["metadata"]["workflowType"], "analysis");
}

#[test]
fn test_unknown_domain_is_plan_error() {
    let tmp = TempDir::new().unwrap();
    seqplan(&tmp)
        .args(["plan", "finance"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown domain 'finance'"));
}

#[test]
fn test_validate_rejects_dangling_dependency() {
    let tmp = TempDir::new().unwrap();
    let plan = json!({
        "id": "p1",
        "name": "broken",
        "domain": "cicd",
        "createdAt": "2026-01-01T00:00:00Z",
        "steps": [
            { "id": "lint", "number": 1, "name": "Lint" },
            { "id": "test", "number": 2, "name": "Test", "dependsOn": ["setup"] }
        ]
    });
    std::fs::write(tmp.path().join("plan.json"), plan.to_string()).unwrap();

    seqplan(&tmp)
        .args(["validate", "plan.json"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("setup"));
}

#[test]
fn test_validate_accepts_generated_plan() {
    let tmp = TempDir::new().unwrap();
    seqplan(&tmp)
        .args(["plan", "documentation", "-o", "docs-plan.json"])
        .assert()
        .success();
    seqplan(&tmp)
        .args(["validate", "docs-plan.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("is valid"));
}

#[test]
fn test_goal_falls_back_without_tools() {
    let tmp = TempDir::new().unwrap();
    let output = seqplan(&tmp)
        .args(["goal", "find the rate limit docs", "-n", "2"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["domain"], "general");
    assert_eq!(plan["steps"][0]["id"], "fallback-1");
    assert_eq!(plan["steps"][0]["actionType"], "context");
}

#[test]
fn test_continue_extends_steps() {
    let tmp = TempDir::new().unwrap();
    let steps = json!([
        { "id": "fallback-1", "number": 1, "name": "Task 1" },
        { "id": "fallback-2", "number": 2, "name": "Task 2" }
    ]);
    std::fs::write(tmp.path().join("steps.json"), steps.to_string()).unwrap();

    let output = seqplan(&tmp)
        .args(["continue", "--steps", "steps.json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let next: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(next.as_array().unwrap().len(), 2);
    assert_eq!(next[0]["number"], 3);
}

#[test]
fn test_bad_param_syntax() {
    let tmp = TempDir::new().unwrap();
    seqplan(&tmp)
        .args(["plan", "cicd", "-p", "pipelineType"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected KEY=VALUE"));
}
