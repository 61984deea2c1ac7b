//! End-to-end tests that drive the `funclab` binary.

use std::path::Path;
use std::process::Output;

use funclab_test_utils::config::TestConfigBuilder;
use funclab_test_utils::fixtures::{BROKEN_TS, COUNTER_TS, MATH_TS};
use funclab_test_utils::workspace::TestWorkspace;
use pretty_assertions::assert_eq;

async fn funclab(workspace: &TestWorkspace, args: &[&str]) -> Output {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_funclab"))
        .current_dir(workspace.path())
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .await
        .expect("failed to spawn funclab")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("stdout is not JSON")
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("non-UTF-8 temp path")
}

#[tokio::test]
async fn test_extract_lists_descriptors_as_json() {
    let workspace = TestWorkspace::new();
    let file = workspace.write("math.ts", MATH_TS).await;

    let output = funclab(&workspace, &["extract", path_arg(&file), "--json"]).await;
    assert!(output.status.success());
    let json = stdout_json(&output);
    let names: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["add", "sum", "createMultiplier", "fail"]);
    assert_eq!(json[0]["startLine"], 1);
    assert_eq!(json[1]["parameters"][0]["rest"], true);
}

#[tokio::test]
async fn test_extract_rejects_syntax_errors() {
    let workspace = TestWorkspace::new();
    let file = workspace.write("broken.ts", BROKEN_TS).await;

    let output = funclab(&workspace, &["extract", path_arg(&file)]).await;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("syntax error"), "stderr: {stderr}");
}

#[tokio::test]
async fn test_run_pairs_arguments_with_parameters() {
    let workspace = TestWorkspace::new();
    let file = workspace.write("math.ts", MATH_TS).await;

    let output = funclab(&workspace, &["run", path_arg(&file), "add", "-a", "2", "-a", "3"]).await;
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["success"], true);
    assert_eq!(json["value"], 5);
    assert!(json["elapsedMs"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn test_run_follow_up_call() {
    let workspace = TestWorkspace::new();
    let file = workspace.write("math.ts", MATH_TS).await;

    let output = funclab(
        &workspace,
        &["run", path_arg(&file), "createMultiplier", "-a", "5", "--then", "10"],
    )
    .await;
    let json = stdout_json(&output);
    assert_eq!(json["value"], 50);
}

#[tokio::test]
async fn test_run_reports_thrown_errors() {
    let workspace = TestWorkspace::new();
    let file = workspace.write("math.ts", MATH_TS).await;

    let output = funclab(&workspace, &["run", path_arg(&file), "fail", "-a", "'nope'"]).await;
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["success"], false);
    assert_eq!(json["errorMessage"], "nope");
}

#[tokio::test]
async fn test_run_class_method() {
    let workspace = TestWorkspace::new();
    let file = workspace.write("counter.ts", COUNTER_TS).await;

    let output = funclab(
        &workspace,
        &["run", path_arg(&file), "Counter.increment", "-a", "4"],
    )
    .await;
    assert_eq!(stdout_json(&output)["value"], 4);
}

#[tokio::test]
async fn test_run_unknown_entry_fails() {
    let workspace = TestWorkspace::new();
    let file = workspace.write("math.ts", MATH_TS).await;

    let output = funclab(&workspace, &["run", path_arg(&file), "missing"]).await;
    assert!(!output.status.success());
}

#[tokio::test]
async fn test_goto_prints_start_line() {
    let workspace = TestWorkspace::new();
    let file = workspace.write("counter.ts", COUNTER_TS).await;

    let output = funclab(&workspace, &["goto", path_arg(&file), "Counter.increment"]).await;
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "8");
}

#[tokio::test]
async fn test_coerce_prints_source_and_json() {
    let workspace = TestWorkspace::new();

    let output = funclab(&workspace, &["coerce", "new Point(1, 'a')"]).await;
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        r#"new Point(1, "a")"#
    );

    let output = funclab(&workspace, &["coerce", "2024-05-01", "--type", "Date", "--json"]).await;
    assert_eq!(stdout_json(&output), serde_json::json!("2024-05-01T00:00:00+00:00"));
}

#[tokio::test]
async fn test_config_uses_file_when_present() {
    let workspace = TestWorkspace::new();
    let toml = TestConfigBuilder::new().console_capacity(7).to_toml();
    workspace.write_config(&toml).await;

    let output = funclab(&workspace, &["config", "--show"]).await;
    assert!(output.status.success());
    let shown = String::from_utf8_lossy(&output.stdout);
    assert!(shown.contains("console_capacity = 7"), "stdout: {shown}");

    let output = funclab(&workspace, &["config"]).await;
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        "Configuration at 'funclab.toml' is valid."
    );
}

#[tokio::test]
async fn test_invalid_config_is_an_error() {
    let workspace = TestWorkspace::new();
    workspace.write_config("[output]\nconsole_capacity = 0\n").await;

    let output = funclab(&workspace, &["config"]).await;
    assert!(!output.status.success());
}
