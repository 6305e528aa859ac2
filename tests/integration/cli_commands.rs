//! CLI smoke tests against the built binary with the mock service.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const PLAN: &str = r#"
name = "Cli Cards"
template = "A {color} card"

[variables]
color = ["red", "green"]
"#;

fn genloom(workspace: &Path, home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_genloom"))
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env("XDG_STATE_HOME", home.join("state"))
        .env("GENLOOM_LOG", "warn")
        .env_remove("GENLOOM_ENV")
        .arg("--workspace")
        .arg(workspace)
        .args(args)
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn plan_run_report_round_trip() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("ws");
    let home = temp.path().join("home");
    fs::create_dir_all(&workspace).unwrap();
    fs::create_dir_all(&home).unwrap();
    fs::write(workspace.join("cards.toml"), PLAN).unwrap();

    let planned = genloom(&workspace, &home, &["plan", "cards.toml", "--format", "json"]);
    assert!(planned.status.success(), "{}", String::from_utf8_lossy(&planned.stderr));
    let plan_json: serde_json::Value = serde_json::from_str(&stdout(&planned)).unwrap();
    assert_eq!(plan_json["jobs"].as_array().unwrap().len(), 2);
    let session_id = plan_json["session_id"].as_str().unwrap().to_string();
    assert!(session_id.starts_with("cli-cards-"));

    let ran = genloom(&workspace, &home, &["run", "cards.toml", "--mock"]);
    assert!(ran.status.success(), "{}", String::from_utf8_lossy(&ran.stderr));

    let status = genloom(&workspace, &home, &["status", &session_id, "--format", "json"]);
    assert!(status.status.success());
    let status_json: serde_json::Value = serde_json::from_str(&stdout(&status)).unwrap();
    assert_eq!(status_json["complete"], true);
    assert_eq!(status_json["counts"]["succeeded"], 2);

    let report = genloom(&workspace, &home, &["report", &session_id, "--format", "markdown"]);
    assert!(report.status.success());
    let markdown = stdout(&report);
    assert!(markdown.starts_with("# Cli Cards"));
    assert!(markdown.contains("- **color:** red"));

    // A second run resumes the finished checkpoint and makes no calls.
    let rerun = genloom(&workspace, &home, &["run", "cards.toml", "--mock"]);
    assert!(rerun.status.success());
    assert!(stdout(&rerun).contains("Resumed from checkpoint"));

    let sessions = genloom(&workspace, &home, &["sessions", "--format", "json"]);
    let listed: serde_json::Value = serde_json::from_str(&stdout(&sessions)).unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let stats = genloom(&workspace, &home, &["cache", "stats", "--format", "json"]);
    let stats_json: serde_json::Value = serde_json::from_str(&stdout(&stats)).unwrap();
    assert_eq!(stats_json["entries"], 2);
}

#[test]
fn unknown_plan_key_fails_with_planning_exit_code() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("ws");
    let home = temp.path().join("home");
    fs::create_dir_all(&workspace).unwrap();
    fs::create_dir_all(&home).unwrap();
    fs::write(
        workspace.join("bad.toml"),
        "name = \"bad\"\ntemplate = \"{x}\"\nsampler = \"all\"\n\n[variables]\nx = [\"1\"]\n",
    )
    .unwrap();

    let output = genloom(&workspace, &home, &["plan", "bad.toml"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn corrupt_checkpoint_run_refuses_without_confirmation() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().join("ws");
    let home = temp.path().join("home");
    fs::create_dir_all(&workspace).unwrap();
    fs::create_dir_all(&home).unwrap();
    fs::write(workspace.join("cards.toml"), PLAN).unwrap();

    let ran = genloom(&workspace, &home, &["run", "cards.toml", "--mock"]);
    assert!(ran.status.success());

    let checkpoints = workspace.join(".genloom").join("checkpoints");
    let checkpoint = fs::read_dir(&checkpoints)
        .unwrap()
        .map(|e| e.unwrap().path())
        .find(|p| p.extension().and_then(|e| e.to_str()) == Some("json"))
        .unwrap();
    fs::write(&checkpoint, b"{}").unwrap();

    // No terminal: the confirmation prompt cannot be answered.
    let refused = genloom(&workspace, &home, &["run", "cards.toml", "--mock"]);
    assert!(!refused.status.success());
    assert!(checkpoint.exists());

    let fresh = genloom(&workspace, &home, &["run", "cards.toml", "--mock", "--fresh"]);
    assert!(fresh.status.success(), "{}", String::from_utf8_lossy(&fresh.stderr));
    assert!(checkpoint.with_extension("json.bak").exists());
}
