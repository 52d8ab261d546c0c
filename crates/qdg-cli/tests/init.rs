use std::fs;
use std::process::Command;

use tempfile::TempDir;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_qdg"))
}

#[test]
fn init_creates_store_and_is_idempotent() {
    let temp = TempDir::new().expect("tempdir");

    let output = bin()
        .arg("--project")
        .arg(temp.path())
        .arg("init")
        .output()
        .expect("init");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("created"));

    let config = temp.path().join(".qdg/config/qdg.config.json");
    assert!(config.is_file());
    assert!(temp.path().join(".qdg/tasks").is_dir());
    let before = fs::read_to_string(&config).expect("config");

    let output = bin()
        .arg("--project")
        .arg(temp.path())
        .arg("--json")
        .arg("init")
        .output()
        .expect("init again");
    assert!(output.status.success());
    let layout: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(layout["config_created"], false);
    let existed = layout["existed"].as_array().expect("existed");
    assert!(existed
        .iter()
        .any(|path| path.as_str().unwrap_or("").ends_with("config")));
    assert_eq!(fs::read_to_string(&config).expect("config"), before);
}

#[test]
fn init_uses_project_path_env_var() {
    let temp = TempDir::new().expect("tempdir");
    let output = bin()
        .env("QDG_PROJECT_PATH", temp.path())
        .arg("init")
        .output()
        .expect("init");
    assert!(output.status.success());
    assert!(temp.path().join(".qdg/tasks").is_dir());
}

#[test]
fn missing_project_is_an_error() {
    let temp = TempDir::new().expect("tempdir");
    let output = bin()
        .arg("--project")
        .arg(temp.path().join("missing"))
        .arg("init")
        .output()
        .expect("init");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("does not exist"));
}
