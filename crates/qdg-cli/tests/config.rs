use std::process::Command;

use tempfile::TempDir;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_qdg"))
}

fn settings_json(project: &std::path::Path) -> serde_json::Value {
    let output = bin()
        .arg("--project")
        .arg(project)
        .arg("--json")
        .arg("config")
        .arg("show")
        .output()
        .expect("config show");
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).expect("json")
}

#[test]
fn show_defaults_without_store() {
    let temp = TempDir::new().expect("tempdir");
    let settings = settings_json(temp.path());
    assert_eq!(settings["settings"]["dimensionCount"], 5);
    assert_eq!(settings["settings"]["expectedScore"], 8.0);
}

#[test]
fn set_updates_only_given_fields() {
    let temp = TempDir::new().expect("tempdir");
    let output = bin()
        .arg("--project")
        .arg(temp.path())
        .args(["config", "set", "--dimension-count", "7"])
        .output()
        .expect("config set");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("dimensionCount: 7"));

    let output = bin()
        .arg("--project")
        .arg(temp.path())
        .args(["config", "set", "--expected-score", "9.5"])
        .output()
        .expect("config set");
    assert!(output.status.success());

    let settings = settings_json(temp.path());
    assert_eq!(settings["settings"]["dimensionCount"], 7);
    assert_eq!(settings["settings"]["expectedScore"], 9.5);
}

#[test]
fn set_rejects_out_of_range_values() {
    let temp = TempDir::new().expect("tempdir");
    for args in [
        ["--dimension-count", "0"],
        ["--dimension-count", "11"],
        ["--expected-score", "-1"],
        ["--expected-score", "11"],
    ] {
        let output = bin()
            .arg("--project")
            .arg(temp.path())
            .args(["config", "set"])
            .args(args)
            .output()
            .expect("config set");
        assert!(!output.status.success(), "accepted {:?}", args);
        assert!(String::from_utf8_lossy(&output.stderr).contains("invalid settings"));
    }
    assert_eq!(settings_json(temp.path())["settings"]["dimensionCount"], 5);
}
