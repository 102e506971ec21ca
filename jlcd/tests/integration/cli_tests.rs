use std::process::Command;

use crate::common::{TestWorkspace, assert_contains, free_port, init_test_logging};

#[test]
fn test_jlcd_help_lists_commands() {
    init_test_logging();
    crate::test_log!("TEST START: test_jlcd_help_lists_commands");

    let output = Command::new(env!("CARGO_BIN_EXE_jlcd"))
        .arg("--help")
        .output()
        .expect("Failed to run jlcd --help");

    assert!(output.status.success(), "jlcd --help failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_contains(&stdout, "Jest Lua Companion");
    for command in ["run", "serve", "discover"] {
        assert_contains(&stdout, command);
    }
    crate::test_log!("TEST PASS: test_jlcd_help_lists_commands");
}

#[test]
fn test_jlcd_version() {
    init_test_logging();

    let output = Command::new(env!("CARGO_BIN_EXE_jlcd"))
        .arg("--version")
        .output()
        .expect("Failed to run jlcd --version");

    assert!(output.status.success());
    assert_contains(
        &String::from_utf8_lossy(&output.stdout),
        env!("CARGO_PKG_VERSION"),
    );
}

#[test]
fn test_discover_prints_framework_and_tests() {
    init_test_logging();
    crate::test_log!("TEST START: test_discover_prints_framework_and_tests");
    let workspace = TestWorkspace::new();

    let output = Command::new(env!("CARGO_BIN_EXE_jlcd"))
        .arg("discover")
        .arg("--workspace")
        .arg(workspace.path())
        .output()
        .expect("Failed to run jlcd discover");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "discover failed: {stdout}");
    assert_contains(&stdout, "jest: ReplicatedStorage/Packages/Jest");
    assert_contains(&stdout, "2 test module(s)");
    assert_contains(&stdout, "ReplicatedStorage/math.spec  (src/math.spec.lua)");
    assert_contains(&stdout, "ReplicatedStorage/__tests__");
    crate::test_log!("TEST PASS: test_discover_prints_framework_and_tests");
}

#[test]
fn test_discover_json_output() {
    init_test_logging();
    let workspace = TestWorkspace::new();

    let output = Command::new(env!("CARGO_BIN_EXE_jlcd"))
        .args(["discover", "--json", "--workspace"])
        .arg(workspace.path())
        .output()
        .expect("Failed to run jlcd discover --json");

    assert!(output.status.success());
    let json: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("discover --json should print JSON");
    assert_eq!(
        json["framework_path"],
        serde_json::json!(["ReplicatedStorage", "Packages", "Jest"])
    );
    assert_eq!(json["tests"].as_array().unwrap().len(), 2);
    assert_eq!(json["tests"][0]["id"], "ReplicatedStorage/math.spec");
}

#[test]
fn test_discover_without_sourcemap_fails() {
    init_test_logging();
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_jlcd"))
        .arg("discover")
        .arg("--workspace")
        .arg(dir.path())
        .output()
        .expect("Failed to run jlcd discover");

    assert!(!output.status.success());
    assert_contains(
        &String::from_utf8_lossy(&output.stderr),
        "Sourcemap is missing or invalid",
    );
}

#[test]
fn test_run_without_sourcemap_fails_fast() {
    init_test_logging();
    crate::test_log!("TEST START: test_run_without_sourcemap_fails_fast");
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_jlcd"))
        .arg("run")
        .arg("--workspace")
        .arg(dir.path())
        .arg("--port")
        .arg(free_port().to_string())
        .output()
        .expect("Failed to run jlcd run");

    assert!(!output.status.success());
    assert_contains(
        &String::from_utf8_lossy(&output.stderr),
        "Sourcemap is missing or invalid",
    );
    crate::test_log!("TEST PASS: test_run_without_sourcemap_fails_fast");
}
