use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use crate::common::{TestWorkspace, assert_contains, free_port, init_test_logging};

const STARTUP_TIMEOUT: Duration = Duration::from_secs(20);

fn spawn_run(workspace: &TestWorkspace, port: u16, extra: &[&str]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_jlcd"))
        .arg("run")
        .arg("--workspace")
        .arg(workspace.path())
        .arg("--port")
        .arg(port.to_string())
        .args(extra)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn jlcd run")
}

fn url(port: u16, path: &str) -> String {
    format!("http://127.0.0.1:{port}{path}")
}

/// Poll as agent `guid` until the daemon hands out commands.
fn poll_until_commands(port: u16, guid: &str) -> Value {
    let deadline = Instant::now() + STARTUP_TIMEOUT;
    loop {
        let response = ureq::get(&url(port, "/"))
            .header("place-id", "1818")
            .header("place-guid", guid)
            .call();
        if let Ok(mut response) = response {
            let body = response.body_mut().read_to_string().expect("poll body");
            let commands: Value = serde_json::from_str(&body).expect("poll JSON");
            if commands.as_array().is_some_and(|c| !c.is_empty()) {
                return commands;
            }
        }
        assert!(Instant::now() < deadline, "daemon never offered commands");
        thread::sleep(Duration::from_millis(50));
    }
}

fn post(port: u16, path: &str, guid: &str, body: &str) -> Result<u16, ureq::Error> {
    ureq::post(&url(port, path))
        .header("place-id", "1818")
        .header("place-guid", guid)
        .header("content-type", "application/json")
        .send(body)
        .map(|response| response.status().as_u16())
}

fn wait_with_timeout(mut child: Child) -> Output {
    let deadline = Instant::now() + STARTUP_TIMEOUT;
    while child.try_wait().expect("try_wait").is_none() {
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("jlcd run did not exit");
        }
        thread::sleep(Duration::from_millis(50));
    }
    child.wait_with_output().expect("collect output")
}

#[test]
fn test_run_reports_passing_suite() {
    init_test_logging();
    crate::test_log!("TEST START: test_run_reports_passing_suite");
    let workspace = TestWorkspace::new();
    let port = free_port();
    let child = spawn_run(&workspace, port, &[]);

    let commands = poll_until_commands(port, "G1");
    assert_eq!(commands[0][0], "request_start_tests");
    assert_eq!(
        commands[0][1],
        json!(["ReplicatedStorage", "Packages", "Jest"])
    );
    assert_eq!(commands[0][2]["cwdInstance"], "game");
    assert_eq!(commands[0][2]["config"]["verbose"], true);

    // A second session is locked out.
    let intruder = ureq::get(&url(port, "/"))
        .header("place-id", "1818")
        .header("place-guid", "G2")
        .call();
    assert!(matches!(intruder, Err(ureq::Error::StatusCode(403))));

    assert_eq!(post(port, "/log", "G1", r#"["PASS math.spec"]"#).unwrap(), 200);
    let report = json!({
        "testResults": [{
            "testFilePath": "ReplicatedStorage/math.spec",
            "testResults": [
                {"fullName": "math adds", "title": "adds", "ancestorTitles": ["math"],
                 "status": "passed", "duration": 5},
                {"fullName": "math later", "title": "later", "ancestorTitles": ["math"],
                 "status": "todo"}
            ]
        }]
    });
    assert_eq!(post(port, "/results", "G1", &report.to_string()).unwrap(), 200);

    let output = wait_with_timeout(child);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "jlcd run failed: {stdout}");
    assert_contains(&stdout, "PASS math.spec");
    assert_contains(&stdout, "ReplicatedStorage/math.spec");
    assert_contains(&stdout, "✓ adds (5ms)");
    assert_contains(&stdout, "○ later");
    assert_contains(&stdout, "0 failed, 1 skipped, 1 passed, 2 total");
    crate::test_log!("TEST PASS: test_run_reports_passing_suite");
}

#[test]
fn test_run_exits_non_zero_on_failing_tests() {
    init_test_logging();
    let workspace = TestWorkspace::new();
    let port = free_port();
    let child = spawn_run(&workspace, port, &[]);

    poll_until_commands(port, "G1");
    let report = json!({
        "testResults": [{
            "testFilePath": "ReplicatedStorage/math.spec",
            "testResults": [
                {"fullName": "math breaks", "title": "breaks", "ancestorTitles": [],
                 "status": "failed", "failureMessages": ["expected 1, got 2"]}
            ]
        }]
    });
    assert_eq!(post(port, "/results", "G1", &report.to_string()).unwrap(), 200);

    let output = wait_with_timeout(child);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!output.status.success());
    assert_contains(&stdout, "✕ breaks");
    assert_contains(&stdout, "expected 1, got 2");
}

#[test]
fn test_run_surfaces_agent_failure() {
    init_test_logging();
    let workspace = TestWorkspace::new();
    let port = free_port();
    let child = spawn_run(&workspace, port, &[]);

    poll_until_commands(port, "G1");
    assert_eq!(post(port, "/fail", "G1", r#""Jest could not be required""#).unwrap(), 200);

    let output = wait_with_timeout(child);
    assert!(!output.status.success());
    assert_contains(
        &String::from_utf8_lossy(&output.stderr),
        "Something went wrong within the plugin companion (Jest could not be required).",
    );
}

#[test]
fn test_run_times_out_without_agent() {
    init_test_logging();
    let workspace = TestWorkspace::new();
    let port = free_port();
    let child = spawn_run(&workspace, port, &["--run-timeout", "300ms"]);

    let output = wait_with_timeout(child);
    assert!(!output.status.success());
    assert_contains(
        &String::from_utf8_lossy(&output.stderr),
        "Test run cancelled (timeout)",
    );
}
