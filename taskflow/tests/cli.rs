//! CLI tests for `taskflow`.
//!
//! Spawns the binary in a scratch directory and checks exit codes and the
//! files a run leaves behind.

use std::fs;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use wait_timeout::ChildExt;

use taskflow::exit_codes;

const PROTOCOL: &str = r#"{
    "name": "session", "kind": "structural",
    "children": [
        { "name": "trials", "kind": "structural",
          "repeat": { "count": 2, "output": "trials", "columns": ["rt"] },
          "children": [
            { "name": "respond", "kind": "interactive", "timer": { "seconds": 0.05 },
              "behavior": { "type": "record_elapsed", "key": "rt" } }
          ] }
    ]
}"#;

fn taskflow(dir: &Path, args: &[&str]) -> ExitStatus {
    let mut child = Command::new(env!("CARGO_BIN_EXE_taskflow"))
        .current_dir(dir)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn taskflow");
    match child.wait_timeout(Duration::from_secs(30)).expect("wait") {
        Some(status) => status,
        None => {
            child.kill().expect("kill");
            panic!("taskflow {args:?} timed out");
        }
    }
}

#[test]
fn init_writes_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");

    assert_eq!(taskflow(temp.path(), &["init"]).code(), Some(exit_codes::OK));
    assert!(temp.path().join("taskflow.toml").exists());
    assert_eq!(
        taskflow(temp.path(), &["init"]).code(),
        Some(exit_codes::INVALID)
    );
    assert_eq!(
        taskflow(temp.path(), &["init", "--force"]).code(),
        Some(exit_codes::OK)
    );
}

#[test]
fn validate_reports_invalid_documents() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("good.json"), PROTOCOL).expect("write good");
    fs::write(
        temp.path().join("bad.json"),
        r#"{ "name": "root", "navigable": true, "repeat": { "count": 1 } }"#,
    )
    .expect("write bad");

    assert_eq!(
        taskflow(temp.path(), &["validate", "good.json"]).code(),
        Some(exit_codes::OK)
    );
    assert_eq!(
        taskflow(temp.path(), &["validate", "bad.json"]).code(),
        Some(exit_codes::INVALID)
    );
}

#[test]
fn run_completes_and_writes_dataset() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("protocol.json"), PROTOCOL).expect("write protocol");
    fs::write(temp.path().join("taskflow.toml"), "tick_ms = 10\n").expect("write config");

    let status = taskflow(temp.path(), &["run", "protocol.json"]);

    assert_eq!(status.code(), Some(exit_codes::OK));
    let dataset = fs::read_to_string(temp.path().join("output").join("trials.csv")).expect("read");
    let lines: Vec<&str> = dataset.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "rt");
}

#[test]
fn run_without_input_stalls_at_tick_limit() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("protocol.json"),
        r#"{ "name": "wait", "kind": "interactive" }"#,
    )
    .expect("write protocol");

    let status = taskflow(temp.path(), &["run", "protocol.json", "--max-ticks", "5"]);

    assert_eq!(status.code(), Some(exit_codes::STALLED));
}

#[test]
fn run_with_scripted_events_confirms_waiting_task() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("protocol.json"),
        r#"{ "name": "wait", "kind": "interactive" }"#,
    )
    .expect("write protocol");
    fs::write(
        temp.path().join("events.json"),
        r#"[ { "at_seconds": 0.1, "binding": "confirm" } ]"#,
    )
    .expect("write events");

    let status = taskflow(
        temp.path(),
        &["run", "protocol.json", "--events", "events.json", "--max-ticks", "100"],
    );

    assert_eq!(status.code(), Some(exit_codes::OK));
}

#[test]
fn run_rejects_invalid_document_before_starting() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("protocol.json"),
        r#"{ "name": "block", "kind": "structural", "repeat": { "count": 1, "columns": ["a", "a"] } }"#,
    )
    .expect("write protocol");

    let status = taskflow(temp.path(), &["run", "protocol.json"]);

    assert_eq!(status.code(), Some(exit_codes::INVALID));
    assert!(!temp.path().join("output").exists());
}
