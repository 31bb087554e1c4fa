//! E2E tests for `pixconv convert` and `pixconv inspect`.
//!
//! Each test runs the binary as a subprocess against hit tables written
//! into an isolated temp directory.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

fn pixconv(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("pixconv"));
    cmd.current_dir(dir);
    // Keep stderr limited to error reports.
    cmd.env("PIXCONV_LOG", "error");
    cmd.env_remove("PIXCONV_FORMAT");
    // Isolate from any real user settings file.
    cmd.env("XDG_CONFIG_HOME", dir.join("xdg"));
    cmd.env("HOME", dir);
    cmd
}

/// One chunk line holding `(event_id, trigger_timestamp, column, row)` rows.
fn chunk(rows: &[(i64, u32, u8, u16)]) -> String {
    json!({
        "n_entries": rows.len(),
        "event_id": rows.iter().map(|r| r.0).collect::<Vec<_>>(),
        "trigger_timestamp": rows.iter().map(|r| r.1).collect::<Vec<_>>(),
        "column": rows.iter().map(|r| r.2).collect::<Vec<_>>(),
        "row": rows.iter().map(|r| r.3).collect::<Vec<_>>(),
    })
    .to_string()
}

fn write_table(dir: &Path, name: &str, chunks: &[&[(i64, u32, u8, u16)]]) -> PathBuf {
    let path = dir.join(name);
    let body: Vec<String> = chunks.iter().map(|rows| chunk(rows)).collect();
    std::fs::write(&path, body.join("\n") + "\n").expect("write table");
    path
}

const PLANE0: &[(i64, u32, u8, u16)] = &[
    (0, 100, 1, 1),
    (0, 100, 2, 2),
    (1, 200, 0, 0),
    (2, 300, 5, 7),
    (3, 400, 80, 336),
];

fn run_json(cmd: &mut Command) -> Value {
    let output = cmd.arg("--json").output().expect("run pixconv");
    assert!(
        output.status.success(),
        "pixconv failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn author_then_verify_second_plane() {
    let tmp = TempDir::new().expect("tempdir");
    let a = write_table(tmp.path(), "plane0.jsonl", &[PLANE0]);
    let b = write_table(tmp.path(), "plane1.jsonl", &[&PLANE0[..3], &PLANE0[3..]]);
    let store = tmp.path().join("store");

    let report = run_json(pixconv(tmp.path()).args(["convert", "-i"]).arg(&a).arg("-o").arg(&store));
    assert_eq!(report["role"], "author");
    assert_eq!(report["events"], 4);
    assert_eq!(report["hits"], 4);
    assert_eq!(report["ignored_rows"], 1);

    let report = run_json(
        pixconv(tmp.path())
            .args(["convert", "--plane", "Plane1", "--mode", "append", "--verify", "--check-timestamp", "-i"])
            .arg(&b)
            .arg("-o")
            .arg(&store),
    );
    assert_eq!(report["role"], "verify");
    assert_eq!(report["events"], 4);
    assert_eq!(report["chunks"], 2);

    assert!(store.join("events.jsonl").is_file());
    assert!(store.join("Plane0/hits.jsonl").is_file());
    assert!(store.join("Plane1/hits.jsonl").is_file());
}

#[test]
fn text_output_is_one_line() {
    let tmp = TempDir::new().expect("tempdir");
    let a = write_table(tmp.path(), "plane0.jsonl", &[PLANE0]);
    pixconv(tmp.path())
        .args(["convert", "-i"])
        .arg(&a)
        .args(["-o", "store"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("role=author plane=Plane0 events=4 hits=4"));
}

#[test]
fn quiet_suppresses_summary() {
    let tmp = TempDir::new().expect("tempdir");
    let a = write_table(tmp.path(), "plane0.jsonl", &[PLANE0]);
    pixconv(tmp.path())
        .args(["-q", "convert", "-i"])
        .arg(&a)
        .args(["-o", "store"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn max_events_caps_output() {
    let tmp = TempDir::new().expect("tempdir");
    let a = write_table(tmp.path(), "plane0.jsonl", &[PLANE0]);
    let report = run_json(
        pixconv(tmp.path())
            .args(["convert", "--max-events", "2", "-o", "store", "-i"])
            .arg(&a),
    );
    assert_eq!(report["events"], 2);
    assert_eq!(report["stopped_by_cap"], true);
}

#[test]
fn out_of_range_hit_exits_with_code_and_position() {
    let tmp = TempDir::new().expect("tempdir");
    let a = write_table(tmp.path(), "bad.jsonl", &[&[(0, 1, 1, 1)], &[(1, 2, 81, 4)]]);
    pixconv(tmp.path())
        .args(["convert", "-o", "store", "-i"])
        .arg(&a)
        .assert()
        .failure()
        .stderr(predicate::str::contains("error[E2005]"))
        .stderr(predicate::str::contains("at chunk 2 index 0"))
        .stderr(predicate::str::contains("hint:"));
}

#[test]
fn json_errors_are_structured() {
    let tmp = TempDir::new().expect("tempdir");
    let a = write_table(tmp.path(), "plane0.jsonl", &[PLANE0]);
    let output = pixconv(tmp.path())
        .args(["--json", "convert", "--verify", "-o", "store", "-i"])
        .arg(&a)
        .output()
        .expect("run pixconv");
    assert!(!output.status.success());
    let err: Value = serde_json::from_slice(&output.stderr).expect("JSON error");
    assert_eq!(err["error"]["error_code"], "E3002");
}

#[test]
fn append_to_missing_store_fails() {
    let tmp = TempDir::new().expect("tempdir");
    let a = write_table(tmp.path(), "plane0.jsonl", &[PLANE0]);
    pixconv(tmp.path())
        .args(["convert", "--mode", "append", "-o", "nowhere", "-i"])
        .arg(&a)
        .assert()
        .failure()
        .stderr(predicate::str::contains("E3005"));
    assert!(!tmp.path().join("nowhere").exists());
}

#[test]
fn config_file_supplies_settings() {
    let tmp = TempDir::new().expect("tempdir");
    let a = write_table(tmp.path(), "plane0.jsonl", &[PLANE0]);
    let config = tmp.path().join("pixconv.toml");
    std::fs::write(
        &config,
        format!(
            "input = {:?}\noutput = \"store\"\nplane = \"Telescope0\"\nmax_events = 3\n",
            a.display().to_string()
        ),
    )
    .expect("write config");

    let report = run_json(pixconv(tmp.path()).args(["convert", "--max-events", "1", "--config"]).arg(&config));
    assert_eq!(report["plane"], "Telescope0");
    // The flag overrides the file.
    assert_eq!(report["events"], 1);
    assert!(tmp.path().join("store/Telescope0/hits.jsonl").is_file());
}

#[test]
fn invalid_plane_name_is_rejected() {
    let tmp = TempDir::new().expect("tempdir");
    let a = write_table(tmp.path(), "plane0.jsonl", &[PLANE0]);
    pixconv(tmp.path())
        .args(["convert", "--plane", "a/b", "-o", "store", "-i"])
        .arg(&a)
        .assert()
        .failure()
        .stderr(predicate::str::contains("E1001"));
}

#[test]
fn unordered_events_need_opt_in() {
    let tmp = TempDir::new().expect("tempdir");
    let a = write_table(tmp.path(), "plane0.jsonl", &[&[(3, 1, 1, 1), (1, 2, 1, 1)]]);
    pixconv(tmp.path())
        .args(["inspect"])
        .arg(&a)
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2006"));

    let report = run_json(pixconv(tmp.path()).args(["inspect", "--allow-unordered"]).arg(&a));
    assert_eq!(report["events"], 2);
}

#[test]
fn flags_undo_config_file_switches() {
    let tmp = TempDir::new().expect("tempdir");
    let a = write_table(tmp.path(), "plane0.jsonl", &[&[(3, 1, 1, 1), (1, 2, 1, 1)]]);
    let config = tmp.path().join("pixconv.toml");
    std::fs::write(&config, "require_monotonic = false\nauthor_mode = false\n").expect("write config");

    pixconv(tmp.path())
        .args(["convert", "--author", "--require-monotonic", "-o", "store", "--config"])
        .arg(&config)
        .arg("-i")
        .arg(&a)
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2006"));

    let report = run_json(
        pixconv(tmp.path())
            .args(["convert", "--author", "-o", "relaxed", "--config"])
            .arg(&config)
            .arg("-i")
            .arg(&a),
    );
    assert_eq!(report["role"], "author");
    assert_eq!(report["events"], 2);
}

#[test]
fn inspect_reports_counts_and_writes_nothing() {
    let tmp = TempDir::new().expect("tempdir");
    let a = write_table(tmp.path(), "plane0.jsonl", &[&PLANE0[..2], &PLANE0[2..]]);
    let report = run_json(pixconv(tmp.path()).arg("inspect").arg(&a));
    assert_eq!(report["events"], 4);
    assert_eq!(report["rows"], 5);
    assert_eq!(report["chunks"], 2);
    assert!(!tmp.path().join("store").exists());
}

#[test]
fn completions_generate_script() {
    let tmp = TempDir::new().expect("tempdir");
    pixconv(tmp.path())
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pixconv"));
}
