use odin_runes::runes::journal::{Journal, Role, USER_MARKER};
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const SCRUBBED_VARS: &[&str] = &[
    "ODIN_RUNES_CONFIG_PATH",
    "ODIN_RUNES_CONTEXT_PATH",
    "ODIN_RUNES_PROVIDER",
    "ODIN_RUNES_TEMPERATURE",
    "ODIN_RUNES_MODEL",
    "ODIN_RUNES_BACKEND_URI",
    "ODIN_RUNES_FLUSH_CHARS",
    "ODIN_RUNES_STREAM_TIMEOUT_SECS",
    "OPENAI_API_KEY_ODIN_FIRST",
    "VERTEXAI_API_ENDPOINT",
    "VERTEXAI_PROJECT_ID",
    "VERTEXAI_MODEL_ID",
    "GCLOUD_VERTEX_AI_ACCESS_TOKEN",
];

fn runes_cmd(root: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("odin-runes");
    cmd.current_dir(root).env("ODIN_RUNES_HOME", root.join("home"));
    for var in SCRUBBED_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn init_then_turns_reports_pending_prompt() {
    let tmp = tempdir().expect("tempdir");
    let journal = tmp.path().join("chats").join("OdinSays.txt");

    runes_cmd(tmp.path())
        .arg("init")
        .arg(&journal)
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote greeting"));

    runes_cmd(tmp.path())
        .arg("init")
        .arg(&journal)
        .assert()
        .success()
        .stdout(predicate::str::contains("already initialized"));

    runes_cmd(tmp.path())
        .arg("turns")
        .arg(&journal)
        .assert()
        .success()
        .stdout(predicate::str::contains("turns=0"))
        .stdout(predicate::str::contains("pending_prompt=no"));

    let raw = fs::read_to_string(&journal).expect("read journal");
    assert!(raw.ends_with(&format!("{USER_MARKER}\n")));
    fs::write(&journal, format!("{raw}What is a rune?\n")).expect("append prompt");

    runes_cmd(tmp.path())
        .arg("turns")
        .arg(&journal)
        .assert()
        .success()
        .stdout(predicate::str::contains("[0] prompt: What is a rune?"))
        .stdout(predicate::str::contains("pending_prompt=yes"));
}

#[test]
fn unconfigured_provider_is_journaled_as_error_turn() {
    let tmp = tempdir().expect("tempdir");
    let journal = tmp.path().join("OdinSays.txt");

    runes_cmd(tmp.path()).arg("init").arg(&journal).assert().success();
    let raw = fs::read_to_string(&journal).expect("read journal");
    fs::write(&journal, format!("{raw}hello there\n")).expect("append prompt");

    runes_cmd(tmp.path())
        .args(["chat", "--provider", "ollama"])
        .arg(&journal)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("E001_CONFIG_MISSING"));

    let raw = fs::read_to_string(&journal).expect("read journal");
    assert!(raw.contains("An error occurred: backend_uri is not set."));
    assert!(raw.ends_with(&format!("{USER_MARKER}\n")));

    let transcript = Journal::new(&journal).read_transcript().expect("parse");
    assert_eq!(transcript.turns.len(), 1);
    assert_eq!(transcript.turns[0].role, Role::User);
    assert_eq!(transcript.turns[0].content, "hello there");

    // Nothing new to send, so nothing is written.
    runes_cmd(tmp.path())
        .args(["chat", "--provider", "ollama"])
        .arg(&journal)
        .assert()
        .success()
        .stdout(predicate::str::contains("no new prompt"));
    assert_eq!(fs::read_to_string(&journal).expect("read journal"), raw);
}

#[test]
fn foreign_files_are_refused() {
    let tmp = tempdir().expect("tempdir");
    let notes = tmp.path().join("notes.txt");
    fs::write(&notes, "shopping list\n").expect("write notes");

    runes_cmd(tmp.path())
        .arg("turns")
        .arg(&notes)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("is not an odin-runes journal"));

    runes_cmd(tmp.path())
        .arg("init")
        .arg(&notes)
        .assert()
        .code(2);

    runes_cmd(tmp.path())
        .args(["chat", "--provider", "ollama"])
        .arg(tmp.path().join("missing.txt"))
        .assert()
        .code(2)
        .stdout(predicate::str::contains("does not exist"));
}

#[test]
fn json_report_is_machine_readable() {
    let tmp = tempdir().expect("tempdir");
    let journal = tmp.path().join("OdinSays.txt");

    let output = runes_cmd(tmp.path())
        .arg("--json")
        .arg("init")
        .arg(&journal)
        .output()
        .expect("run init");
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json report");
    assert_eq!(report["command"], "init");
    assert_eq!(report["ok"], true);
    assert!(report["issues"].as_array().expect("issues").is_empty());
}

#[test]
fn unknown_provider_is_rejected_before_any_write() {
    let tmp = tempdir().expect("tempdir");
    let journal = tmp.path().join("OdinSays.txt");
    runes_cmd(tmp.path()).arg("init").arg(&journal).assert().success();
    let before = fs::read_to_string(&journal).expect("read journal");

    runes_cmd(tmp.path())
        .args(["chat", "--provider", "mystery"])
        .arg(&journal)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown provider"));
    assert_eq!(fs::read_to_string(&journal).expect("read journal"), before);
}
