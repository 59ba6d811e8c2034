//! Integration tests for the `rustlink` CLI binary.
//!
//! These cover argument parsing, help output, shell completions, offline
//! push classification and error handling. None of them need a game server.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `rustlink` binary with env isolation.
///
/// Clears all `RUSTLINK_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn rustlink_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("rustlink");
    cmd.env("HOME", "/tmp/rustlink-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/rustlink-cli-test-nonexistent")
        .env("XDG_DATA_HOME", "/tmp/rustlink-cli-test-nonexistent")
        .env_remove("RUSTLINK_PROFILE")
        .env_remove("RUSTLINK_OUTPUT")
        .env_remove("RUSTLINK_CONFIG")
        .env_remove("RUSTLINK_DATA_DIR")
        .env_remove("RUST_LOG");
    cmd
}

/// Same as [`rustlink_cmd`] but with config and state inside `dir`.
fn sandboxed_cmd(dir: &Path) -> assert_cmd::Command {
    let mut cmd = rustlink_cmd();
    cmd.env("RUSTLINK_CONFIG", dir.join("config.toml"))
        .env("RUSTLINK_DATA_DIR", dir.join("data"));
    cmd
}

fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

const DEATH_ENVELOPE: &str = r#"{
    "persistentId": "0:1700000000000%abc",
    "sent": "1700000000000",
    "appData": [
        {"key": "channelId", "value": "1003"},
        {"key": "body", "value": "Bob was killed by Alice with Rifle"}
    ]
}"#;

fn write_envelope(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("envelope.json");
    std::fs::write(&path, DEATH_ENVELOPE).unwrap();
    path
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = rustlink_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    rustlink_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("Rust+")
            .and(predicate::str::contains("server"))
            .and(predicate::str::contains("entity"))
            .and(predicate::str::contains("push")),
    );
}

#[test]
fn test_version_flag() {
    rustlink_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rustlink"));
}

#[test]
fn test_invalid_subcommand() {
    rustlink_cmd()
        .arg("teleport")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_entity_set_rejects_unknown_state() {
    rustlink_cmd()
        .args(["entity", "set", "12", "maybe"])
        .assert()
        .failure()
        .code(2);
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    rustlink_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    rustlink_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rustlink"));
}

// ── Profiles ────────────────────────────────────────────────────────

#[test]
fn test_server_info_without_profile() {
    let dir = tempfile::tempdir().unwrap();
    let output = sandboxed_cmd(dir.path())
        .args(["server", "info"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    let text = combined_output(&output);
    assert!(text.contains("Profile 'default' not found"), "{text}");
}

#[test]
fn test_entity_list_reads_local_state() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "default_profile = \"home\"\n\n[profiles.home]\nhost = \"10.0.0.5\"\nplayer_id = \"76561198000000000\"\n",
    )
    .unwrap();

    sandboxed_cmd(dir.path())
        .args(["entity", "list", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_config_show_defaults() {
    let dir = tempfile::tempdir().unwrap();
    sandboxed_cmd(dir.path())
        .args(["config", "show", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"reconnect_attempts\": 5"));
}

#[test]
fn test_config_output_default_applies_without_flag() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "[defaults]\noutput = \"json\"\n",
    )
    .unwrap();

    sandboxed_cmd(dir.path())
        .args(["push", "ledger"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"high_water_mark\": null"));

    sandboxed_cmd(dir.path())
        .args(["push", "ledger", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::contains("High-water mark"));
}

// ── Push classification ─────────────────────────────────────────────

#[test]
fn test_push_classify_death() {
    let dir = tempfile::tempdir().unwrap();
    let envelope = write_envelope(dir.path());

    sandboxed_cmd(dir.path())
        .args(["push", "classify", "--no-dedup", "-o", "json"])
        .arg(&envelope)
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"type\": \"player_death_reported\"")
                .and(predicate::str::contains("\"name\": \"Bob\""))
                .and(predicate::str::contains("\"killer\": \"Alice\"")),
        );
}

#[test]
fn test_push_classify_from_stdin() {
    let dir = tempfile::tempdir().unwrap();
    sandboxed_cmd(dir.path())
        .args(["push", "classify", "--no-dedup", "-o", "json-compact"])
        .write_stdin(DEATH_ENVELOPE)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"weapon\":\"Rifle\""));
}

#[test]
fn test_push_classify_skips_replay() {
    let dir = tempfile::tempdir().unwrap();
    let envelope = write_envelope(dir.path());

    sandboxed_cmd(dir.path())
        .args(["push", "classify", "-o", "json"])
        .arg(&envelope)
        .assert()
        .success()
        .stdout(predicate::str::contains("player_death_reported"));

    sandboxed_cmd(dir.path())
        .args(["push", "classify", "-o", "json"])
        .arg(&envelope)
        .assert()
        .success()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("skipped"));

    sandboxed_cmd(dir.path())
        .args(["push", "ledger", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1700000000000"));
}

#[test]
fn test_push_classify_rejects_bad_json() {
    let dir = tempfile::tempdir().unwrap();
    sandboxed_cmd(dir.path())
        .args(["push", "classify", "--no-dedup"])
        .write_stdin("not json")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Invalid JSON payload"));
}

#[test]
fn test_push_listen_reads_lines() {
    let dir = tempfile::tempdir().unwrap();
    let compact: String = DEATH_ENVELOPE.split_whitespace().collect::<Vec<_>>().join(" ");
    let input = format!(
        "{compact}\n\n{{\"persistentId\":\"2\",\"sent\":\"1700000000500\",\"appData\":[{{\"key\":\"title\",\"value\":\"Wipe\"}},{{\"key\":\"message\",\"value\":\"tonight\"}}]}}\n"
    );

    sandboxed_cmd(dir.path())
        .args(["push", "listen", "--color", "never"])
        .write_stdin(input)
        .assert()
        .success()
        .stdout(predicate::str::contains("[player_death_reported]"))
        .stderr(predicate::str::contains("2 notification(s) classified"));
}
