//! Integration tests for the `stockpulse` binary.
//!
//! Each test gets its own config directory, so nothing touches the
//! user's real configuration and no reader or PLC is needed.
#![allow(clippy::unwrap_used)]

use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;

// ── Helpers ─────────────────────────────────────────────────────────

fn stockpulse_cmd(home: &Path) -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("stockpulse");
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("STOCKPULSE_CONFIG");
    cmd
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    std::fs::write(
        dir.join("catalog.toml"),
        r#"
        [[products]]
        id = 7
        name = "Pallet wrap"
        category_id = 1
        quantity = 12
        rfid_tag = "T1"
        "#,
    )
    .unwrap();
    let path = dir.join("stockpulse.toml");
    std::fs::write(&path, body).unwrap();
    path
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn no_args_shows_help() {
    let home = tempfile::tempdir().unwrap();
    let output = stockpulse_cmd(home.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}

#[test]
fn help_lists_commands() {
    let home = tempfile::tempdir().unwrap();
    stockpulse_cmd(home.path()).arg("--help").assert().success().stdout(
        predicate::str::contains("run")
            .and(predicate::str::contains("simulate"))
            .and(predicate::str::contains("config")),
    );
}

// ── simulate ────────────────────────────────────────────────────────

#[test]
fn simulate_reports_known_and_unknown_tags_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "catalog = \"catalog.toml\"\n");

    let output = stockpulse_cmd(dir.path())
        .args(["--config", config.to_str().unwrap()])
        .args(["simulate", "entrance", "T1", "ZZ", "--output", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["processed"], 1);
    assert_eq!(value["unknown_tags"], serde_json::json!(["ZZ"]));
    assert_eq!(value["items"][0]["name"], "Pallet wrap");
}

#[test]
fn simulate_table_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "catalog = \"catalog.toml\"\n");

    stockpulse_cmd(dir.path())
        .args(["--config", config.to_str().unwrap(), "simulate", "dock", "T1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Pallet wrap").and(predicate::str::contains("1 tag(s)")));
}

#[test]
fn simulate_requires_tags() {
    let home = tempfile::tempdir().unwrap();
    stockpulse_cmd(home.path())
        .args(["simulate", "dock"])
        .assert()
        .code(2);
}

// ── config ──────────────────────────────────────────────────────────

#[test]
fn config_path_honours_flag() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.toml");
    stockpulse_cmd(dir.path())
        .args(["--config", path.to_str().unwrap(), "config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn config_show_masks_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
        [readers.dock]
        url = "ws://dock.local/events"
        api_key = "very-secret-token"
        "#,
    );

    stockpulse_cmd(dir.path())
        .args(["--config", config.to_str().unwrap(), "config", "show"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("ws://dock.local/events")
                .and(predicate::str::contains("very-secret-token").not()),
        );
}

#[test]
fn config_validate_summarises() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
        catalog = "catalog.toml"

        [readers.dock]
        url = "ws://dock.local/events"

        [plc]
        url = "sim://local"
        "#,
    );

    stockpulse_cmd(dir.path())
        .args(["--config", config.to_str().unwrap(), "config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "config OK: 1 reader(s), 1 product(s), PLC: sim://local",
        ));
}

#[test]
fn invalid_config_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
        [readers.dock]
        url = "ftp://dock.local/scans"
        "#,
    );

    stockpulse_cmd(dir.path())
        .args(["--config", config.to_str().unwrap(), "config", "validate"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Configuration is invalid"));
}

#[test]
fn run_without_readers_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "catalog = \"catalog.toml\"\n");

    stockpulse_cmd(dir.path())
        .args(["--config", config.to_str().unwrap(), "run"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No readers configured"));
}
