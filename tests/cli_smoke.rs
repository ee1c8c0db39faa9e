//! CLI startup smoke tests.
//!
//! Verifies that the binary parses its arguments and fails cleanly without a
//! config. Uses `std::process::Command` against the compiled binary.

use std::process::Command;

fn boardwatch_bin() -> std::path::PathBuf {
    env!("CARGO_BIN_EXE_boardwatch").into()
}

#[test]
fn help_exits_zero() {
    let output = Command::new(boardwatch_bin())
        .arg("--help")
        .output()
        .expect("failed to run boardwatch --help");

    assert!(
        output.status.success(),
        "boardwatch --help failed:\nstdout: {}\nstderr: {}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("boardwatch"), "help output should mention 'boardwatch': {stdout}");
    assert!(stdout.contains("run"), "help output should list 'run': {stdout}");
    assert!(stdout.contains("projects"), "help output should list 'projects': {stdout}");
}

#[test]
fn version_exits_zero() {
    let output = Command::new(boardwatch_bin())
        .arg("--version")
        .output()
        .expect("failed to run boardwatch --version");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.contains("boardwatch"),
        "version output should mention 'boardwatch': {stdout}"
    );
}

#[test]
fn run_help_exits_zero() {
    let output = Command::new(boardwatch_bin())
        .args(["run", "--help"])
        .output()
        .expect("failed to run boardwatch run --help");

    assert!(
        output.status.success(),
        "boardwatch run --help failed:\nstderr: {}",
        String::from_utf8_lossy(&output.stderr),
    );
}

#[test]
fn missing_config_exits_nonzero_with_hint() {
    let dir = tempfile::TempDir::new().unwrap();

    let output = Command::new(boardwatch_bin())
        .arg("--config")
        .arg(dir.path().join("boardwatch.toml"))
        .arg("run")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run boardwatch run");

    assert!(!output.status.success(), "run without a config should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No config found"), "stderr: {stderr}");
}

#[test]
fn invalid_config_exits_nonzero() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("boardwatch.toml");
    std::fs::write(&path, "poll_interval_secs = \"fast\"\n").unwrap();

    let output = Command::new(boardwatch_bin())
        .arg("-c")
        .arg(&path)
        .arg("projects")
        .output()
        .expect("failed to run boardwatch projects");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to parse"), "stderr: {stderr}");
}

#[test]
fn unknown_subcommand_exits_nonzero() {
    let output = Command::new(boardwatch_bin())
        .arg("nonexistent-subcommand")
        .output()
        .expect("failed to run boardwatch with unknown subcommand");

    assert!(
        !output.status.success(),
        "unknown subcommand should fail, but it succeeded"
    );
}
