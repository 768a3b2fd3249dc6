//! Integration tests for meridian-cli.
//!
//! Tests invoke the built binary and check its reports and WAV output.

use std::fs;
use std::process::Command;

/// Helper to get the path to the `meridian` binary built by cargo.
fn meridian_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_meridian"))
}

// ---------------------------------------------------------------------------
// `meridian run`
// ---------------------------------------------------------------------------

#[test]
fn cli_run_reports_meters_and_latency() {
    let output = meridian_bin()
        .args(["run", "--blocks", "20"])
        .output()
        .expect("failed to run meridian run");

    assert!(output.status.success(), "meridian run failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Rendered 20 blocks"));
    assert!(stdout.contains("Root latency: 192 samples"));
    assert!(stdout.contains("branch 0"));
    assert!(stdout.contains("branch 1"));
    assert!(stdout.contains("blocks 20"));
    assert!(stdout.contains("Average:"));
}

#[test]
fn cli_run_writes_wav() {
    let dir = tempfile::tempdir().unwrap();
    let wav = dir.path().join("out.wav");

    let output = meridian_bin()
        .args(["run", "--blocks", "8", "--block-size", "64", "--output"])
        .arg(&wav)
        .output()
        .expect("failed to run meridian run --output");
    assert!(output.status.success());

    let reader = hound::WavReader::open(&wav).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 48_000);
    assert_eq!(reader.len(), 8 * 64 * 2);
}

#[test]
fn cli_run_uses_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.toml");
    fs::write(
        &path,
        r#"
        block_size = 128
        blocks = 4

        [[branch]]
        item_id = 1
        latency_samples = 0

        [[branch]]
        item_id = 2
        latency_samples = 50

        [[branch]]
        item_id = 3
        latency_samples = 300
        "#,
    )
    .unwrap();

    let output = meridian_bin()
        .args(["run", "--config"])
        .arg(&path)
        .output()
        .expect("failed to run meridian run --config");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Rendered 4 blocks of 128 frames"));
    assert!(stdout.contains("Root latency: 300 samples"));
    assert!(stdout.contains("branch 2"));
}

#[test]
fn cli_run_rejects_bad_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "block_size = 0\n").unwrap();

    let output = meridian_bin()
        .args(["run", "--config"])
        .arg(&path)
        .output()
        .expect("failed to run meridian run");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("block_size"), "stderr: {stderr}");
}

// ---------------------------------------------------------------------------
// `meridian inspect`
// ---------------------------------------------------------------------------

#[test]
fn cli_inspect_shows_aliasing() {
    let output = meridian_bin()
        .arg("inspect")
        .output()
        .expect("failed to run meridian inspect");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("level-measurer"));
    assert!(stdout.contains("summing"));
    assert!(stdout.contains("aliased from"));
    assert!(stdout.contains("7 nodes processed"));
}

#[test]
fn cli_inspect_without_sharing_is_exclusive() {
    let output = meridian_bin()
        .args(["inspect", "--no-sharing"])
        .output()
        .expect("failed to run meridian inspect --no-sharing");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(!stdout.contains("aliased from"));
    assert!(stdout.contains("7 buffer slots"));
}

// ---------------------------------------------------------------------------
// `meridian cpu`
// ---------------------------------------------------------------------------

#[test]
fn cli_cpu_reports_counter() {
    let output = meridian_bin()
        .args(["cpu", "--iterations", "100"])
        .output()
        .expect("failed to run meridian cpu");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Cycle counter:"));
}
