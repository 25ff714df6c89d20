//! Integration tests for the hwspoof binary

use std::process::Command;

/// Helper to run hwspoof with no inherited configuration
fn hwspoof(args: &[&str]) -> std::process::Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_hwspoof"));
    for var in hwspoof_config::CONFIG_VARS {
        cmd.env_remove(var);
    }
    cmd.args(args).output().expect("Failed to execute hwspoof")
}

#[test]
fn test_preview_cpuinfo() {
    let output = hwspoof(&["preview", "cpuinfo"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().filter(|l| l.starts_with("processor")).count(), 16);
    assert!(stdout.contains("AMD Ryzen Threadripper 1900X 8-Core Processor"));
}

#[test]
fn test_preview_is_deterministic_per_seed() {
    let a = hwspoof(&["preview", "cpuinfo", "--seed", "42"]);
    let b = hwspoof(&["preview", "cpuinfo", "--seed", "42"]);
    assert_eq!(a.stdout, b.stdout);
}

#[test]
fn test_preview_online_mask() {
    let output = hwspoof(&["preview", "online"]);
    assert!(output.status.success());
    assert_eq!(output.stdout, b"0-15\n");
}

#[test]
fn test_config_json_reflects_env() {
    let output = Command::new(env!("CARGO_BIN_EXE_hwspoof"))
        .args(["config", "--json"])
        .env("SPOOF_DDR", "off")
        .env("SPOOF_LOG", "1")
        .output()
        .expect("Failed to execute hwspoof");
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["ddr"], false);
    assert_eq!(json["log"], true);
    assert_eq!(json["cpu"], true);
}

#[test]
fn test_config_profile_file() {
    let dir = tempfile::tempdir().unwrap();
    let profile = dir.path().join("profile.toml");
    std::fs::write(&profile, "pcie = false\ncloak = false\n").unwrap();

    let output = hwspoof(&["config", "--profile", profile.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("pcie = false"));
    assert!(stdout.contains("cloak = false"));
    assert!(stdout.contains("cpu = true"));
}

#[test]
fn test_config_bad_profile_fails() {
    let dir = tempfile::tempdir().unwrap();
    let profile = dir.path().join("profile.toml");
    std::fs::write(&profile, "cpu = [").unwrap();

    let output = hwspoof(&["config", "--profile", profile.to_str().unwrap()]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to load profile"));
}

#[test]
fn test_run_with_missing_library_fails() {
    let output = hwspoof(&["run", "--library", "/nonexistent/lib.so", "--", "true"]);
    assert!(!output.status.success());
}
