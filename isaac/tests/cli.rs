//! End-to-end tests of the `isaac` binary.
//!
//! Each run gets an empty environment, HOME and working directory so no
//! user or project config leaks in. With no terminal attached every prompt
//! is refused, so gated commands must never run.

use std::path::Path;
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn run_isaac(dir: &Path, args: &[&str], env: &[(&str, &str)]) -> (i32, String, String) {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_isaac"));
    cmd.env_clear()
        .env("PATH", std::env::var("PATH").unwrap_or_default())
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .current_dir(dir)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (k, v) in env {
        cmd.env(k, v);
    }
    let output = cmd.output().expect("failed to run isaac");
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

#[test]
fn test_classify_reports_tier() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run_isaac(dir.path(), &["classify", "RM", "-rf", "build"], &[]);
    assert_eq!(code, 0);
    assert!(stdout.starts_with("rm: tier 4 (lockdown"), "stdout: {stdout}");
}

#[test]
fn test_classify_json() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run_isaac(dir.path(), &["classify", "--json", "zzunknown"], &[]);
    assert_eq!(code, 0);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["name"], "zzunknown");
    assert_eq!(value["source"], "default");
}

#[cfg(unix)]
#[test]
fn test_run_instant_command() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run_isaac(dir.path(), &["--shell", "sh", "run", "echo", "hi"], &[]);
    assert_eq!(code, 0);
    assert_eq!(stdout, "hi\n");
}

#[cfg(unix)]
#[test]
fn test_run_lockdown_is_blocked() {
    let dir = TempDir::new().unwrap();
    let victim = dir.path().join("victim");
    std::fs::create_dir(&victim).unwrap();
    let target = victim.to_string_lossy().to_string();

    let (code, stdout, stderr) = run_isaac(
        dir.path(),
        &["--shell", "sh", "run", "rm", "-rf", &target],
        &[],
    );
    assert_ne!(code, 0);
    assert!(stdout.is_empty());
    assert!(stderr.contains("isaac:"), "stderr: {stderr}");
    assert!(victim.exists());
}

#[cfg(unix)]
#[test]
fn test_run_without_terminal_declines_prompted_tier() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a"), "data").unwrap();
    let (code, _, _) = run_isaac(dir.path(), &["--shell", "sh", "run", "cp", "a", "b"], &[]);
    assert_ne!(code, 0);
    assert!(!dir.path().join("b").exists());
}

#[cfg(unix)]
#[test]
fn test_session_log_written() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("session.jsonl");
    let log_arg = log.to_string_lossy().to_string();
    let (code, _, _) = run_isaac(
        dir.path(),
        &["--shell", "sh", "--session-log", &log_arg, "run", "echo", "logged"],
        &[],
    );
    assert_eq!(code, 0);
    let content = std::fs::read_to_string(&log).unwrap();
    assert_eq!(content.lines().count(), 1);
    assert!(content.contains("echo logged"));
}

#[test]
fn test_config_validate_defaults() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run_isaac(dir.path(), &["config", "validate"], &[]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Configuration OK"));
}

#[test]
fn test_config_sources_name_environment() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run_isaac(
        dir.path(),
        &["config", "show", "--sources"],
        &[("ISAAC_SHELL", "zsh")],
    );
    assert_eq!(code, 0);
    let line = stdout
        .lines()
        .find(|l| l.starts_with("general.shell ="))
        .unwrap();
    assert!(line.contains("\"zsh\""));
    assert!(line.contains("ISAAC_SHELL"));
}

#[test]
fn test_project_config_applies() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join(".isaac")).unwrap();
    std::fs::write(
        dir.path().join(".isaac/config.toml"),
        "[tier_overrides]\nls = \"3\"\n",
    )
    .unwrap();
    let (code, stdout, _) = run_isaac(dir.path(), &["classify", "ls"], &[]);
    assert_eq!(code, 0);
    assert!(stdout.contains("tier 3"), "stdout: {stdout}");
}

#[cfg(unix)]
#[test]
fn test_project_config_cannot_unlock_rm() {
    let dir = TempDir::new().unwrap();
    std::fs::create_dir(dir.path().join(".isaac")).unwrap();
    std::fs::write(
        dir.path().join(".isaac/config.toml"),
        "[gate]\nlockdown_override = true\n[tier_overrides]\nrm = \"1\"\n",
    )
    .unwrap();
    let victim = dir.path().join("victim");
    std::fs::create_dir(&victim).unwrap();
    let target = victim.to_string_lossy().to_string();

    let (code, _, stderr) = run_isaac(
        dir.path(),
        &["--shell", "sh", "run", "rm", "-rf", &target],
        &[],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("ISAAC-E005"), "stderr: {stderr}");
    assert!(victim.exists());

    let (code, stdout, _) = run_isaac(dir.path(), &["config", "validate"], &[]);
    assert_ne!(code, 0);
    assert!(stdout.contains("tier_overrides.rm"), "stdout: {stdout}");
    assert!(stdout.contains("gate.lockdown_override"), "stdout: {stdout}");
}

#[test]
fn test_invalid_config_fails() {
    let dir = TempDir::new().unwrap();
    let bad = dir.path().join("bad.toml");
    std::fs::write(&bad, "[general\nshell = ").unwrap();
    let bad_arg = bad.to_string_lossy().to_string();
    let (code, _, _) = run_isaac(dir.path(), &["--config", &bad_arg, "config", "show"], &[]);
    assert_ne!(code, 0);

    let (code, _, _) = run_isaac(
        dir.path(),
        &["classify", "ls"],
        &[("ISAAC_UNKNOWN_TIER", "banana")],
    );
    assert_ne!(code, 0);
}

#[test]
fn test_config_example_parses() {
    let dir = TempDir::new().unwrap();
    let (code, stdout, _) = run_isaac(dir.path(), &["config", "example"], &[]);
    assert_eq!(code, 0);
    assert!(toml::from_str::<toml::Value>(&stdout).is_ok());
}
