use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn leash(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("leash").unwrap();
    cmd.current_dir(dir.path()).env("LEASH_ROOT", dir.path());
    cmd
}

fn init_control_dir(dir: &TempDir) {
    leash(dir).arg("init").assert().success();
}

// ---------------------------------------------------------------------------
// leash init
// ---------------------------------------------------------------------------

#[test]
fn init_scaffolds_control_directory() {
    let dir = TempDir::new().unwrap();
    leash(&dir).arg("init").assert().success();

    assert!(dir.path().join(".leash").is_dir());
    assert!(dir.path().join(".leash/config.yaml").exists());
    assert!(dir.path().join(".leash/secrets.yaml").exists());
}

#[test]
fn init_is_idempotent() {
    let dir = TempDir::new().unwrap();
    leash(&dir).arg("init").assert().success();
    leash(&dir).arg("init").assert().success();
}

#[test]
fn init_preserves_edited_config() {
    let dir = TempDir::new().unwrap();
    init_control_dir(&dir);

    let config_path = dir.path().join(".leash/config.yaml");
    let edited = std::fs::read_to_string(&config_path)
        .unwrap()
        .replace("agent-host.local", "pi.example.net");
    std::fs::write(&config_path, &edited).unwrap();

    leash(&dir).arg("init").assert().success();
    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("pi.example.net"));
}

#[test]
fn manifest_template_contains_references_not_values() {
    let dir = TempDir::new().unwrap();
    init_control_dir(&dir);

    let manifest = std::fs::read_to_string(dir.path().join(".leash/secrets.yaml")).unwrap();
    assert!(manifest.contains("op://"));
}

// ---------------------------------------------------------------------------
// Uninitialized root
// ---------------------------------------------------------------------------

#[test]
fn status_without_init_fails_with_hint() {
    let dir = TempDir::new().unwrap();
    leash(&dir)
        .arg("status")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("not initialized"));
}

#[test]
fn audit_without_init_fails() {
    let dir = TempDir::new().unwrap();
    leash(&dir).arg("audit").assert().failure().code(1);
}

// ---------------------------------------------------------------------------
// Confirmation gating — no remote command may be attempted
// ---------------------------------------------------------------------------

#[test]
fn hard_stop_without_yes_is_blocked_with_exit_2() {
    let dir = TempDir::new().unwrap();
    init_control_dir(&dir);

    leash(&dir)
        .arg("hard-stop")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("confirmation"));
}

#[test]
fn shutdown_without_yes_is_blocked_with_exit_2() {
    let dir = TempDir::new().unwrap();
    init_control_dir(&dir);

    leash(&dir)
        .arg("shutdown")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("confirmation"));
}

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

#[test]
fn status_against_unreachable_target_exits_3() {
    // Needs a real ssh client; skip quietly where none is installed.
    if std::process::Command::new("ssh").arg("-V").output().is_err() {
        return;
    }

    let dir = TempDir::new().unwrap();
    init_control_dir(&dir);

    // Nothing serves ssh on the discard port, so the client fails fast
    // with a refused connection rather than waiting out ConnectTimeout.
    leash(&dir)
        .args(["--host", "127.0.0.1", "--port", "9", "status"])
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("unreachable"));
}

// ---------------------------------------------------------------------------
// Baseline store
// ---------------------------------------------------------------------------

#[test]
fn audit_reads_baselines_from_control_root() {
    let dir = TempDir::new().unwrap();
    init_control_dir(&dir);

    // A pre-seeded baseline file is picked up without any accept call.
    std::fs::write(
        dir.path().join(".leash/baselines.yaml"),
        "~/.config/agent/agent.yaml:\n  hash: abc\n  accepted_at: 2026-08-01T00:00:00Z\n",
    )
    .unwrap();

    // The audit itself needs the remote side; asserting here only that the
    // store parses and the command reaches the transport stage (host from
    // the template is unreachable → connection exit code) or fails fast
    // when no ssh client exists (generic exit 1). Either way the baseline
    // file must not be rewritten by the attempt.
    let before = std::fs::read_to_string(dir.path().join(".leash/baselines.yaml")).unwrap();
    leash(&dir)
        .arg("audit")
        .timeout(std::time::Duration::from_secs(120))
        .assert()
        .failure();
    let after = std::fs::read_to_string(dir.path().join(".leash/baselines.yaml")).unwrap();
    assert_eq!(before, after);
}
