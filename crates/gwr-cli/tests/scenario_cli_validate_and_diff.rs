use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, body).unwrap();
    path
}

const DESIRED: &str = r#"
services:
  - name: billing
    host: billing-v2.internal
upstreams:
  - name: pool
    targets:
      - target: 10.0.0.1:80
"#;

const CURRENT: &str = r#"
services:
  - name: billing
    host: billing.internal
    routes:
      - name: billing-rt
        paths: ["/billing"]
upstreams:
  - name: pool
    targets:
      - target: 10.0.0.1:80
"#;

#[test]
fn validate_prints_hash_and_counts() {
    let dir = tempfile::tempdir().unwrap();
    let desired = write(&dir, "desired.yaml", DESIRED);

    Command::cargo_bin("gwr")
        .unwrap()
        .arg("validate")
        .arg(&desired)
        .assert()
        .success()
        .stdout(predicate::str::contains("config_hash="))
        .stdout(predicate::str::contains("kind=service count=1"))
        .stdout(predicate::str::contains("kind=target count=1"))
        .stdout(predicate::str::contains("entities=3"));
}

#[test]
fn validate_rejects_literal_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let bad = write(
        &dir,
        "bad.yaml",
        r#"
plugins:
  - name: key-auth
    config:
      token: "sk-live-abc123secretvalue"
"#,
    );

    Command::cargo_bin("gwr")
        .unwrap()
        .arg("validate")
        .arg(&bad)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("abc123").not());
}

#[test]
fn diff_against_a_current_file_prints_ordered_events() {
    let dir = tempfile::tempdir().unwrap();
    let desired = write(&dir, "desired.yaml", DESIRED);
    let current = write(&dir, "current.yaml", CURRENT);

    let out = Command::cargo_bin("gwr")
        .unwrap()
        .arg("diff")
        .arg(&desired)
        .arg("--current")
        .arg(&current)
        .assert()
        .success()
        .stdout(predicate::str::contains("op=update kind=service identity=billing"))
        .stdout(predicate::str::contains("op=delete kind=route identity=billing-rt"))
        .stdout(predicate::str::contains("creates=0 updates=1 deletes=1"))
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8(out).unwrap();
    assert!(!stdout.contains("kind=target"), "unchanged target must not appear");
}

#[test]
fn diff_needs_a_current_source() {
    let dir = tempfile::tempdir().unwrap();
    let desired = write(&dir, "desired.yaml", DESIRED);

    Command::cargo_bin("gwr")
        .unwrap()
        .arg("diff")
        .arg(&desired)
        .assert()
        .failure();
}
