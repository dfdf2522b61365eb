//! Integration tests for the CLI binary.
//!
//! Verifies that the `ccred` binary responds to basic flags and can drive a
//! learner from enrollment to an issued certificate in a scratch home.
//!
//! This test is registered as a [[test]] in the course-credential-cli crate
//! so that CARGO_BIN_EXE_ccred is available.

use std::path::Path;
use std::process::{Command, Output};

/// Get a Command pointing to the `ccred` binary.
fn ccred_binary() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ccred"));
    cmd.env_remove("CCRED_USER").env_remove("CCRED_HOME");
    cmd
}

/// Run `ccred` against `home` with the test passphrase.
fn ccred(home: &Path, args: &[&str]) -> Output {
    ccred_binary()
        .arg("--home")
        .arg(home)
        .args(args)
        .env("CCRED_PASSPHRASE", "cli-test-passphrase")
        .output()
        .expect("failed to execute ccred")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn assert_ok(output: &Output, what: &str) {
    assert!(
        output.status.success(),
        "{what} should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

const COURSE_JSON: &str = r#"{
  "id": "course-cli",
  "slug": "cli-basics",
  "title": "CLI Basics",
  "modules": [
    {
      "id": "m1",
      "title": "Getting started",
      "lessons": [
        {
          "id": "cli-l1",
          "title": "Flags",
          "quiz": [
            { "id": "q1", "prompt": "Short help flag?", "options": ["-h", "-x"], "correct_option": 0 },
            { "id": "q2", "prompt": "Exit code on success?", "options": ["1", "0"], "correct_option": 1 }
          ]
        }
      ]
    }
  ]
}"#;

#[test]
fn cli_responds_to_help() {
    let output = ccred_binary()
        .arg("--help")
        .output()
        .expect("failed to execute ccred --help");

    assert_ok(&output, "ccred --help");
    let stdout = stdout(&output);
    assert!(
        stdout.contains("ccred") || stdout.contains("CourseCredential") || stdout.contains("Usage"),
        "ccred --help output should contain usage information, got: {stdout}"
    );
}

#[test]
fn cli_responds_to_version() {
    let output = ccred_binary()
        .arg("--version")
        .output()
        .expect("failed to execute ccred --version");

    assert_ok(&output, "ccred --version");
    let stdout = stdout(&output);
    assert!(
        stdout.contains("0.3") || stdout.contains("ccred"),
        "ccred --version should contain version info, got: {stdout}"
    );
}

#[test]
fn cli_exits_with_error_on_unknown_flag() {
    let output = ccred_binary()
        .arg("--nonexistent-flag")
        .output()
        .expect("failed to execute ccred");

    assert!(
        !output.status.success(),
        "ccred with unknown flag should exit with error"
    );
}

#[test]
fn cli_requires_init_before_use() {
    let dir = tempfile::tempdir().unwrap();
    let output = ccred(dir.path(), &["course", "list"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ccred init"), "got: {stderr}");
}

#[test]
fn cli_init_twice_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert_ok(&ccred(dir.path(), &["init"]), "first init");
    assert!(dir.path().join("org.key").exists());
    assert!(dir.path().join("config.json").exists());
    assert!(!ccred(dir.path(), &["init"]).status.success());
}

#[test]
fn cli_learner_completes_course_and_receives_certificate() {
    let dir = tempfile::tempdir().unwrap();
    let home = dir.path();
    assert_ok(&ccred(home, &["init"]), "init");

    let course_file = home.join("course.json");
    std::fs::write(&course_file, COURSE_JSON).unwrap();
    let course_path = course_file.to_string_lossy().into_owned();

    // Learners cannot edit the catalog.
    let denied = ccred(home, &["--as", "ada", "course", "import", &course_path]);
    assert!(!denied.status.success());

    assert_ok(
        &ccred(
            home,
            &["--as", "ops", "--role", "admin", "course", "import", &course_path],
        ),
        "course import",
    );
    let listing = ccred(home, &["course", "list"]);
    assert_ok(&listing, "course list");
    assert!(stdout(&listing).contains("cli-basics"));

    assert_ok(&ccred(home, &["--as", "ada", "enroll", "cli-basics"]), "enroll");

    let submit = ccred(
        home,
        &[
            "--as", "ada", "--name", "Ada Lovelace", "quiz", "submit", "cli-l1", "-a", "q1=0", "-a",
            "q2=1",
        ],
    );
    assert_ok(&submit, "quiz submit");
    let out = stdout(&submit);
    assert!(out.contains("Score: 100% (passed)"), "got: {out}");
    assert!(out.contains("Certificate issued."), "got: {out}");

    let list = ccred(home, &["--as", "ada", "--json", "cert", "list"]);
    assert_ok(&list, "cert list");
    let certs: serde_json::Value = serde_json::from_slice(&list.stdout).unwrap();
    let certs = certs.as_array().unwrap();
    assert_eq!(certs.len(), 1);
    assert_eq!(certs[0]["course_slug"], "cli-basics");
    assert_eq!(certs[0]["student_name"], "Ada Lovelace");
    assert_eq!(certs[0]["status"], "PENDING");

    let verification_id = certs[0]["verification_id"].as_str().unwrap().to_string();
    let check = ccred(home, &["cert", "check", &verification_id]);
    assert_ok(&check, "cert check");
    assert!(stdout(&check).contains("Seal:          valid"));

    assert_ok(&ccred(home, &["ledger", "verify"]), "ledger verify");
}
