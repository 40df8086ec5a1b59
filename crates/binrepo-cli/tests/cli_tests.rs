//! End-to-end tests for the binrepo binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

const HELLO_SHA1: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";
const HELLO_MD5: &str = "5eb63bbbe01eeed093cb22bb8f5acdc3";

const CONFIG: &str = r#"
[[repositories]]
type = "local"
key = "libs-release"
checksum_policy = "fail-on-mismatch"

[[repositories]]
type = "local"
key = "libs-staging"

[[repositories]]
type = "remote"
key = "central"
url = "https://repo.example.com/maven2"

[[repositories]]
type = "virtual"
key = "libs"
repositories = ["libs-release", "central"]
"#;

/// A config file, a storage root and a file to upload.
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("repos.toml"), CONFIG).unwrap();
        fs::write(dir.path().join("hello.jar"), "hello world").unwrap();
        Self { dir }
    }

    fn upload_file(&self) -> PathBuf {
        self.dir.path().join("hello.jar")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("binrepo").expect("Failed to find binrepo binary");
        cmd.env_remove("BINREPO_CONFIG")
            .env_remove("BINREPO_STORAGE")
            .env_remove("RUST_LOG")
            .env("BINREPO_USER", "ci")
            .arg("--config")
            .arg(self.dir.path().join("repos.toml"))
            .arg("--storage")
            .arg(self.dir.path().join("data"));
        cmd
    }

    fn deploy(&self, repo: &str, path: &str) {
        self.cmd()
            .args(["deploy", repo, path])
            .arg(self.upload_file())
            .assert()
            .success();
    }
}

// ============================================================================
// Setup and usage
// ============================================================================

#[test]
fn help_lists_commands() {
    let mut cmd = Command::cargo_bin("binrepo").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("move"))
        .stdout(predicate::str::contains("derive"));
}

#[test]
fn missing_config_is_a_usage_error() {
    let dir = TempDir::new().unwrap();
    let mut cmd = Command::cargo_bin("binrepo").unwrap();
    cmd.env_remove("BINREPO_CONFIG")
        .current_dir(dir.path())
        .arg("repos")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no repository configuration"));
}

#[test]
fn repos_lists_every_repository() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .arg("repos")
        .assert()
        .success()
        .stdout(predicate::str::contains("central-cache"))
        .stdout(predicate::str::contains("virtual"))
        .stdout(predicate::str::contains("https://repo.example.com/maven2"))
        .stdout(predicate::str::contains("Total:"));
}

#[test]
fn repos_json_is_parseable() {
    let sandbox = Sandbox::new();
    let output = sandbox.cmd().args(["repos", "--json"]).output().unwrap();
    assert!(output.status.success());

    let repos: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let keys: Vec<&str> = repos
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["key"].as_str().unwrap())
        .collect();
    assert_eq!(
        keys,
        vec!["central", "central-cache", "libs", "libs-release", "libs-staging"]
    );
}

// ============================================================================
// Deploy, list, info, delete
// ============================================================================

#[test]
fn deployed_content_survives_between_invocations() {
    let sandbox = Sandbox::new();
    sandbox.deploy("libs-release", "org/acme/1.0/acme.jar");

    sandbox
        .cmd()
        .args(["list", "libs-release", "org/acme/1.0"])
        .assert()
        .success()
        .stdout(predicate::str::contains("acme.jar"))
        .stdout(predicate::str::contains("11 B"));

    sandbox
        .cmd()
        .args(["info", "libs-release", "org/acme/1.0/acme.jar"])
        .assert()
        .success()
        .stdout(predicate::str::contains(HELLO_SHA1))
        .stdout(predicate::str::contains(HELLO_MD5));
}

#[test]
fn virtual_listing_shows_member_content() {
    let sandbox = Sandbox::new();
    sandbox.deploy("libs-release", "org/acme/1.0/acme.jar");
    sandbox.deploy("central-cache", "org/acme/2.0/acme.jar");

    let output = sandbox
        .cmd()
        .args(["list", "libs", "org/acme", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let children: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = children
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["1.0", "2.0"]);
}

#[test]
fn declared_checksum_mismatch_is_rejected() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["deploy", "libs-release", "bad.jar"])
        .arg(sandbox.upload_file())
        .args(["--sha1", "0000000000000000000000000000000000000000"])
        .assert()
        .code(1);

    sandbox
        .cmd()
        .args(["info", "libs-release", "bad.jar"])
        .assert()
        .failure();
}

#[test]
fn deploy_to_virtual_repository_fails() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["deploy", "libs", "a.jar"])
        .arg(sandbox.upload_file())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error"));
}

#[test]
fn delete_removes_folders_with_content() {
    let sandbox = Sandbox::new();
    sandbox.deploy("libs-release", "org/acme/1.0/acme.jar");
    sandbox.deploy("libs-release", "org/acme/1.0/acme.pom");

    sandbox
        .cmd()
        .args(["delete", "libs-release", "org/acme"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted"));

    sandbox
        .cmd()
        .args(["info", "libs-release", "org/acme/1.0/acme.jar"])
        .assert()
        .failure();
}

// ============================================================================
// Move and copy
// ============================================================================

#[test]
fn dry_run_move_changes_nothing() {
    let sandbox = Sandbox::new();
    sandbox.deploy("libs-staging", "org/acme/1.0/acme.jar");

    sandbox
        .cmd()
        .args(["move", "libs-staging", "org/acme", "libs-release", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[dry run]"));

    sandbox
        .cmd()
        .args(["info", "libs-staging", "org/acme/1.0/acme.jar"])
        .assert()
        .success();
    sandbox
        .cmd()
        .args(["info", "libs-release", "org/acme/1.0/acme.jar"])
        .assert()
        .failure();
}

#[test]
fn move_promotes_between_repositories() {
    let sandbox = Sandbox::new();
    sandbox.deploy("libs-staging", "org/acme/1.0/acme.jar");

    sandbox
        .cmd()
        .args(["move", "libs-staging", "org/acme/1.0/acme.jar", "libs-release", "--prune"])
        .assert()
        .success()
        .stdout(predicate::str::contains("libs-release:org/acme/1.0/acme.jar"));

    sandbox
        .cmd()
        .args(["info", "libs-release", "org/acme/1.0/acme.jar"])
        .assert()
        .success();
    sandbox
        .cmd()
        .args(["list", "libs-staging"])
        .assert()
        .success()
        .stdout(predicate::str::contains("org").not());
}

#[test]
fn copy_to_explicit_path_keeps_source() {
    let sandbox = Sandbox::new();
    sandbox.deploy("libs-staging", "org/acme/1.0/acme.jar");

    sandbox
        .cmd()
        .args(["copy", "libs-staging", "org/acme/1.0/acme.jar", "libs-release"])
        .args(["--to", "mirror/acme.jar"])
        .assert()
        .success();

    sandbox
        .cmd()
        .args(["info", "libs-release", "mirror/acme.jar"])
        .assert()
        .success();
    sandbox
        .cmd()
        .args(["info", "libs-staging", "org/acme/1.0/acme.jar"])
        .assert()
        .success();
}

#[test]
fn move_into_virtual_repository_reports_status() {
    let sandbox = Sandbox::new();
    sandbox.deploy("libs-staging", "org/acme/1.0/acme.jar");

    sandbox
        .cmd()
        .args(["move", "libs-staging", "org/acme", "libs"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("[400]"));
}

// ============================================================================
// Checksums
// ============================================================================

#[test]
fn derive_prints_the_other_checksum() {
    let sandbox = Sandbox::new();
    sandbox.deploy("libs-release", "org/acme/1.0/acme.jar");

    sandbox
        .cmd()
        .args(["derive", "--sha1", HELLO_SHA1])
        .assert()
        .success()
        .stdout(predicate::str::contains(HELLO_MD5));
}

#[test]
fn derive_unknown_checksum_fails() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["derive", "--md5", HELLO_MD5])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no stored content"));
}

#[test]
fn deploy_by_checksum_copies_stored_content() {
    let sandbox = Sandbox::new();
    sandbox.deploy("libs-release", "org/acme/1.0/acme.jar");

    sandbox
        .cmd()
        .args(["deploy", "libs-staging", "copies/acme.jar", "--md5", HELLO_MD5])
        .assert()
        .success()
        .stdout(predicate::str::contains(HELLO_SHA1));
}
