//! Configuration integration tests.
//!
//! Config discovery, format parsing and precedence, observed through
//! `info --json`, which reports the resolved changelog path and log level.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Returns a Command configured to run our binary.
#[allow(deprecated)]
fn cmd() -> Command {
    Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap()
}

/// Run `info --json` from `dir` and return the `config` object.
fn resolved_config(dir: &Path, extra: &[&str]) -> serde_json::Value {
    let output = cmd()
        .env("RELNOTES_LOG_DIR", std::env::temp_dir().join("relnotes-test-logs"))
        .arg("-C")
        .arg(dir)
        .args(extra)
        .args(["info", "--json"])
        .assert()
        .success();
    let json: serde_json::Value = serde_json::from_slice(&output.get_output().stdout).unwrap();
    json["config"].clone()
}

fn changelog_of(config: &serde_json::Value) -> String {
    config["changelog"].as_str().unwrap().to_string()
}

// =============================================================================
// Config File Discovery
// =============================================================================

#[test]
fn runs_without_config_file() {
    let tmp = TempDir::new().unwrap();
    let config = resolved_config(tmp.path(), &[]);
    assert!(changelog_of(&config).ends_with("CHANGELOG.md"));
    assert_eq!(config["log_level"], "info");
    assert_eq!(config["locale"], "en");
}

#[test]
fn discovers_dotfile_config_in_current_dir() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".relnotes.toml"),
        "[changelog]\npath = \"HISTORY.md\"\n",
    )
    .unwrap();

    let config = resolved_config(tmp.path(), &[]);
    assert!(changelog_of(&config).ends_with("HISTORY.md"));
    assert!(config["config_file"].as_str().unwrap().ends_with(".relnotes.toml"));
}

#[test]
fn discovers_config_in_parent_directory() {
    let tmp = TempDir::new().unwrap();
    let sub_dir = tmp.path().join("nested").join("deep");
    fs::create_dir_all(&sub_dir).unwrap();
    fs::write(tmp.path().join("relnotes.toml"), r#"log_level = "warn""#).unwrap();

    let config = resolved_config(&sub_dir, &[]);
    assert_eq!(config["log_level"], "warn");
}

#[test]
fn dotfile_takes_precedence_over_regular_name() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".relnotes.toml"), r#"log_level = "debug""#).unwrap();
    fs::write(tmp.path().join("relnotes.toml"), r#"log_level = "error""#).unwrap();

    let config = resolved_config(tmp.path(), &[]);
    assert_eq!(config["log_level"], "debug");
}

// =============================================================================
// Config Format Parsing
// =============================================================================

#[test]
fn parses_yaml_config() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".relnotes.yaml"),
        "notes:\n  locale: zh\n  generator: my-llm\n",
    )
    .unwrap();

    let config = resolved_config(tmp.path(), &[]);
    assert_eq!(config["locale"], "zh");
    assert_eq!(config["generator"], "my-llm");
}

#[test]
fn parses_json_config() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".relnotes.json"),
        r#"{"changelog": {"path": "docs/CHANGES.md"}}"#,
    )
    .unwrap();

    let config = resolved_config(tmp.path(), &[]);
    assert!(changelog_of(&config).ends_with("docs/CHANGES.md"));
}

#[test]
fn toml_preferred_over_yaml_in_same_directory() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".relnotes.toml"), r#"log_level = "debug""#).unwrap();
    fs::write(tmp.path().join(".relnotes.yaml"), "log_level: error").unwrap();

    let config = resolved_config(tmp.path(), &[]);
    assert_eq!(config["log_level"], "debug");
}

// =============================================================================
// Config Precedence
// =============================================================================

#[test]
fn closer_config_takes_precedence() {
    let tmp = TempDir::new().unwrap();
    let sub_dir = tmp.path().join("project");
    fs::create_dir_all(&sub_dir).unwrap();
    fs::write(tmp.path().join(".relnotes.toml"), r#"log_level = "error""#).unwrap();
    fs::write(sub_dir.join(".relnotes.toml"), r#"log_level = "debug""#).unwrap();

    let config = resolved_config(&sub_dir, &[]);
    assert_eq!(config["log_level"], "debug");
}

#[test]
fn explicit_config_flag_wins() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".relnotes.toml"), r#"log_level = "debug""#).unwrap();
    let explicit = tmp.path().join("ci.toml");
    fs::write(&explicit, "log_level = \"error\"\n[changelog]\npath = \"CI.md\"\n").unwrap();

    let config = resolved_config(tmp.path(), &["--config", explicit.to_str().unwrap()]);
    assert_eq!(config["log_level"], "error");
    assert!(changelog_of(&config).ends_with("CI.md"));
}

#[test]
fn configured_changelog_path_is_used_by_commands() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".relnotes.toml"),
        "[changelog]\npath = \"NEWS.md\"\n",
    )
    .unwrap();

    cmd()
        .env("RELNOTES_LOG_DIR", tmp.path().join(".logs"))
        .arg("-C")
        .arg(tmp.path())
        .arg("init")
        .assert()
        .success();
    assert!(tmp.path().join("NEWS.md").exists());
    assert!(!tmp.path().join("CHANGELOG.md").exists());
}

// =============================================================================
// Error Cases
// =============================================================================

#[test]
fn invalid_toml_config_shows_error() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".relnotes.toml"), "this is not valid toml [[[").unwrap();

    cmd()
        .args(["-C", tmp.path().to_str().unwrap(), "info"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration"));
}

#[test]
fn invalid_locale_shows_error() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join(".relnotes.toml"), "[notes]\nlocale = \"fr\"\n").unwrap();

    cmd()
        .args(["-C", tmp.path().to_str().unwrap(), "info"])
        .assert()
        .failure();
}

#[test]
fn unknown_config_field_is_ignored() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join(".relnotes.toml"),
        "log_level = \"warn\"\nunknown_field = \"ignored\"\n[unknown_section]\nx = 1\n",
    )
    .unwrap();

    let config = resolved_config(tmp.path(), &[]);
    assert_eq!(config["log_level"], "warn");
}

// =============================================================================
// Boundary Marker Tests
// =============================================================================

#[test]
fn git_boundary_stops_config_search() {
    let tmp = TempDir::new().unwrap();
    let parent = tmp.path().join("parent");
    let repo = parent.join("repo");
    let src = repo.join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(parent.join(".relnotes.toml"), r#"log_level = "error""#).unwrap();
    fs::create_dir(repo.join(".git")).unwrap();

    let config = resolved_config(&src, &[]);
    assert_eq!(config["log_level"], "info");
}

#[test]
fn config_in_same_dir_as_git_is_found() {
    let tmp = TempDir::new().unwrap();
    let repo = tmp.path().join("repo");
    let src = repo.join("src");
    fs::create_dir_all(&src).unwrap();
    fs::create_dir(repo.join(".git")).unwrap();
    fs::write(repo.join(".relnotes.toml"), r#"log_level = "debug""#).unwrap();

    let config = resolved_config(&src, &[]);
    assert_eq!(config["log_level"], "debug");
}
