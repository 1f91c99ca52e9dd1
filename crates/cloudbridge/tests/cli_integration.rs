//! CLI integration tests for the cloudbridge command-line interface.
//!
//! These tests cover argument parsing, configuration handling and the
//! paths that do not need an interpreter build.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// A command isolated from the user's config and the repo's working dir.
fn cloudbridge(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cloudbridge").unwrap();
    cmd.env("CLOUDBRIDGE_CONFIG_DIR", home.path().join("config"))
        .env_remove("CLOUDBRIDGE_CONFIG")
        .current_dir(home.path());
    cmd
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    cloudbridge(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("word clouds"))
        .stdout(predicate::str::contains("render"))
        .stdout(predicate::str::contains("repl"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    let home = TempDir::new().unwrap();
    cloudbridge(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("cloudbridge"));
}

#[test]
fn test_unknown_subcommand_fails() {
    let home = TempDir::new().unwrap();
    cloudbridge(&home).arg("paint").assert().failure();
}

#[test]
fn test_render_text_and_file_conflict() {
    let home = TempDir::new().unwrap();
    cloudbridge(&home)
        .args(["render", "hello", "--file", "input.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot be used with"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Render Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_print_program() {
    let home = TempDir::new().unwrap();
    cloudbridge(&home)
        .args(["render", "hello world hello", "--print-program"])
        .assert()
        .success()
        .stdout(predicate::str::contains("os.chdir(\"/work\")"))
        .stdout(predicate::str::contains("\"hello world hello\""))
        .stdout(predicate::str::contains(
            "_module.CloudManager(auto_save=True, output=\"result\")",
        ))
        .stdout(predicate::str::contains("output = cm.make_wordcloud_base64()"));
}

#[test]
fn test_print_program_reads_stdin() {
    let home = TempDir::new().unwrap();
    cloudbridge(&home)
        .args(["render", "--print-program"])
        .write_stdin("from stdin\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"from stdin\\n\""));
}

#[test]
fn test_print_program_uses_project_config() {
    let home = TempDir::new().unwrap();
    std::fs::write(
        home.path().join("cloudbridge.toml"),
        "[render]\nbackground_color = \"black\"\nmax_words = 25\n",
    )
    .unwrap();

    cloudbridge(&home)
        .args(["render", "abc", "--print-program"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cm.set_bgcolor(\"black\")"))
        .stdout(predicate::str::contains("cm.set_max_words(25)"));
}

#[test]
fn test_render_rejects_blank_input() {
    let home = TempDir::new().unwrap();
    cloudbridge(&home)
        .args(["render", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("input is empty"));
}

#[test]
fn test_render_without_interpreter() {
    let home = TempDir::new().unwrap();
    cloudbridge(&home)
        .args(["render", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No interpreter configured"));
}

#[test]
fn test_check_without_interpreter() {
    let home = TempDir::new().unwrap();
    cloudbridge(&home)
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No interpreter configured"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Config Tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_env() {
    let home = TempDir::new().unwrap();
    cloudbridge(&home)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"))
        .stdout(predicate::str::contains(
            home.path().join("config").display().to_string(),
        ));
}

#[test]
fn test_config_show_defaults() {
    let home = TempDir::new().unwrap();
    cloudbridge(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No config files loaded"))
        .stdout(predicate::str::contains("PretendardVariable.ttf"))
        .stdout(predicate::str::contains("result.png"));
}

#[test]
fn test_config_init_then_validate() {
    let home = TempDir::new().unwrap();
    cloudbridge(&home)
        .args(["config", "init", "--local"])
        .assert()
        .success();
    assert!(home.path().join("cloudbridge.toml").exists());

    cloudbridge(&home)
        .args(["config", "init", "--local"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    cloudbridge(&home)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_config_validate_rejects_bad_output() {
    let home = TempDir::new().unwrap();
    std::fs::write(
        home.path().join("cloudbridge.toml"),
        "[render]\noutput = \"result.jpg\"\n",
    )
    .unwrap();

    cloudbridge(&home)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("render.output"));
}

#[test]
fn test_explicit_config_must_exist() {
    let home = TempDir::new().unwrap();
    cloudbridge(&home)
        .args(["--config", "missing.toml", "config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.toml"));
}
