use assert_cmd::Command;
use predicates::prelude::*;

fn transcript(config_dir: &tempfile::TempDir) -> Command {
    let config = config_dir.path().join("config.yaml");
    std::fs::write(&config, "request_timeout_secs: 5\n").unwrap();

    let mut cmd = Command::cargo_bin("transcript").unwrap();
    cmd.env("TRANSCRIPT_CONFIG", config).env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_options() {
    let dir = tempfile::tempdir().unwrap();
    transcript(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--use-playwright-fallback"))
        .stdout(predicate::str::contains("--max-retries"))
        .stdout(predicate::str::contains("--no-formatting"));
}

#[test]
fn invalid_reference_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    transcript(&dir)
        .arg("https://vimeo.com/123456")
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains(
            "Error: Invalid YouTube URL: https://vimeo.com/123456",
        ));
}

#[test]
fn zero_retries_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    transcript(&dir)
        .args(["dQw4w9WgXcQ", "--max-retries", "0"])
        .assert()
        .failure();
}

#[test]
fn broken_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("broken.yaml");
    std::fs::write(&config, "delay: [not, a, number]\n").unwrap();

    transcript(&dir)
        .args(["--config", config.to_str().unwrap(), "dQw4w9WgXcQ"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn oversized_delay_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();
    transcript(&dir)
        .args(["https://www.youtube.com/playlist?list=PLx", "--delay", "1e20"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains(
            "Error: --delay must be a non-negative number of seconds",
        ));
}
