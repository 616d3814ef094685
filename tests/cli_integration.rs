//! CLI Integration Tests
//!
//! End-to-end tests for CLI commands using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Get the relay binary for testing
fn relay_cmd() -> Command {
    let mut cmd = Command::cargo_bin("relay").unwrap();
    cmd.env_remove("RELAY_CONFIG")
        .env_remove("RELAY_LOG_LEVEL")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_version_output() {
    relay_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("relay"));
}

#[test]
fn test_help_shows_all_commands() {
    relay_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("completions"));
}

#[test]
fn test_run_help() {
    relay_cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--goal"))
        .stdout(predicate::str::contains("--provider"))
        .stdout(predicate::str::contains("--auto-approve"));
}

#[test]
fn test_config_init_creates_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("relay.toml");

    relay_cmd()
        .args(["config", "init", "-o", config_path.to_str().unwrap()])
        .assert()
        .success();

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[circuit_breaker]"));
    assert!(content.contains("[routing.fallbacks]"));
}

#[test]
fn test_config_init_no_overwrite() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("relay.toml");
    std::fs::write(&config_path, "existing content").unwrap();

    relay_cmd()
        .args(["config", "init", "-o", config_path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert_eq!(content, "existing content");
}

#[test]
fn test_completions_bash() {
    relay_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("relay"));
}

#[test]
fn test_run_missing_config_file_fails() {
    relay_cmd()
        .args([
            "run",
            "-g",
            "Summarize the quarterly report",
            "-p",
            "openai",
            "-c",
            "/nonexistent/relay.toml",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_run_without_providers_fails_with_report() {
    relay_cmd()
        .args([
            "run",
            "-g",
            "Summarize the quarterly report",
            "-p",
            "openai",
            "-m",
            "gpt-4o",
            "-f",
            "json",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"status\": \"failed\""))
        .stdout(predicate::str::contains("error_handling"))
        .stderr(predicate::str::contains("Error: run failed"));
}

#[test]
fn test_run_rejected_at_prompt() {
    relay_cmd()
        .args(["run", "-g", "Summarize", "-p", "openai", "-m", "gpt-4o", "-f", "json"])
        .write_stdin("n\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Approve?"))
        .stdout(predicate::str::contains("rejected at prompt"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_completes_against_mock_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-cli-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "model": "gpt-4o-mini",
            "choices": [{"message": {"role": "assistant", "content": "Report summarized."}}],
            "usage": {"prompt_tokens": 20, "completion_tokens": 5}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("relay.toml");
    std::fs::write(
        &config_path,
        format!(
            r#"
[routing.default_models]
openai = "gpt-4o-mini"

[[providers]]
name = "openai"
kind = "openai"
base_url = "{}"
api_key_env = "RELAY_CLI_TEST_KEY"
"#,
            server.uri()
        ),
    )
    .unwrap();

    let config_arg = config_path.to_str().unwrap().to_string();
    let output = tokio::task::spawn_blocking(move || {
        relay_cmd()
            .env("RELAY_CLI_TEST_KEY", "sk-cli-test")
            .args([
                "run",
                "-g",
                "Summarize the quarterly report",
                "-p",
                "openai",
                "-c",
                &config_arg,
                "-f",
                "json",
            ])
            .output()
            .unwrap()
    })
    .await
    .unwrap();

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "completed");
    assert_eq!(report["used_provider"], "openai");
    assert_eq!(report["content"], "Report summarized.");
    assert_eq!(report["traces"].as_array().unwrap().len(), 3);
}
