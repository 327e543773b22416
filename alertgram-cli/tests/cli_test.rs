use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn alertgram_cmd() -> Command {
    let mut cmd = Command::cargo_bin("alertgram").unwrap();
    cmd.env_remove("ALERTGRAM_CONFIG")
        .env_remove("ALERTGRAM_API_TOKEN")
        .env_remove("RUST_LOG");
    cmd
}

fn temp_json(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

fn config_file(origin: &str) -> NamedTempFile {
    temp_json(&format!(
        r#"{{
            "api_origin": "{}",
            "api_token": "123456:SECRETTOKEN",
            "delivery": {{"timeout_ms": 1000, "max_retries": 0}},
            "destinations": [
                {{
                    "name": "prod-errors",
                    "channel_id": "-1001",
                    "filter": {{"op": "and", "children": [
                        {{"field": "level", "operator": "equals", "value": "error"}},
                        {{"field": "environment", "operator": "equals", "value": "prod"}}
                    ]}}
                }},
                {{
                    "name": "web",
                    "channel_id": "-1002",
                    "thread_id": 5,
                    "filter": {{"field": "tags.server_name", "operator": "equals", "value": "web1"}}
                }}
            ]
        }}"#,
        origin
    ))
}

fn event_file() -> NamedTempFile {
    temp_json(r#"{"level": "error", "environment": "prod", "tags": {"server_name": "db1"}}"#)
}

#[test]
fn test_validate_lists_destinations_with_masked_token() {
    let config = config_file("https://api.telegram.org");

    alertgram_cmd()
        .arg("validate")
        .arg("--config")
        .arg(config.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration OK: 2 destination(s)"))
        .stdout(predicate::str::contains("prod-errors"))
        .stdout(predicate::str::contains("****OKEN"))
        .stdout(predicate::str::contains("SECRETTOKEN").not());
}

#[test]
fn test_validate_rejects_malformed_filter() {
    let config = temp_json(
        r#"{"api_token": "t", "destinations": [{"channel_id": "1", "filter": {"op": "nand", "children": []}}]}"#,
    );

    alertgram_cmd()
        .arg("validate")
        .arg("--config")
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown operator 'nand'"));
}

#[test]
fn test_config_path_from_env() {
    let config = config_file("https://api.telegram.org");

    alertgram_cmd()
        .env("ALERTGRAM_CONFIG", config.path())
        .arg("validate")
        .assert()
        .success();
}

#[test]
fn test_route_prints_matches_only() {
    let config = config_file("https://api.telegram.org");
    let event = event_file();

    alertgram_cmd()
        .arg("route")
        .arg("--config")
        .arg(config.path())
        .arg("--event")
        .arg(event.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("prod-errors\t-1001"))
        .stdout(predicate::str::contains("web").not());
}

#[test]
fn test_route_without_match() {
    let config = config_file("https://api.telegram.org");
    let event = temp_json(r#"{"level": "info"}"#);

    alertgram_cmd()
        .args(["route", "--output", "json", "--config"])
        .arg(config.path())
        .arg("--event")
        .arg(event.path())
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"));
}

#[test]
fn test_send_reports_failure_with_exit_code() {
    // nothing listens on port 1
    let config = config_file("http://127.0.0.1:1");
    let event = event_file();

    alertgram_cmd()
        .arg("send")
        .arg("--config")
        .arg(config.path())
        .arg("--event")
        .arg(event.path())
        .assert()
        .failure()
        .stdout(predicate::str::contains("prod-errors\t-1001\tfailed: network error"))
        .stderr(predicate::str::contains("1 of 1 deliveries failed"))
        .stdout(predicate::str::contains("SECRETTOKEN").not());
}

#[test]
fn test_missing_token_is_reported() {
    let config = temp_json(r#"{"destinations": [{"channel_id": "1"}]}"#);

    alertgram_cmd()
        .arg("validate")
        .arg("--config")
        .arg(config.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("no 'api_token' configured"));

    alertgram_cmd()
        .arg("validate")
        .arg("--config")
        .arg(config.path())
        .arg("--api-token")
        .arg("999:override")
        .assert()
        .success();
}
