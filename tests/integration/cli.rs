//! Binary-level tests for the paginated-fetcher CLI

use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

fn cli() -> Command {
    Command::cargo_bin("paginated-fetcher").unwrap()
}

fn instant_demo(total: usize) -> Vec<String> {
    [
        "demo",
        "--total",
        &total.to_string(),
        "--failure-rate",
        "0",
        "--min-latency-ms",
        "0",
        "--max-latency-ms",
        "0",
    ]
    .iter()
    .map(|arg| arg.to_string())
    .collect()
}

#[test]
fn test_shards_human_output() {
    let output = cli()
        .args(["shards", "--total", "25"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let stdout = String::from_utf8(output).unwrap();

    assert!(stdout.contains("Page 1 covers 10/25 records; 2 shard(s) of up to 10 remain"));
    assert!(stdout.contains("page    2 | offset       10 | size   10"));
    assert!(stdout.contains("page    3 | offset       20 | size    5"));
}

#[test]
fn test_shards_json_output_honors_page_size() {
    let output = cli()
        .args([
            "shards",
            "--total",
            "25",
            "--page-size",
            "8",
            "--output-format",
            "json",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let json: Value = serde_json::from_slice(&output).unwrap();

    assert_eq!(json["page_size"], 8);
    assert_eq!(json["first_page"], 8);
    let shards = json["shards"].as_array().unwrap();
    let sizes: Vec<u64> = shards
        .iter()
        .map(|s| s["page_size"].as_u64().unwrap())
        .collect();
    assert_eq!(sizes, vec![8, 8, 1]);
    assert_eq!(shards[0]["shard_index"], 2);
}

#[test]
fn test_shards_rejects_oversized_first_page() {
    cli()
        .args(["shards", "--total", "25", "--first-page", "11"])
        .assert()
        .failure();
}

#[test]
fn test_demo_json_summary() {
    let output = cli()
        .args(instant_demo(30))
        .args(["--output-format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: Value = serde_json::from_slice(&output).unwrap();

    assert_eq!(summary["success"], true);
    assert_eq!(summary["status"], "completed");
    assert_eq!(summary["records"], 30);
    assert_eq!(summary["total"], 30);
    assert_eq!(summary["pages"], 3);
    assert_eq!(summary["failed_pages"], Value::Array(Vec::new()));
}

#[test]
fn test_demo_writes_records_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("records.json");

    cli()
        .args(instant_demo(12))
        .args(["--output", path.to_str().unwrap()])
        .assert()
        .success();

    let records: Vec<Value> = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
    assert_eq!(records.len(), 12);
    assert_eq!(records[0]["id"], 0);
    assert_eq!(records[11]["id"], 11);
}

#[test]
fn test_demo_reads_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("fetch.toml");
    fs::write(&config, "base_page_size = 4\nconcurrency = 2\n").unwrap();

    let output = cli()
        .args(instant_demo(10))
        .args(["--config", config.to_str().unwrap(), "--output-format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: Value = serde_json::from_slice(&output).unwrap();

    assert_eq!(summary["records"], 10);
    assert_eq!(summary["pages"], 3);
}

#[test]
fn test_invalid_concurrency_is_rejected() {
    cli()
        .args(instant_demo(10))
        .args(["--concurrency", "0"])
        .assert()
        .failure();

    cli()
        .args(instant_demo(10))
        .args(["--concurrency", "64"])
        .assert()
        .failure();
}

#[test]
fn test_invalid_failure_rate_is_rejected() {
    cli()
        .args(["demo", "--failure-rate", "2"])
        .assert()
        .failure();
}

#[test]
fn test_missing_config_file_fails() {
    cli()
        .args(instant_demo(10))
        .args(["--config", "/nonexistent/fetch.toml"])
        .assert()
        .failure();
}
