use core_logic::{EntityResult, EntityStatus, ReportWriter, ResultAggregator, RunReport};
use serde_json::{Map, Value};
use std::time::Duration;

fn result(index: usize, status: EntityStatus) -> EntityResult {
    let mut fields = Map::new();
    if status == EntityStatus::Success {
        fields.insert("tx_hash".to_string(), Value::from(format!("0x{:064x}", index)));
    }
    EntityResult {
        index,
        address: format!("0x{:040x}", index),
        private_key: format!("0x{:064x}", index + 100),
        status,
        attempts: 1,
        error: (status != EntityStatus::Success).then(|| "余额不足".to_string()),
        token: None,
        fields,
        duration: Duration::from_millis(index as u64),
    }
}

fn metadata() -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("network".to_string(), Value::from("OPN Testnet"));
    map.insert("chain_id".to_string(), Value::from(984));
    map
}

fn sample_aggregator() -> ResultAggregator {
    let aggregator = ResultAggregator::new();
    aggregator.record(result(2, EntityStatus::Failed));
    aggregator.record(result(0, EntityStatus::Success));
    aggregator.record(result(1, EntityStatus::AlreadyClaimed));
    aggregator
}

#[test]
fn test_report_layout() {
    let report = RunReport::from_aggregator(&sample_aggregator(), metadata())
        .with_timestamp("2026-01-01 00:00:00");
    let json: Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(json["timestamp"], "2026-01-01 00:00:00");
    assert_eq!(json["network"], "OPN Testnet");
    assert_eq!(json["chain_id"], 984);
    assert_eq!(json["total"], 3);
    assert_eq!(json["success"], 1);
    assert_eq!(json["failed"], 1);
    assert_eq!(json["already_claimed"], 1);

    let details = json["details"].as_array().unwrap();
    assert_eq!(details.len(), 3);
    assert_eq!(details[0]["status"], "success");
    assert!(details[0]["tx_hash"].is_string());
    assert!(details[0].get("error").is_none());
    assert_eq!(details[1]["status"], "already_claimed");
    assert_eq!(details[2]["status"], "failed");
    assert_eq!(details[2]["error"], "余额不足");
    assert!(details[0].get("index").is_none());
}

#[test]
fn test_report_field_order() {
    let report = RunReport::from_aggregator(&sample_aggregator(), metadata())
        .with_timestamp("2026-01-01 00:00:00");
    let json = report.to_json().unwrap();

    let pos = |key: &str| json.find(&format!("\"{}\"", key)).unwrap();
    assert!(pos("timestamp") < pos("network"));
    assert!(pos("network") < pos("total"));
    assert!(pos("total") < pos("success"));
    assert!(pos("already_claimed") < pos("details"));
    // non-ASCII is kept verbatim
    assert!(json.contains("余额不足"));
}

#[tokio::test]
async fn test_write_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.json");
    let second = dir.path().join("second.json");

    let report_a = RunReport::from_aggregator(&sample_aggregator(), metadata())
        .with_timestamp("2026-01-01 00:00:00");
    let report_b = RunReport::from_aggregator(&sample_aggregator(), metadata())
        .with_timestamp("2026-01-01 00:00:00");

    ReportWriter::new(&first).write(&report_a).await.unwrap();
    ReportWriter::new(&second).write(&report_b).await.unwrap();

    let a = tokio::fs::read(&first).await.unwrap();
    let b = tokio::fs::read(&second).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_write_replaces_and_leaves_no_staging_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("claim_results.json");
    let writer = ReportWriter::new(&path);

    tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
    tokio::fs::write(&path, b"stale").await.unwrap();

    let report = RunReport::from_aggregator(&ResultAggregator::new(), Map::new());
    writer.write(&report).await.unwrap();

    let content = tokio::fs::read_to_string(&path).await.unwrap();
    let json: Value = serde_json::from_str(&content).unwrap();
    assert_eq!(json["total"], 0);
    assert_eq!(json["success"], 0);
    assert!(json["details"].as_array().unwrap().is_empty());

    let mut entries = tokio::fs::read_dir(path.parent().unwrap()).await.unwrap();
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        names.push(entry.file_name().to_string_lossy().to_string());
    }
    assert_eq!(names, vec!["claim_results.json".to_string()]);
}

#[tokio::test]
async fn test_write_fails_fast_on_unwritable_target() {
    let dir = tempfile::tempdir().unwrap();
    // target is an existing directory: rename over it must fail
    let target = dir.path().join("occupied");
    tokio::fs::create_dir_all(target.join("child")).await.unwrap();

    let report = RunReport::from_aggregator(&ResultAggregator::new(), Map::new());
    let result = ReportWriter::new(&target).write(&report).await;

    assert!(result.is_err());
    assert!(!dir.path().join("occupied.tmp").exists());
}
