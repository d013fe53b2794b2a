//! CLI integration tests
//!
//! Runs the lensctl binary against captures built from encoded records.

use std::collections::BTreeMap;
use std::io::Write;
use std::process::{Command, Output};

use base64::{engine::general_purpose::STANDARD, Engine};
use clusterlens_core::decoder::{coordination, group, transaction};
use clusterlens_core::{
    GroupMetadataValue, MemberMetadataValue, OffsetCommitValue, PartitionStateValue,
    TopicAssignmentValue, TopicConfigValue, TopicPartition, TransactionLogValue,
    TransactionState,
};
use serde_json::{json, Value};
use tempfile::{NamedTempFile, TempDir};

fn b64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn offset_line(group_id: &str, topic: &str, partition: i32, offset: i64, ts: i64) -> Value {
    let value = OffsetCommitValue {
        version: 1,
        offset,
        leader_epoch: None,
        metadata: None,
        commit_timestamp: Some(ts),
        expire_timestamp: Some(ts + 86_400_000),
    };
    json!({
        "source": "group_log",
        "key": b64(&group::encode_offset_key(group_id, &TopicPartition::new(topic, partition))),
        "value": b64(&group::encode_offset_value(&value)),
    })
}

fn group_line(group_id: &str, member: &str, topic: &str) -> Value {
    let value = GroupMetadataValue {
        version: 2,
        protocol_type: "consumer".to_string(),
        generation: 1,
        protocol: Some("range".to_string()),
        leader: Some(member.to_string()),
        current_state_timestamp: Some(1_000),
        members: vec![MemberMetadataValue {
            member_id: member.to_string(),
            group_instance_id: None,
            client_id: "worker".to_string(),
            client_host: "/10.0.0.7".to_string(),
            rebalance_timeout_ms: Some(30_000),
            session_timeout_ms: 10_000,
            assignment: [TopicPartition::new(topic, 0)].into_iter().collect(),
        }],
    };
    json!({
        "source": "group_log",
        "key": b64(&group::encode_group_key(group_id)),
        "value": b64(&group::encode_group_value(&value)),
        "coordinator": 1,
    })
}

fn txn_line(id: &str, state: TransactionState, start: i64, update: i64) -> Value {
    let value = TransactionLogValue {
        version: 0,
        producer_id: 4000,
        producer_epoch: 2,
        timeout_ms: 60_000,
        state,
        partitions: vec![TopicPartition::new("payments", 0)],
        last_update_timestamp: update,
        start_timestamp: start,
    };
    json!({
        "source": "transaction_log",
        "key": b64(&transaction::encode_key(id)),
        "value": b64(&transaction::encode_value(&value)),
    })
}

fn topic_lines() -> Vec<Value> {
    let assignment = TopicAssignmentValue {
        partitions: BTreeMap::from([(0, vec![1, 2]), (1, vec![2, 3])]),
    };
    let state = PartitionStateValue {
        leader: 2,
        isr: vec![2],
        leader_epoch: 4,
        controller_epoch: 1,
    };
    let config = TopicConfigValue {
        config: BTreeMap::from([("retention.ms".to_string(), "3600000".to_string())]),
    };
    vec![
        json!({
            "source": "coordination",
            "kind": "node_added",
            "path": format!("{}/orders", coordination::TOPICS_ROOT),
            "data": b64(&coordination::encode_assignment(&assignment)),
        }),
        json!({
            "source": "coordination",
            "kind": "node_added",
            "path": format!("{}/orders/partitions/1/state", coordination::TOPICS_ROOT),
            "data": b64(&coordination::encode_partition_state(&state)),
        }),
        json!({
            "source": "coordination",
            "kind": "node_added",
            "path": format!("{}/orders", coordination::TOPIC_CONFIG_ROOT),
            "data": b64(&coordination::encode_topic_config(&config)),
        }),
    ]
}

fn sample_capture() -> NamedTempFile {
    let mut lines = vec![
        json!({"source": "admin_group", "group_id": "billing", "coordinator": 3,
               "state": "Empty", "partition_assignor": null, "members": []}),
        json!({"source": "admin_offset", "group_id": "billing", "topic": "invoices",
               "partition": 0, "offset": 7}),
        group_line("analytics", "member-1", "orders"),
        offset_line("analytics", "orders", 0, 10, 60_000),
        offset_line("analytics", "orders", 0, 40, 180_000),
        offset_line("analytics", "orders", 1, 5, 60_000),
        txn_line("payments-writer", TransactionState::Ongoing, 1_000, 1_000),
        txn_line("payments-writer", TransactionState::CompleteCommit, 1_000, 1_500),
        txn_line("payments-writer", TransactionState::CompleteAbort, 2_000, 2_100),
    ];
    lines.extend(topic_lines());

    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "# sample capture").unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file
}

/// Run lensctl with an isolated HOME so no user config leaks in
fn lensctl(home: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lensctl"))
        .args(args)
        .env("HOME", home.path())
        .env_remove("CLUSTERLENS_CONFIG")
        .env_remove("CLUSTERLENS_CAPTURE")
        .env_remove("CLUSTERLENS_OUTPUT")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute lensctl")
}

fn json_output(home: &TempDir, capture: &NamedTempFile, args: &[&str]) -> Value {
    let path = capture.path().to_str().unwrap();
    let mut full = vec!["--capture", path, "--output", "json"];
    full.extend_from_slice(args);
    let output = lensctl(home, &full);
    assert!(
        output.status.success(),
        "lensctl {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_help_flag() {
    let home = TempDir::new().unwrap();
    let output = lensctl(&home, &["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("lensctl"));
    assert!(stdout.contains("groups"));
}

#[test]
fn test_invalid_subcommand_fails() {
    let home = TempDir::new().unwrap();
    let output = lensctl(&home, &["nonexistent-command"]);
    assert!(!output.status.success());
}

#[test]
fn test_missing_capture_is_an_error() {
    let home = TempDir::new().unwrap();
    let output = lensctl(&home, &["groups", "list"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("CLUSTERLENS_CAPTURE"));
}

#[test]
fn test_config_prints_defaults() {
    let home = TempDir::new().unwrap();
    let output = lensctl(&home, &["config"]);
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: toml::Value = toml::from_str(&stdout).unwrap();
    assert_eq!(parsed["time_series"]["granularity"].as_str(), Some("minute"));
    assert_eq!(parsed["transactions"]["history_size"].as_integer(), Some(16));
    assert_eq!(parsed["output"]["format"].as_str(), Some("table"));
}

#[test]
fn test_config_file_is_applied() {
    let home = TempDir::new().unwrap();
    let config_path = home.path().join("lens.toml");
    std::fs::write(&config_path, "[transactions]\nhistory_size = 2\n").unwrap();

    let output = lensctl(&home, &["--config", config_path.to_str().unwrap(), "config"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("history_size = 2"));

    std::fs::write(&config_path, "[time_series]\nmax_buckets = 0\n").unwrap();
    let output = lensctl(&home, &["--config", config_path.to_str().unwrap(), "config"]);
    assert!(!output.status.success());
}

#[test]
fn test_groups_list_merges_snapshot_and_log() {
    let home = TempDir::new().unwrap();
    let capture = sample_capture();

    let groups = json_output(&home, &capture, &["groups", "list"]);
    let groups = groups.as_array().unwrap();
    assert_eq!(groups.len(), 2);

    let analytics = &groups[0];
    assert_eq!(analytics["group_id"], "analytics");
    assert_eq!(analytics["state"], "Stable");
    assert_eq!(analytics["coordinator"], "1");
    assert_eq!(analytics["members"], 1);
    assert_eq!(analytics["partitions"], 2);
    assert_eq!(analytics["source"], "log");

    let billing = &groups[1];
    assert_eq!(billing["group_id"], "billing");
    assert_eq!(billing["state"], "Empty");
    assert_eq!(billing["source"], "snapshot");
}

#[test]
fn test_groups_list_by_topic() {
    let home = TempDir::new().unwrap();
    let capture = sample_capture();

    let groups = json_output(&home, &capture, &["groups", "list", "--topic", "invoices"]);
    let ids: Vec<&str> = groups
        .as_array()
        .unwrap()
        .iter()
        .map(|g| g["group_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["billing"]);
}

#[test]
fn test_group_get_document() {
    let home = TempDir::new().unwrap();
    let capture = sample_capture();

    let group = json_output(&home, &capture, &["groups", "get", "analytics"]);
    assert_eq!(group["protocol_type"], "consumer");
    assert_eq!(group["members"][0]["client_id"], "worker");
    assert_eq!(group["offsets"].as_array().unwrap().len(), 2);
    assert_eq!(group["offsets"][0][0]["topic"], "orders");
    assert_eq!(group["offsets"][0][1]["offset"], 40);
}

#[test]
fn test_group_rates() {
    let home = TempDir::new().unwrap();
    let capture = sample_capture();

    let rates = json_output(&home, &capture, &["groups", "rates", "analytics"]);
    let rates = rates.as_array().unwrap();
    assert_eq!(rates.len(), 2);
    assert_eq!(rates[0]["partition"], "orders-0");
    assert_eq!(rates[0]["offset"], "40");
    assert_eq!(rates[0]["delta"], "30");
    assert_eq!(rates[0]["per_sec"], "0.25");
    assert_eq!(rates[0]["per_minute"], "15.00");
    // A single commit gives no rate
    assert_eq!(rates[1]["per_sec"], "-");
}

#[test]
fn test_unknown_group_fails() {
    let home = TempDir::new().unwrap();
    let capture = sample_capture();
    let path = capture.path().to_str().unwrap();

    let output = lensctl(&home, &["--capture", path, "groups", "get", "nope"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}

#[test]
fn test_transactions_list_and_get() {
    let home = TempDir::new().unwrap();
    let capture = sample_capture();

    let txns = json_output(&home, &capture, &["transactions", "list", "--topic", "payments"]);
    let txn = &txns[0];
    assert_eq!(txn["transactional_id"], "payments-writer");
    assert_eq!(txn["state"], "CompleteAbort");
    assert_eq!(txn["producer_id"], "4000");
    assert_eq!(txn["commits"], 1);
    assert_eq!(txn["aborts"], 1);
    assert_eq!(txn["mean_execution_ms"], "500.00");

    let empty = json_output(&home, &capture, &["transactions", "list", "--topic", "orders"]);
    assert!(empty.as_array().unwrap().is_empty());

    let rates = json_output(&home, &capture, &["transactions", "rates", "payments-writer"]);
    let series: Vec<&str> = rates
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["series"].as_str().unwrap())
        .collect();
    assert!(series.contains(&"payments-writer-commits"));
    assert!(series.contains(&"payments-writer-aborts"));
}

#[test]
fn test_topics_partitions() {
    let home = TempDir::new().unwrap();
    let capture = sample_capture();

    let topics = json_output(&home, &capture, &["topics", "list"]);
    assert_eq!(topics[0]["name"], "orders");
    assert_eq!(topics[0]["partitions"], 2);
    assert_eq!(topics[0]["replication_factor"], "2");
    assert_eq!(topics[0]["under_replicated"], 1);
    assert_eq!(topics[0]["config_entries"], 1);

    let partitions = json_output(&home, &capture, &["topics", "partitions", "orders"]);
    assert_eq!(partitions[0]["replicas"], "1,2");
    assert_eq!(partitions[0]["leader"], "-");
    assert_eq!(partitions[1]["leader"], "2");
    assert_eq!(partitions[1]["isr"], "2");

    let topic = json_output(&home, &capture, &["topics", "get", "orders"]);
    assert_eq!(topic["config"]["retention.ms"], "3600000");
}

#[test]
fn test_table_output() {
    let home = TempDir::new().unwrap();
    let capture = sample_capture();
    let path = capture.path().to_str().unwrap();

    let output = lensctl(&home, &["--capture", path, "--no-color", "topics", "get", "orders"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Topic orders"));
    assert!(stdout.contains("retention.ms"));
}

#[test]
fn test_metrics_after_replay() {
    let home = TempDir::new().unwrap();
    let capture = sample_capture();
    let path = capture.path().to_str().unwrap();

    let output = lensctl(&home, &["--capture", path, "metrics"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("clusterlens_records_applied_total"));
    assert!(stdout.contains("clusterlens_watch_events_total"));
}
