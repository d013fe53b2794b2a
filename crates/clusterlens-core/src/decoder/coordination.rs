//! Coordination tree decoder
//!
//! Topic metadata lives in the coordination service as JSON nodes:
//!
//! ```text
//! /brokers/topics/<topic>                          assignment
//!     {"version":1..3,"partitions":{"0":[1,2,3],"1":[2,3,1]}}
//! /brokers/topics/<topic>/partitions/<id>/state    leadership
//!     {"version":1,"leader":1,"isr":[1,2],"leader_epoch":4,"controller_epoch":2}
//! /config/topics/<topic>                           configuration
//!     {"version":1,"config":{"retention.ms":"86400000"}}
//! ```
//!
//! Any other node under the watched roots (the `partitions` container, a
//! bare partition node) is not an entity and matches no key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeError, Result};
use crate::record::{
    PartitionStateValue, RecordKey, RecordValue, TopicAssignmentValue, TopicConfigValue,
};
use crate::types::TopicPartition;

pub const TOPICS_ROOT: &str = "/brokers/topics";
pub const TOPIC_CONFIG_ROOT: &str = "/config/topics";

/// Match a node path to the entity it describes.
pub fn match_path(path: &str) -> Result<Option<RecordKey>> {
    let tokens: Vec<&str> = path.split('/').filter(|t| !t.is_empty()).collect();
    match tokens.as_slice() {
        ["brokers", "topics", topic] => Ok(Some(RecordKey::TopicAssignment {
            topic: topic.to_string(),
        })),
        ["brokers", "topics", topic, "partitions", partition, "state"] => {
            let partition = partition
                .parse::<i32>()
                .map_err(|_| DecodeError::InvalidPath(path.to_string()))?;
            Ok(Some(RecordKey::PartitionState {
                topic_partition: TopicPartition::new(*topic, partition),
            }))
        }
        ["config", "topics", topic] => Ok(Some(RecordKey::TopicConfig {
            topic: topic.to_string(),
        })),
        _ => Ok(None),
    }
}

fn schema_version(kind: &'static str, json: &Value, supported: &[i64]) -> Result<()> {
    let version = json.get("version").and_then(Value::as_i64);
    match version {
        Some(v) if supported.contains(&v) => Ok(()),
        version => Err(DecodeError::UnsupportedSchemaVersion { kind, version }),
    }
}

#[derive(Deserialize)]
struct AssignmentNode {
    #[serde(default)]
    partitions: BTreeMap<String, Vec<i32>>,
}

#[derive(Deserialize)]
struct StateNode {
    leader: i32,
    #[serde(default)]
    isr: Vec<i32>,
    #[serde(default)]
    leader_epoch: i32,
    #[serde(default)]
    controller_epoch: i32,
}

#[derive(Deserialize)]
struct ConfigNode {
    #[serde(default)]
    config: BTreeMap<String, String>,
}

/// Decode a node payload for an already-matched key.
pub fn decode_value(key: &RecordKey, data: &[u8]) -> Result<RecordValue> {
    let json: Value = serde_json::from_slice(data)?;
    match key {
        RecordKey::TopicAssignment { .. } => {
            schema_version("topic assignment", &json, &[1, 2, 3])?;
            let node: AssignmentNode = serde_json::from_value(json)?;
            let mut partitions = BTreeMap::new();
            for (id, replicas) in node.partitions {
                let id = id.parse::<i32>().map_err(|_| DecodeError::Malformed {
                    kind: "topic assignment",
                    reason: format!("partition id {:?} is not an integer", id),
                })?;
                partitions.insert(id, replicas);
            }
            Ok(RecordValue::TopicAssignment(TopicAssignmentValue { partitions }))
        }
        RecordKey::PartitionState { .. } => {
            schema_version("partition state", &json, &[1])?;
            let node: StateNode = serde_json::from_value(json)?;
            Ok(RecordValue::PartitionState(PartitionStateValue {
                leader: node.leader,
                isr: node.isr,
                leader_epoch: node.leader_epoch,
                controller_epoch: node.controller_epoch,
            }))
        }
        RecordKey::TopicConfig { .. } => {
            schema_version("topic config", &json, &[1])?;
            let node: ConfigNode = serde_json::from_value(json)?;
            Ok(RecordValue::TopicConfig(TopicConfigValue {
                config: node.config,
            }))
        }
        other => Err(DecodeError::Malformed {
            kind: "coordination",
            reason: format!("{} records are not stored in the coordination tree", other.kind()),
        }),
    }
}

#[derive(Serialize)]
struct AssignmentOut<'a> {
    version: i64,
    partitions: BTreeMap<String, &'a Vec<i32>>,
}

pub fn encode_assignment(value: &TopicAssignmentValue) -> Vec<u8> {
    let out = AssignmentOut {
        version: 1,
        partitions: value
            .partitions
            .iter()
            .map(|(id, replicas)| (id.to_string(), replicas))
            .collect(),
    };
    serde_json::to_vec(&out).unwrap_or_default()
}

pub fn encode_partition_state(value: &PartitionStateValue) -> Vec<u8> {
    serde_json::json!({
        "version": 1,
        "leader": value.leader,
        "isr": value.isr,
        "leader_epoch": value.leader_epoch,
        "controller_epoch": value.controller_epoch,
    })
    .to_string()
    .into_bytes()
}

pub fn encode_topic_config(value: &TopicConfigValue) -> Vec<u8> {
    serde_json::json!({ "version": 1, "config": value.config })
        .to_string()
        .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment_key() -> RecordKey {
        RecordKey::TopicAssignment {
            topic: "orders".to_string(),
        }
    }

    #[test]
    fn test_match_paths() {
        assert_eq!(
            match_path("/brokers/topics/orders").unwrap(),
            Some(assignment_key())
        );
        assert_eq!(
            match_path("/brokers/topics/orders/partitions/3/state").unwrap(),
            Some(RecordKey::PartitionState {
                topic_partition: TopicPartition::new("orders", 3)
            })
        );
        assert_eq!(
            match_path("/config/topics/orders").unwrap(),
            Some(RecordKey::TopicConfig {
                topic: "orders".to_string()
            })
        );
        assert_eq!(match_path("/brokers/topics").unwrap(), None);
        assert_eq!(match_path("/brokers/topics/orders/partitions").unwrap(), None);
        assert_eq!(match_path("/brokers/topics/orders/partitions/3").unwrap(), None);
        assert_eq!(match_path("/brokers/ids/1").unwrap(), None);
    }

    #[test]
    fn test_bad_partition_token() {
        assert!(matches!(
            match_path("/brokers/topics/orders/partitions/x/state"),
            Err(DecodeError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_assignment_versions() {
        for version in 1..=3 {
            let data = format!(
                r#"{{"version":{},"partitions":{{"0":[1,2],"1":[2,3]}},"adding_replicas":{{}}}}"#,
                version
            );
            let value = decode_value(&assignment_key(), data.as_bytes()).unwrap();
            match value {
                RecordValue::TopicAssignment(a) => {
                    assert_eq!(a.partitions.len(), 2);
                    assert_eq!(a.partitions[&1], vec![2, 3]);
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_unsupported_and_missing_version() {
        let result = decode_value(&assignment_key(), br#"{"version":4,"partitions":{}}"#);
        assert!(matches!(
            result,
            Err(DecodeError::UnsupportedSchemaVersion {
                version: Some(4),
                ..
            })
        ));

        let result = decode_value(&assignment_key(), br#"{"partitions":{}}"#);
        assert!(matches!(
            result,
            Err(DecodeError::UnsupportedSchemaVersion { version: None, .. })
        ));
    }

    #[test]
    fn test_partition_state() {
        let key = RecordKey::PartitionState {
            topic_partition: TopicPartition::new("orders", 0),
        };
        let expected = PartitionStateValue {
            leader: 2,
            isr: vec![2, 3],
            leader_epoch: 7,
            controller_epoch: 1,
        };
        let value = decode_value(&key, &encode_partition_state(&expected)).unwrap();
        assert_eq!(value, RecordValue::PartitionState(expected));

        let v2 = br#"{"version":2,"leader":1,"isr":[1]}"#;
        assert!(decode_value(&key, v2).is_err());
    }

    #[test]
    fn test_topic_config() {
        let key = RecordKey::TopicConfig {
            topic: "orders".to_string(),
        };
        let mut config = BTreeMap::new();
        config.insert("cleanup.policy".to_string(), "compact".to_string());
        let expected = TopicConfigValue { config };
        let value = decode_value(&key, &encode_topic_config(&expected)).unwrap();
        assert_eq!(value, RecordValue::TopicConfig(expected));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            decode_value(&assignment_key(), b"{not json"),
            Err(DecodeError::Json(_))
        ));
    }
}
