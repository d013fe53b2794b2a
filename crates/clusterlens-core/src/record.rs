//! Decoded Record Types
//!
//! The typed form of every record the decoders understand. A raw feed record
//! is a `(key bytes, value bytes or null)` pair; decoding it yields a
//! [`DecodedRecord`]: the identity of the entity it describes ([`RecordKey`])
//! and what happened to it ([`Delta`]).
//!
//! ## Entity Kinds
//! - **Group metadata**: membership and protocol of one consumer group
//! - **Offset commit**: committed position of one group on one partition
//! - **Transaction**: one transaction-coordinator snapshot for a transactional id
//! - **Topic assignment**: replica list of every partition of a topic
//! - **Partition state**: leader, ISR and epochs of one partition
//! - **Topic config**: per-topic configuration overrides
//!
//! ## Tombstones
//! A null value for any known key is a tombstone ([`Delta::Tombstone`]). It is
//! never a decode error.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::types::{GroupState, TopicPartition, TransactionState};

/// Identity of the entity a record describes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKey {
    GroupMetadata { group: String },
    Offset {
        group: String,
        topic_partition: TopicPartition,
    },
    Transaction { transactional_id: String },
    TopicAssignment { topic: String },
    PartitionState { topic_partition: TopicPartition },
    TopicConfig { topic: String },
}

impl RecordKey {
    /// Identifier of the cache entry this record belongs to: the group id,
    /// transactional id or topic name.
    pub fn entity_id(&self) -> &str {
        match self {
            RecordKey::GroupMetadata { group } | RecordKey::Offset { group, .. } => group,
            RecordKey::Transaction { transactional_id } => transactional_id,
            RecordKey::TopicAssignment { topic } | RecordKey::TopicConfig { topic } => topic,
            RecordKey::PartitionState { topic_partition } => &topic_partition.topic,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RecordKey::GroupMetadata { .. } => "group_metadata",
            RecordKey::Offset { .. } => "offset",
            RecordKey::Transaction { .. } => "transaction",
            RecordKey::TopicAssignment { .. } => "topic_assignment",
            RecordKey::PartitionState { .. } => "partition_state",
            RecordKey::TopicConfig { .. } => "topic_config",
        }
    }
}

/// What happened to the entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Delta {
    Upsert(RecordValue),
    Tombstone,
}

impl Delta {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Delta::Tombstone)
    }
}

/// A fully decoded feed record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedRecord {
    pub key: RecordKey,
    pub delta: Delta,
}

impl DecodedRecord {
    pub fn upsert(key: RecordKey, value: RecordValue) -> Self {
        Self {
            key,
            delta: Delta::Upsert(value),
        }
    }

    pub fn tombstone(key: RecordKey) -> Self {
        Self {
            key,
            delta: Delta::Tombstone,
        }
    }
}

/// Typed record payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecordValue {
    GroupMetadata(GroupMetadataValue),
    OffsetCommit(OffsetCommitValue),
    Transaction(TransactionLogValue),
    TopicAssignment(TopicAssignmentValue),
    PartitionState(PartitionStateValue),
    TopicConfig(TopicConfigValue),
}

/// Group metadata as written by the group coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetadataValue {
    /// Schema version the value was written with
    pub version: i16,

    /// Protocol type, e.g. `consumer` or `connect`. Empty for offset-only groups.
    pub protocol_type: String,

    pub generation: i32,

    /// Selected partition assignor
    pub protocol: Option<String>,

    /// Member id of the group leader
    pub leader: Option<String>,

    /// Time of the last state transition (v2+)
    pub current_state_timestamp: Option<i64>,

    pub members: Vec<MemberMetadataValue>,
}

impl GroupMetadataValue {
    /// The log does not record the lifecycle state itself; a group with no
    /// members is `Empty`, any other group is `Stable`.
    pub fn state(&self) -> GroupState {
        if self.members.is_empty() {
            GroupState::Empty
        } else {
            GroupState::Stable
        }
    }
}

/// One member entry of a group metadata record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberMetadataValue {
    pub member_id: String,

    /// Static membership id (v3+)
    pub group_instance_id: Option<String>,

    pub client_id: String,
    pub client_host: String,

    /// Rebalance timeout in ms (v1+)
    pub rebalance_timeout_ms: Option<i32>,

    pub session_timeout_ms: i32,

    /// Partitions from the decoded consumer-protocol assignment
    pub assignment: BTreeSet<TopicPartition>,
}

/// Committed offset of one group on one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetCommitValue {
    pub version: i16,
    pub offset: i64,

    /// Leader epoch at commit time (v3+)
    pub leader_epoch: Option<i32>,

    /// Free-text commit metadata; empty strings decode to `None`
    pub metadata: Option<String>,

    pub commit_timestamp: Option<i64>,

    /// Explicit retention deadline (v1 only)
    pub expire_timestamp: Option<i64>,
}

/// One transaction-coordinator snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLogValue {
    pub version: i16,
    pub producer_id: i64,
    pub producer_epoch: i16,
    pub timeout_ms: i32,
    pub state: TransactionState,

    /// Partitions enlisted in the transaction; a null array decodes as empty
    pub partitions: Vec<TopicPartition>,

    pub last_update_timestamp: i64,
    pub start_timestamp: i64,
}

impl TransactionLogValue {
    pub fn topics(&self) -> BTreeSet<String> {
        self.partitions.iter().map(|tp| tp.topic.clone()).collect()
    }
}

/// Replica assignment of every partition of a topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicAssignmentValue {
    /// Partition id -> replica broker ids
    pub partitions: BTreeMap<i32, Vec<i32>>,
}

/// Leadership and ISR of one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionStateValue {
    pub leader: i32,
    pub isr: Vec<i32>,
    pub leader_epoch: i32,
    pub controller_epoch: i32,
}

/// Per-topic configuration overrides
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopicConfigValue {
    pub config: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_per_key_kind() {
        let offset = RecordKey::Offset {
            group: "g1".to_string(),
            topic_partition: TopicPartition::new("orders", 3),
        };
        assert_eq!(offset.entity_id(), "g1");
        assert_eq!(offset.kind(), "offset");

        let state = RecordKey::PartitionState {
            topic_partition: TopicPartition::new("orders", 3),
        };
        assert_eq!(state.entity_id(), "orders");
    }

    #[test]
    fn test_group_state_follows_membership() {
        let mut value = GroupMetadataValue {
            version: 3,
            protocol_type: "consumer".to_string(),
            generation: 1,
            protocol: Some("range".to_string()),
            leader: None,
            current_state_timestamp: None,
            members: Vec::new(),
        };
        assert_eq!(value.state(), GroupState::Empty);

        value.members.push(MemberMetadataValue {
            member_id: "m-1".to_string(),
            group_instance_id: None,
            client_id: "c".to_string(),
            client_host: "/10.0.0.1".to_string(),
            rebalance_timeout_ms: None,
            session_timeout_ms: 10_000,
            assignment: BTreeSet::new(),
        });
        assert_eq!(value.state(), GroupState::Stable);
    }

    #[test]
    fn test_transaction_topics_are_deduplicated() {
        let value = TransactionLogValue {
            version: 0,
            producer_id: 1,
            producer_epoch: 0,
            timeout_ms: 60_000,
            state: TransactionState::Ongoing,
            partitions: vec![
                TopicPartition::new("a", 0),
                TopicPartition::new("a", 1),
                TopicPartition::new("b", 0),
            ],
            last_update_timestamp: 10,
            start_timestamp: 5,
        };
        let topics: Vec<_> = value.topics().into_iter().collect();
        assert_eq!(topics, vec!["a".to_string(), "b".to_string()]);
    }
}
