//! Group log decoder
//!
//! The group log carries two record kinds on one compacted topic, told apart
//! by the key version:
//!
//! ```text
//! key v0-v1: offset commit     (group, topic, partition)
//! key v2:    group metadata    (group)
//! ```
//!
//! Offset values (v0-v4):
//!
//! ```text
//! v0: offset i64, metadata string, commit_ts i64
//! v1: offset i64, metadata string, commit_ts i64, expire_ts i64
//! v2: offset i64, metadata string, commit_ts i64
//! v3: offset i64, leader_epoch i32, metadata string, commit_ts i64
//! v4: v3 fields, flexible encoding
//! ```
//!
//! Group metadata values (v0-v4, v4 flexible) list the members with their
//! consumer-protocol assignment, which is decoded into a partition set when
//! the protocol type is `consumer`.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::codec::{Reader, Writer};
use crate::error::{DecodeError, Result};
use crate::record::{GroupMetadataValue, MemberMetadataValue, OffsetCommitValue, RecordKey};
use crate::types::TopicPartition;

const OFFSET_KEY_VERSION: i16 = 1;
const GROUP_KEY_VERSION: i16 = 2;
const CONSUMER_PROTOCOL: &str = "consumer";

/// Decode a group log key into a group-metadata or offset key.
pub fn decode_key(key: &[u8]) -> Result<RecordKey> {
    let mut reader = Reader::new(key);
    let version = reader.read_i16()?;
    match version {
        0 | 1 => {
            let group = reader.read_string()?;
            let topic = reader.read_string()?;
            let partition = reader.read_i32()?;
            Ok(RecordKey::Offset {
                group,
                topic_partition: TopicPartition::new(topic, partition),
            })
        }
        2 => Ok(RecordKey::GroupMetadata {
            group: reader.read_string()?,
        }),
        version => Err(DecodeError::UnsupportedKeyVersion {
            kind: "group log",
            version,
        }),
    }
}

fn optional(value: i64) -> Option<i64> {
    if value < 0 {
        None
    } else {
        Some(value)
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Decode an offset commit value.
pub fn decode_offset_value(value: &[u8]) -> Result<OffsetCommitValue> {
    let mut reader = Reader::new(value);
    let version = reader.read_i16()?;
    if !(0..=4).contains(&version) {
        return Err(DecodeError::UnsupportedValueVersion {
            kind: "offset commit",
            version,
        });
    }
    let flexible = version >= 4;

    let offset = reader.read_i64()?;
    let leader_epoch = if version >= 3 {
        let epoch = reader.read_i32()?;
        if epoch < 0 {
            None
        } else {
            Some(epoch)
        }
    } else {
        None
    };
    let metadata = non_empty(reader.string(flexible)?);
    let commit_timestamp = optional(reader.read_i64()?);
    let expire_timestamp = if version == 1 {
        optional(reader.read_i64()?)
    } else {
        None
    };
    reader.tagged_fields(flexible)?;

    Ok(OffsetCommitValue {
        version,
        offset,
        leader_epoch,
        metadata,
        commit_timestamp,
        expire_timestamp,
    })
}

/// Decode a group metadata value.
pub fn decode_group_value(value: &[u8]) -> Result<GroupMetadataValue> {
    let mut reader = Reader::new(value);
    let version = reader.read_i16()?;
    if !(0..=4).contains(&version) {
        return Err(DecodeError::UnsupportedValueVersion {
            kind: "group metadata",
            version,
        });
    }
    let flexible = version >= 4;

    let protocol_type = reader.string(flexible)?;
    let generation = reader.read_i32()?;
    let protocol = reader.nullable_string(flexible)?;
    let leader = reader.nullable_string(flexible)?;
    let current_state_timestamp = if version >= 2 {
        optional(reader.read_i64()?)
    } else {
        None
    };
    let is_consumer = protocol_type == CONSUMER_PROTOCOL;
    let members = reader.array(flexible, |r| decode_member(r, version, flexible, is_consumer))?;
    reader.tagged_fields(flexible)?;

    Ok(GroupMetadataValue {
        version,
        protocol_type,
        generation,
        protocol,
        leader,
        current_state_timestamp,
        members,
    })
}

fn decode_member(
    reader: &mut Reader<'_>,
    version: i16,
    flexible: bool,
    is_consumer: bool,
) -> Result<MemberMetadataValue> {
    let member_id = reader.string(flexible)?;
    let group_instance_id = if version >= 3 {
        reader.nullable_string(flexible)?
    } else {
        None
    };
    let client_id = reader.string(flexible)?;
    let client_host = reader.string(flexible)?;
    let rebalance_timeout_ms = if version >= 1 {
        Some(reader.read_i32()?)
    } else {
        None
    };
    let session_timeout_ms = reader.read_i32()?;
    let _subscription = reader.nullable_bytes(flexible)?;
    let assignment_bytes = reader.nullable_bytes(flexible)?.unwrap_or_default();
    reader.tagged_fields(flexible)?;

    let assignment = if is_consumer {
        match decode_consumer_assignment(assignment_bytes) {
            Ok(assignment) => assignment,
            Err(e) => {
                debug!(member = %member_id, error = %e, "Undecodable member assignment");
                BTreeSet::new()
            }
        }
    } else {
        BTreeSet::new()
    };

    Ok(MemberMetadataValue {
        member_id,
        group_instance_id,
        client_id,
        client_host,
        rebalance_timeout_ms,
        session_timeout_ms,
        assignment,
    })
}

/// Decode a consumer-protocol assignment:
/// `version i16, [topic string, [partition i32]], user_data bytes`.
/// Empty input is an empty assignment.
pub fn decode_consumer_assignment(bytes: &[u8]) -> Result<BTreeSet<TopicPartition>> {
    if bytes.is_empty() {
        return Ok(BTreeSet::new());
    }
    let mut reader = Reader::new(bytes);
    let _version = reader.read_i16()?;
    let topics = reader.read_array(|r| {
        let topic = r.read_string()?;
        let partitions = r.read_array(|r| r.read_i32())?;
        Ok((topic, partitions))
    })?;
    // user_data and later-version fields are not needed

    Ok(topics
        .into_iter()
        .flat_map(|(topic, partitions)| {
            partitions
                .into_iter()
                .map(move |partition| TopicPartition::new(topic.clone(), partition))
        })
        .collect())
}

// Encoders, producing the same layouts the decoders read

pub fn encode_offset_key(group: &str, topic_partition: &TopicPartition) -> Vec<u8> {
    let mut writer = Writer::new();
    writer
        .put_i16(OFFSET_KEY_VERSION)
        .put_string(group)
        .put_string(&topic_partition.topic)
        .put_i32(topic_partition.partition);
    writer.into_bytes().to_vec()
}

pub fn encode_group_key(group: &str) -> Vec<u8> {
    let mut writer = Writer::new();
    writer.put_i16(GROUP_KEY_VERSION).put_string(group);
    writer.into_bytes().to_vec()
}

pub fn encode_offset_value(value: &OffsetCommitValue) -> Vec<u8> {
    let version = value.version;
    let flexible = version >= 4;
    let mut writer = Writer::new();
    writer.put_i16(version).put_i64(value.offset);
    if version >= 3 {
        writer.put_i32(value.leader_epoch.unwrap_or(-1));
    }
    writer
        .string(flexible, value.metadata.as_deref().unwrap_or(""))
        .put_i64(value.commit_timestamp.unwrap_or(-1));
    if version == 1 {
        writer.put_i64(value.expire_timestamp.unwrap_or(-1));
    }
    writer.tagged_fields(flexible);
    writer.into_bytes().to_vec()
}

pub fn encode_group_value(value: &GroupMetadataValue) -> Vec<u8> {
    let version = value.version;
    let flexible = version >= 4;
    let mut writer = Writer::new();
    writer
        .put_i16(version)
        .string(flexible, &value.protocol_type)
        .put_i32(value.generation)
        .nullable_string(flexible, value.protocol.as_deref())
        .nullable_string(flexible, value.leader.as_deref());
    if version >= 2 {
        writer.put_i64(value.current_state_timestamp.unwrap_or(-1));
    }
    writer.array_len(flexible, value.members.len());
    for member in &value.members {
        writer.string(flexible, &member.member_id);
        if version >= 3 {
            writer.nullable_string(flexible, member.group_instance_id.as_deref());
        }
        writer
            .string(flexible, &member.client_id)
            .string(flexible, &member.client_host);
        if version >= 1 {
            writer.put_i32(member.rebalance_timeout_ms.unwrap_or(-1));
        }
        let assignment = encode_consumer_assignment(&member.assignment);
        writer
            .put_i32(member.session_timeout_ms)
            .nullable_bytes(flexible, Some(&[][..]))
            .nullable_bytes(flexible, Some(assignment.as_slice()))
            .tagged_fields(flexible);
    }
    writer.tagged_fields(flexible);
    writer.into_bytes().to_vec()
}

pub fn encode_consumer_assignment(partitions: &BTreeSet<TopicPartition>) -> Vec<u8> {
    let mut by_topic: BTreeMap<&str, Vec<i32>> = BTreeMap::new();
    for tp in partitions {
        by_topic.entry(&tp.topic).or_default().push(tp.partition);
    }

    let mut writer = Writer::new();
    writer.put_i16(0).put_array_len(by_topic.len());
    for (topic, ids) in by_topic {
        writer.put_string(topic).put_array_len(ids.len());
        for id in ids {
            writer.put_i32(id);
        }
    }
    writer.put_nullable_bytes(None);
    writer.into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offset_value(version: i16) -> OffsetCommitValue {
        OffsetCommitValue {
            version,
            offset: 42,
            leader_epoch: if version >= 3 { Some(7) } else { None },
            metadata: Some("checkpoint".to_string()),
            commit_timestamp: Some(1_700_000_000_000),
            expire_timestamp: if version == 1 {
                Some(1_700_086_400_000)
            } else {
                None
            },
        }
    }

    fn group_value(version: i16) -> GroupMetadataValue {
        let assignment: BTreeSet<_> = [
            TopicPartition::new("orders", 0),
            TopicPartition::new("orders", 1),
            TopicPartition::new("payments", 4),
        ]
        .into_iter()
        .collect();

        GroupMetadataValue {
            version,
            protocol_type: "consumer".to_string(),
            generation: 5,
            protocol: Some("range".to_string()),
            leader: Some("member-1".to_string()),
            current_state_timestamp: if version >= 2 { Some(1_700_000_000_000) } else { None },
            members: vec![MemberMetadataValue {
                member_id: "member-1".to_string(),
                group_instance_id: if version >= 3 { Some("instance-a".to_string()) } else { None },
                client_id: "billing".to_string(),
                client_host: "/10.1.2.3".to_string(),
                rebalance_timeout_ms: if version >= 1 { Some(300_000) } else { None },
                session_timeout_ms: 45_000,
                assignment,
            }],
        }
    }

    #[test]
    fn test_key_versions() {
        let tp = TopicPartition::new("orders", 2);
        assert_eq!(
            decode_key(&encode_offset_key("g1", &tp)).unwrap(),
            RecordKey::Offset {
                group: "g1".to_string(),
                topic_partition: tp,
            }
        );
        assert_eq!(
            decode_key(&encode_group_key("g1")).unwrap(),
            RecordKey::GroupMetadata {
                group: "g1".to_string()
            }
        );

        let mut writer = Writer::new();
        writer.put_i16(3).put_string("g1");
        assert!(matches!(
            decode_key(&writer.into_bytes()),
            Err(DecodeError::UnsupportedKeyVersion { version: 3, .. })
        ));
    }

    #[test]
    fn test_every_offset_value_version() {
        for version in 0..=4 {
            let value = offset_value(version);
            let decoded = decode_offset_value(&encode_offset_value(&value)).unwrap();
            assert_eq!(decoded, value, "offset value v{}", version);
        }
    }

    #[test]
    fn test_offset_value_absent_fields() {
        let mut writer = Writer::new();
        writer
            .put_i16(3)
            .put_i64(10)
            .put_i32(-1)
            .put_string("")
            .put_i64(-1);
        let decoded = decode_offset_value(&writer.into_bytes()).unwrap();
        assert_eq!(decoded.leader_epoch, None);
        assert_eq!(decoded.metadata, None);
        assert_eq!(decoded.commit_timestamp, None);
    }

    #[test]
    fn test_unknown_offset_value_version() {
        let mut writer = Writer::new();
        writer.put_i16(5).put_i64(1);
        assert!(matches!(
            decode_offset_value(&writer.into_bytes()),
            Err(DecodeError::UnsupportedValueVersion { version: 5, .. })
        ));
    }

    #[test]
    fn test_every_group_value_version() {
        for version in 0..=4 {
            let value = group_value(version);
            let decoded = decode_group_value(&encode_group_value(&value)).unwrap();
            assert_eq!(decoded, value, "group value v{}", version);
        }
    }

    #[test]
    fn test_truncated_group_value() {
        let bytes = encode_group_value(&group_value(3));
        let result = decode_group_value(&bytes[..bytes.len() / 2]);
        assert!(matches!(result, Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn test_non_consumer_protocol_skips_assignment() {
        let mut value = group_value(3);
        value.protocol_type = "connect".to_string();
        let decoded = decode_group_value(&encode_group_value(&value)).unwrap();
        assert!(decoded.members[0].assignment.is_empty());
    }

    #[test]
    fn test_garbage_assignment_yields_empty_set() {
        // Consumer member whose assignment bytes are a lone byte
        let mut writer = Writer::new();
        writer
            .put_i16(1)
            .put_string("consumer")
            .put_i32(1)
            .put_nullable_string(Some("range"))
            .put_nullable_string(Some("m"))
            .put_array_len(1)
            .put_string("m")
            .put_string("client")
            .put_string("/host")
            .put_i32(1000)
            .put_i32(1000)
            .put_nullable_bytes(None)
            .put_nullable_bytes(Some(&[0x01][..]));

        let decoded = decode_group_value(&writer.into_bytes()).unwrap();
        assert_eq!(decoded.members.len(), 1);
        assert!(decoded.members[0].assignment.is_empty());
    }
}
