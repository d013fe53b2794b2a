//! Edge-case tests for the record decoders, driven through the public
//! `decode` entry point the way a feed would call it.

use std::collections::BTreeSet;

use clusterlens_core::decoder::{coordination, group, transaction};
use clusterlens_core::{
    decode, DecodeError, Delta, FeedKind, GroupMetadataValue, MemberMetadataValue, RecordKey,
    RecordValue, TopicPartition, TransactionLogValue, TransactionState,
};

// ---------------------------------------------------------------
// Group log
// ---------------------------------------------------------------

fn member(id: &str, partitions: &[(&str, i32)]) -> MemberMetadataValue {
    MemberMetadataValue {
        member_id: id.to_string(),
        group_instance_id: None,
        client_id: format!("client-{id}"),
        client_host: "/127.0.0.1".to_string(),
        rebalance_timeout_ms: Some(60_000),
        session_timeout_ms: 10_000,
        assignment: partitions
            .iter()
            .map(|(t, p)| TopicPartition::new(*t, *p))
            .collect(),
    }
}

#[test]
fn group_metadata_flexible_version_through_decode() {
    let value = GroupMetadataValue {
        version: 4,
        protocol_type: "consumer".to_string(),
        generation: 12,
        protocol: Some("cooperative-sticky".to_string()),
        leader: Some("m1".to_string()),
        current_state_timestamp: Some(1_700_000_000_000),
        members: vec![
            member("m1", &[("orders", 0), ("orders", 1)]),
            member("m2", &[("orders", 2)]),
        ],
    };
    let key = group::encode_group_key("billing");
    let bytes = group::encode_group_value(&value);

    let record = decode(FeedKind::GroupLog, &key, Some(bytes.as_slice()))
        .unwrap()
        .unwrap();
    match record.delta {
        Delta::Upsert(RecordValue::GroupMetadata(decoded)) => {
            assert_eq!(decoded.members.len(), 2);
            let all: BTreeSet<_> = decoded
                .members
                .iter()
                .flat_map(|m| m.assignment.iter().cloned())
                .collect();
            assert_eq!(all.len(), 3);
            assert_eq!(decoded.protocol.as_deref(), Some("cooperative-sticky"));
        }
        other => panic!("unexpected delta {:?}", other),
    }
}

#[test]
fn group_metadata_without_members_is_empty() {
    let value = GroupMetadataValue {
        version: 2,
        protocol_type: String::new(),
        generation: 0,
        protocol: None,
        leader: None,
        current_state_timestamp: None,
        members: Vec::new(),
    };
    let decoded = group::decode_group_value(&group::encode_group_value(&value)).unwrap();
    assert_eq!(decoded.state(), clusterlens_core::GroupState::Empty);
}

#[test]
fn every_truncation_of_an_offset_value_fails_cleanly() {
    let value = clusterlens_core::OffsetCommitValue {
        version: 3,
        offset: 99,
        leader_epoch: Some(1),
        metadata: Some("m".to_string()),
        commit_timestamp: Some(5),
        expire_timestamp: None,
    };
    let bytes = group::encode_offset_value(&value);
    for cut in 0..bytes.len() {
        assert!(
            group::decode_offset_value(&bytes[..cut]).is_err(),
            "prefix of {} bytes decoded",
            cut
        );
    }
    assert!(group::decode_offset_value(&bytes).is_ok());
}

// ---------------------------------------------------------------
// Transaction log
// ---------------------------------------------------------------

#[test]
fn transaction_record_through_decode() {
    let value = TransactionLogValue {
        version: 1,
        producer_id: 7,
        producer_epoch: 0,
        timeout_ms: 900_000,
        state: TransactionState::PrepareEpochFence,
        partitions: vec![TopicPartition::new("ledger", 3)],
        last_update_timestamp: 20,
        start_timestamp: 10,
    };
    let key = transaction::encode_key("payments-tx");
    let bytes = transaction::encode_value(&value);
    let record = decode(FeedKind::TransactionLog, &key, Some(bytes.as_slice()))
        .unwrap()
        .unwrap();
    assert_eq!(
        record.key,
        RecordKey::Transaction {
            transactional_id: "payments-tx".to_string()
        }
    );
    assert_eq!(record.delta, Delta::Upsert(RecordValue::Transaction(value)));
}

#[test]
fn transaction_tombstone() {
    let key = transaction::encode_key("payments-tx");
    let record = decode(FeedKind::TransactionLog, &key, None).unwrap().unwrap();
    assert!(record.delta.is_tombstone());
}

// ---------------------------------------------------------------
// Coordination tree
// ---------------------------------------------------------------

#[test]
fn coordination_unsupported_version_is_scoped_error() {
    let path = b"/brokers/topics/orders/partitions/0/state";
    let err = decode(
        FeedKind::Coordination,
        path,
        Some(&br#"{"version":9,"leader":1,"isr":[1]}"#[..]),
    )
    .unwrap_err();
    assert_eq!(err.label(), "unsupported_schema_version");

    // The next record on the same path decodes normally
    let ok = decode(
        FeedKind::Coordination,
        path,
        Some(&br#"{"version":1,"leader":1,"isr":[1],"leader_epoch":0,"controller_epoch":0}"#[..]),
    )
    .unwrap();
    assert!(ok.is_some());
}

#[test]
fn coordination_assignment_with_non_numeric_partition() {
    let result = decode(
        FeedKind::Coordination,
        b"/brokers/topics/orders",
        Some(&br#"{"version":1,"partitions":{"zero":[1]}}"#[..]),
    );
    assert!(matches!(result, Err(DecodeError::Malformed { .. })));
}

#[test]
fn coordination_encoders_feed_decode() {
    let assignment = clusterlens_core::TopicAssignmentValue {
        partitions: [(0, vec![1, 2]), (1, vec![2, 1])].into_iter().collect(),
    };
    let bytes = coordination::encode_assignment(&assignment);
    let record = decode(
        FeedKind::Coordination,
        b"/brokers/topics/orders",
        Some(bytes.as_slice()),
    )
    .unwrap()
    .unwrap();
    assert_eq!(
        record.delta,
        Delta::Upsert(RecordValue::TopicAssignment(assignment))
    );
}
