//! Record decoding
//!
//! Turns a raw `(key, value or null)` feed record into a [`DecodedRecord`].
//! Decoding is a pure function of its input: no state is shared between
//! calls, so decoders can run on any feed thread.
//!
//! ## Dispatch
//!
//! The feed kind selects the key format ([`FeedKind`]). The key then selects
//! the value format:
//!
//! | Feed | Key | Value |
//! |------|-----|-------|
//! | group log | v0/v1 offset key | offset commit v0-v4 |
//! | group log | v2 group key | group metadata v0-v4 |
//! | transaction log | v0 transaction key | transaction v0-v1 |
//! | coordination tree | node path | versioned JSON blob |
//!
//! A null value is a tombstone for whatever key it carries. A coordination
//! path that names no entity decodes to `Ok(None)`.
//!
//! ## Errors
//!
//! Every failure is a [`DecodeError`] scoped to the one record. Callers log
//! it, count it and continue with the next record.

pub mod coordination;
pub mod group;
pub mod transaction;

use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Result};
use crate::record::{DecodedRecord, RecordKey, RecordValue};

/// Which feed a raw record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    /// Consumer group and offset commit log
    GroupLog,
    /// Transaction coordinator log
    TransactionLog,
    /// Coordination tree; the key is the node path in UTF-8
    Coordination,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::GroupLog => "group_log",
            FeedKind::TransactionLog => "transaction_log",
            FeedKind::Coordination => "coordination",
        }
    }
}

/// Decode one raw record.
pub fn decode(kind: FeedKind, key: &[u8], value: Option<&[u8]>) -> Result<Option<DecodedRecord>> {
    let record_key = match kind {
        FeedKind::GroupLog => group::decode_key(key)?,
        FeedKind::TransactionLog => transaction::decode_key(key)?,
        FeedKind::Coordination => {
            let path =
                std::str::from_utf8(key).map_err(|_| DecodeError::InvalidUtf8("node path"))?;
            match coordination::match_path(path)? {
                Some(record_key) => record_key,
                None => return Ok(None),
            }
        }
    };

    let value = match value {
        Some(value) => value,
        None => return Ok(Some(DecodedRecord::tombstone(record_key))),
    };

    let record_value = match &record_key {
        RecordKey::GroupMetadata { .. } => {
            RecordValue::GroupMetadata(group::decode_group_value(value)?)
        }
        RecordKey::Offset { .. } => RecordValue::OffsetCommit(group::decode_offset_value(value)?),
        RecordKey::Transaction { .. } => {
            RecordValue::Transaction(transaction::decode_value(value)?)
        }
        RecordKey::TopicAssignment { .. }
        | RecordKey::PartitionState { .. }
        | RecordKey::TopicConfig { .. } => coordination::decode_value(&record_key, value)?,
    };

    Ok(Some(DecodedRecord::upsert(record_key, record_value)))
}
