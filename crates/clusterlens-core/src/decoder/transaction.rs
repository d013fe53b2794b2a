//! Transaction log decoder
//!
//! ```text
//! key v0:   transactional_id string
//! value v0: producer_id i64, producer_epoch i16, timeout_ms i32, status i8,
//!           partitions [topic string, [partition i32]] (nullable),
//!           last_update_ts i64, start_ts i64
//! value v1: v0 fields, flexible encoding
//! ```

use crate::codec::{Reader, Writer};
use crate::error::{DecodeError, Result};
use crate::record::{RecordKey, TransactionLogValue};
use crate::types::{TopicPartition, TransactionState};

const KEY_VERSION: i16 = 0;

pub fn decode_key(key: &[u8]) -> Result<RecordKey> {
    let mut reader = Reader::new(key);
    let version = reader.read_i16()?;
    if version != KEY_VERSION {
        return Err(DecodeError::UnsupportedKeyVersion {
            kind: "transaction log",
            version,
        });
    }
    Ok(RecordKey::Transaction {
        transactional_id: reader.read_string()?,
    })
}

pub fn decode_value(value: &[u8]) -> Result<TransactionLogValue> {
    let mut reader = Reader::new(value);
    let version = reader.read_i16()?;
    if !(0..=1).contains(&version) {
        return Err(DecodeError::UnsupportedValueVersion {
            kind: "transaction log",
            version,
        });
    }
    let flexible = version >= 1;

    let producer_id = reader.read_i64()?;
    let producer_epoch = reader.read_i16()?;
    let timeout_ms = reader.read_i32()?;
    let state = TransactionState::from_code(reader.read_i8()?)?;
    let topics = reader.array(flexible, |r| {
        let topic = r.string(flexible)?;
        let partitions = r.array(flexible, |r| r.read_i32())?;
        r.tagged_fields(flexible)?;
        Ok((topic, partitions))
    })?;
    let last_update_timestamp = reader.read_i64()?;
    let start_timestamp = reader.read_i64()?;
    reader.tagged_fields(flexible)?;

    let partitions = topics
        .into_iter()
        .flat_map(|(topic, ids)| {
            ids.into_iter()
                .map(move |id| TopicPartition::new(topic.clone(), id))
        })
        .collect();

    Ok(TransactionLogValue {
        version,
        producer_id,
        producer_epoch,
        timeout_ms,
        state,
        partitions,
        last_update_timestamp,
        start_timestamp,
    })
}

pub fn encode_key(transactional_id: &str) -> Vec<u8> {
    let mut writer = Writer::new();
    writer.put_i16(KEY_VERSION).put_string(transactional_id);
    writer.into_bytes().to_vec()
}

pub fn encode_value(value: &TransactionLogValue) -> Vec<u8> {
    let flexible = value.version >= 1;
    let mut writer = Writer::new();
    writer
        .put_i16(value.version)
        .put_i64(value.producer_id)
        .put_i16(value.producer_epoch)
        .put_i32(value.timeout_ms)
        .put_i8(value.state.code());

    // Partitions are written grouped by topic, in first-seen order
    let mut grouped: Vec<(&str, Vec<i32>)> = Vec::new();
    for tp in &value.partitions {
        match grouped.iter_mut().find(|(topic, _)| *topic == tp.topic) {
            Some((_, ids)) => ids.push(tp.partition),
            None => grouped.push((tp.topic.as_str(), vec![tp.partition])),
        }
    }
    writer.array_len(flexible, grouped.len());
    for (topic, ids) in grouped {
        writer.string(flexible, topic).array_len(flexible, ids.len());
        for id in ids {
            writer.put_i32(id);
        }
        writer.tagged_fields(flexible);
    }

    writer
        .put_i64(value.last_update_timestamp)
        .put_i64(value.start_timestamp)
        .tagged_fields(flexible);
    writer.into_bytes().to_vec()
}
