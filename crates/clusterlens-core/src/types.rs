//! Shared identifiers and lifecycle enums
//!
//! These types appear both in decoded records and in the projections the
//! metadata caches build from them, so they live at the bottom of the stack.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// A topic name plus partition id. Ordered by topic, then partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

/// Serde adapter for maps keyed by [`TopicPartition`].
///
/// JSON object keys must be strings, so the map is written as a list of
/// `[topic_partition, value]` pairs instead.
///
/// ```ignore
/// #[serde(with = "clusterlens_core::types::partition_map")]
/// pub offsets: BTreeMap<TopicPartition, OffsetProjection>,
/// ```
pub mod partition_map {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::TopicPartition;

    pub fn serialize<V, S>(
        map: &BTreeMap<TopicPartition, V>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, V, D>(
        deserializer: D,
    ) -> Result<BTreeMap<TopicPartition, V>, D::Error>
    where
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let entries = Vec::<(TopicPartition, V)>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

/// Consumer group lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupState {
    Stable,
    PreparingRebalance,
    CompletingRebalance,
    Empty,
    Dead,
    /// The source could not tell
    Unknown,
}

impl GroupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupState::Stable => "Stable",
            GroupState::PreparingRebalance => "PreparingRebalance",
            GroupState::CompletingRebalance => "CompletingRebalance",
            GroupState::Empty => "Empty",
            GroupState::Dead => "Dead",
            GroupState::Unknown => "Unknown",
        }
    }

    /// Parse the state name reported by the admin API. Unrecognized names map
    /// to `Unknown` rather than failing.
    pub fn parse(name: &str) -> Self {
        match name {
            "Stable" => GroupState::Stable,
            "PreparingRebalance" => GroupState::PreparingRebalance,
            "CompletingRebalance" | "AwaitingSync" => GroupState::CompletingRebalance,
            "Empty" => GroupState::Empty,
            "Dead" => GroupState::Dead,
            _ => GroupState::Unknown,
        }
    }
}

impl fmt::Display for GroupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transaction coordinator state, as stored in the transaction log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionState {
    Empty,
    Ongoing,
    PrepareCommit,
    PrepareAbort,
    CompleteCommit,
    CompleteAbort,
    Dead,
    PrepareEpochFence,
}

impl TransactionState {
    pub fn from_code(code: i8) -> Result<Self, DecodeError> {
        match code {
            0 => Ok(TransactionState::Empty),
            1 => Ok(TransactionState::Ongoing),
            2 => Ok(TransactionState::PrepareCommit),
            3 => Ok(TransactionState::PrepareAbort),
            4 => Ok(TransactionState::CompleteCommit),
            5 => Ok(TransactionState::CompleteAbort),
            6 => Ok(TransactionState::Dead),
            7 => Ok(TransactionState::PrepareEpochFence),
            other => Err(DecodeError::UnknownTransactionState(other)),
        }
    }

    pub fn code(&self) -> i8 {
        match self {
            TransactionState::Empty => 0,
            TransactionState::Ongoing => 1,
            TransactionState::PrepareCommit => 2,
            TransactionState::PrepareAbort => 3,
            TransactionState::CompleteCommit => 4,
            TransactionState::CompleteAbort => 5,
            TransactionState::Dead => 6,
            TransactionState::PrepareEpochFence => 7,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Empty => "Empty",
            TransactionState::Ongoing => "Ongoing",
            TransactionState::PrepareCommit => "PrepareCommit",
            TransactionState::PrepareAbort => "PrepareAbort",
            TransactionState::CompleteCommit => "CompleteCommit",
            TransactionState::CompleteAbort => "CompleteAbort",
            TransactionState::Dead => "Dead",
            TransactionState::PrepareEpochFence => "PrepareEpochFence",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
