//! Source adapters
//!
//! Group, member and offset state can come from two places:
//!
//! - an **admin snapshot**: a point-in-time description returned by the
//!   cluster's admin API. Complete, but without timing detail.
//! - the **group log**: decoded log records. Timing-aware, but only available
//!   as the log is replayed.
//!
//! Projections are built only through the [`GroupView`], [`MemberView`] and
//! [`OffsetView`] capability traits. Each has one implementation per source;
//! accessors return `None` for anything the source cannot supply.
//!
//! | Field | Snapshot | Log |
//! |-------|----------|-----|
//! | coordinator | when the admin API knows it | from the feed record |
//! | protocol type | no | yes |
//! | rebalance / session timeout | no | yes |
//! | last heartbeat | no | v2+ state timestamp |
//! | commit / expiry timestamp | no | yes |
//! | leader epoch | no | v3+ |

use std::collections::BTreeSet;

use clusterlens_core::{
    GroupMetadataValue, GroupState, MemberMetadataValue, OffsetCommitValue, TopicPartition,
};
use serde::{Deserialize, Serialize};

/// Which source supplied a piece of state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Snapshot,
    Log,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Snapshot => "snapshot",
            DataSource::Log => "log",
        }
    }
}

pub trait GroupView: Send {
    fn source(&self) -> DataSource;
    fn group_id(&self) -> &str;
    fn coordinator(&self) -> Option<i32>;
    fn state(&self) -> GroupState;
    fn protocol_type(&self) -> Option<&str>;
    fn partition_assignor(&self) -> Option<&str>;
    fn members(&self) -> Vec<Box<dyn MemberView + '_>>;
}

pub trait MemberView {
    fn member_id(&self) -> &str;
    fn client_id(&self) -> &str;
    fn client_host(&self) -> &str;
    fn group_instance_id(&self) -> Option<&str>;
    fn rebalance_timeout_ms(&self) -> Option<i32>;
    fn session_timeout_ms(&self) -> Option<i32>;
    fn last_heartbeat(&self) -> Option<i64>;
    fn assignment(&self) -> BTreeSet<TopicPartition>;
}

pub trait OffsetView: Send {
    fn source(&self) -> DataSource;
    fn offset(&self) -> i64;
    fn metadata(&self) -> Option<&str>;
    fn commit_timestamp(&self) -> Option<i64>;
    fn expire_timestamp(&self) -> Option<i64>;
    fn leader_epoch(&self) -> Option<i32>;
}

// ============================================================================
// Admin snapshot
// ============================================================================

/// A consumer group as described by the admin API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDescription {
    pub group_id: String,
    pub coordinator: Option<i32>,
    pub state: GroupState,
    pub partition_assignor: Option<String>,
    pub members: Vec<MemberDescription>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDescription {
    pub member_id: String,
    pub group_instance_id: Option<String>,
    pub client_id: String,
    pub host: String,
    pub assignment: BTreeSet<TopicPartition>,
}

/// A committed offset as listed by the admin API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotOffset {
    pub offset: i64,
    pub metadata: Option<String>,
}

pub struct SnapshotGroupView(pub GroupDescription);

impl GroupView for SnapshotGroupView {
    fn source(&self) -> DataSource {
        DataSource::Snapshot
    }

    fn group_id(&self) -> &str {
        &self.0.group_id
    }

    fn coordinator(&self) -> Option<i32> {
        self.0.coordinator
    }

    fn state(&self) -> GroupState {
        self.0.state
    }

    fn protocol_type(&self) -> Option<&str> {
        None
    }

    fn partition_assignor(&self) -> Option<&str> {
        self.0.partition_assignor.as_deref().filter(|a| !a.is_empty())
    }

    fn members(&self) -> Vec<Box<dyn MemberView + '_>> {
        self.0
            .members
            .iter()
            .map(|m| Box::new(SnapshotMemberView(m)) as Box<dyn MemberView + '_>)
            .collect()
    }
}

pub struct SnapshotMemberView<'a>(pub &'a MemberDescription);

impl MemberView for SnapshotMemberView<'_> {
    fn member_id(&self) -> &str {
        &self.0.member_id
    }

    fn client_id(&self) -> &str {
        &self.0.client_id
    }

    fn client_host(&self) -> &str {
        &self.0.host
    }

    fn group_instance_id(&self) -> Option<&str> {
        self.0.group_instance_id.as_deref()
    }

    fn rebalance_timeout_ms(&self) -> Option<i32> {
        None
    }

    fn session_timeout_ms(&self) -> Option<i32> {
        None
    }

    fn last_heartbeat(&self) -> Option<i64> {
        None
    }

    fn assignment(&self) -> BTreeSet<TopicPartition> {
        self.0.assignment.clone()
    }
}

pub struct SnapshotOffsetView(pub SnapshotOffset);

impl OffsetView for SnapshotOffsetView {
    fn source(&self) -> DataSource {
        DataSource::Snapshot
    }

    fn offset(&self) -> i64 {
        self.0.offset
    }

    fn metadata(&self) -> Option<&str> {
        self.0.metadata.as_deref().filter(|m| !m.is_empty())
    }

    fn commit_timestamp(&self) -> Option<i64> {
        None
    }

    fn expire_timestamp(&self) -> Option<i64> {
        None
    }

    fn leader_epoch(&self) -> Option<i32> {
        None
    }
}

// ============================================================================
// Group log
// ============================================================================

pub struct LogGroupView {
    group_id: String,
    value: GroupMetadataValue,
    coordinator: Option<i32>,
}

impl LogGroupView {
    /// `coordinator` is the broker hint the feed attached to the record
    pub fn new(group_id: String, value: GroupMetadataValue, coordinator: Option<i32>) -> Self {
        Self {
            group_id,
            value,
            coordinator,
        }
    }
}

impl GroupView for LogGroupView {
    fn source(&self) -> DataSource {
        DataSource::Log
    }

    fn group_id(&self) -> &str {
        &self.group_id
    }

    fn coordinator(&self) -> Option<i32> {
        self.coordinator
    }

    fn state(&self) -> GroupState {
        self.value.state()
    }

    fn protocol_type(&self) -> Option<&str> {
        Some(self.value.protocol_type.as_str()).filter(|p| !p.is_empty())
    }

    fn partition_assignor(&self) -> Option<&str> {
        self.value.protocol.as_deref().filter(|p| !p.is_empty())
    }

    fn members(&self) -> Vec<Box<dyn MemberView + '_>> {
        let heartbeat = self.value.current_state_timestamp;
        self.value
            .members
            .iter()
            .map(|m| Box::new(LogMemberView { member: m, heartbeat }) as Box<dyn MemberView + '_>)
            .collect()
    }
}

pub struct LogMemberView<'a> {
    member: &'a MemberMetadataValue,
    heartbeat: Option<i64>,
}

impl MemberView for LogMemberView<'_> {
    fn member_id(&self) -> &str {
        &self.member.member_id
    }

    fn client_id(&self) -> &str {
        &self.member.client_id
    }

    fn client_host(&self) -> &str {
        &self.member.client_host
    }

    fn group_instance_id(&self) -> Option<&str> {
        self.member.group_instance_id.as_deref()
    }

    fn rebalance_timeout_ms(&self) -> Option<i32> {
        self.member.rebalance_timeout_ms
    }

    fn session_timeout_ms(&self) -> Option<i32> {
        Some(self.member.session_timeout_ms)
    }

    fn last_heartbeat(&self) -> Option<i64> {
        self.heartbeat
    }

    fn assignment(&self) -> BTreeSet<TopicPartition> {
        self.member.assignment.clone()
    }
}

pub struct LogOffsetView(pub OffsetCommitValue);

impl OffsetView for LogOffsetView {
    fn source(&self) -> DataSource {
        DataSource::Log
    }

    fn offset(&self) -> i64 {
        self.0.offset
    }

    fn metadata(&self) -> Option<&str> {
        self.0.metadata.as_deref()
    }

    fn commit_timestamp(&self) -> Option<i64> {
        self.0.commit_timestamp
    }

    fn expire_timestamp(&self) -> Option<i64> {
        self.0.expire_timestamp
    }

    fn leader_epoch(&self) -> Option<i32> {
        self.0.leader_epoch
    }
}
