//! Projection types served by the caches
//!
//! Every read returns owned copies of these types; nothing handed to a caller
//! aliases cache-owned state.

use std::collections::{BTreeMap, BTreeSet};

use clusterlens_core::{GroupState, PartitionStateValue, TopicPartition};
use serde::{Deserialize, Serialize};

use crate::source::{DataSource, GroupView, MemberView, OffsetView};

/// A consumer group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupProjection {
    pub group_id: String,

    /// Broker currently coordinating the group
    pub coordinator: Option<i32>,

    pub state: GroupState,
    pub protocol_type: Option<String>,
    pub partition_assignor: Option<String>,

    /// Members ordered by member id
    pub members: Vec<MemberProjection>,

    #[serde(with = "clusterlens_core::types::partition_map")]
    pub offsets: BTreeMap<TopicPartition, OffsetProjection>,

    /// Source of the group metadata; `None` for a row created by offsets alone
    pub metadata_source: Option<DataSource>,
}

impl GroupProjection {
    /// Row for a group known only through its offsets
    pub fn offsets_only(group_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            coordinator: None,
            state: GroupState::Unknown,
            protocol_type: None,
            partition_assignor: None,
            members: Vec::new(),
            offsets: BTreeMap::new(),
            metadata_source: None,
        }
    }

    /// Replace the group metadata from `view`, keeping the offsets.
    pub fn apply_metadata(&mut self, view: &dyn GroupView) {
        let mut members: Vec<MemberProjection> = view
            .members()
            .iter()
            .map(|m| MemberProjection::from_view(m.as_ref()))
            .collect();
        members.sort_by(|a, b| a.member_id.cmp(&b.member_id));

        self.coordinator = view.coordinator();
        self.state = view.state();
        self.protocol_type = view.protocol_type().map(str::to_string);
        self.partition_assignor = view.partition_assignor().map(str::to_string);
        self.members = members;
        self.metadata_source = Some(view.source());
    }

    /// Topics with at least one committed offset
    pub fn topics(&self) -> BTreeSet<String> {
        self.offsets.keys().map(|tp| tp.topic.clone()).collect()
    }

    /// Partitions assigned to any member
    pub fn assigned_partitions(&self) -> BTreeSet<TopicPartition> {
        self.members
            .iter()
            .flat_map(|m| m.assignment.iter().cloned())
            .collect()
    }
}

/// A group member; immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberProjection {
    pub client_id: String,
    pub member_id: String,
    pub client_host: String,
    pub group_instance_id: Option<String>,
    pub rebalance_timeout_ms: Option<i32>,
    pub session_timeout_ms: Option<i32>,
    pub last_heartbeat: Option<i64>,
    pub assignment: BTreeSet<TopicPartition>,
}

impl MemberProjection {
    pub fn from_view(view: &dyn MemberView) -> Self {
        Self {
            client_id: view.client_id().to_string(),
            member_id: view.member_id().to_string(),
            client_host: view.client_host().to_string(),
            group_instance_id: view.group_instance_id().map(str::to_string),
            rebalance_timeout_ms: view.rebalance_timeout_ms(),
            session_timeout_ms: view.session_timeout_ms(),
            last_heartbeat: view.last_heartbeat(),
            assignment: view.assignment(),
        }
    }
}

/// A committed offset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetProjection {
    /// Committed offset, never negative
    pub offset: i64,
    pub metadata: Option<String>,
    pub commit_timestamp: Option<i64>,
    pub expire_timestamp: Option<i64>,
    pub leader_epoch: Option<i32>,
    pub source: DataSource,
}

impl OffsetProjection {
    pub fn from_view(view: &dyn OffsetView) -> Self {
        Self {
            offset: view.offset().max(0),
            metadata: view.metadata().map(str::to_string),
            commit_timestamp: view.commit_timestamp(),
            expire_timestamp: view.expire_timestamp(),
            leader_epoch: view.leader_epoch(),
            source: view.source(),
        }
    }
}

/// Leadership of one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionLeadership {
    /// Leader broker id, -1 when the partition has no leader
    pub leader: i32,
    pub isr: Vec<i32>,
    pub leader_epoch: i32,
    pub controller_epoch: i32,
}

impl From<PartitionStateValue> for PartitionLeadership {
    fn from(value: PartitionStateValue) -> Self {
        Self {
            leader: value.leader,
            isr: value.isr,
            leader_epoch: value.leader_epoch,
            controller_epoch: value.controller_epoch,
        }
    }
}

/// Replica assignment and leadership of one partition, merged for reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub topic: String,
    pub partition: i32,
    pub replicas: Vec<i32>,
    /// `None` until the partition's state node has been seen
    pub leader: Option<i32>,
    pub isr: Option<Vec<i32>>,
}

/// A topic as described by the coordination tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicProjection {
    pub name: String,

    /// Partition id -> replica broker ids
    pub assignment: BTreeMap<i32, Vec<i32>>,

    /// Partition id -> leadership
    pub state: BTreeMap<i32, PartitionLeadership>,

    pub config: Option<BTreeMap<String, String>>,
}

impl TopicProjection {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            assignment: BTreeMap::new(),
            state: BTreeMap::new(),
            config: None,
        }
    }

    /// A topic is visible while either sub-map has an entry
    pub fn is_visible(&self) -> bool {
        !self.assignment.is_empty() || !self.state.is_empty()
    }

    fn partition_ids(&self) -> BTreeSet<i32> {
        self.assignment
            .keys()
            .chain(self.state.keys())
            .copied()
            .collect()
    }

    pub fn partition(&self, partition: i32) -> Option<PartitionInfo> {
        let replicas = self.assignment.get(&partition);
        let state = self.state.get(&partition);
        if replicas.is_none() && state.is_none() {
            return None;
        }
        Some(PartitionInfo {
            topic: self.name.clone(),
            partition,
            replicas: replicas.cloned().unwrap_or_default(),
            leader: state.map(|s| s.leader),
            isr: state.map(|s| s.isr.clone()),
        })
    }

    /// Assignment and leadership merged by partition id, in partition order
    pub fn partitions(&self) -> Vec<PartitionInfo> {
        self.partition_ids()
            .into_iter()
            .filter_map(|id| self.partition(id))
            .collect()
    }

    pub fn partition_count(&self) -> usize {
        self.partition_ids().len()
    }

    /// Replica count of the lowest-numbered assigned partition
    pub fn replication_factor(&self) -> Option<usize> {
        self.assignment.values().next().map(Vec::len)
    }

    /// Partitions whose ISR is smaller than their replica set
    pub fn under_replicated_partitions(&self) -> Vec<i32> {
        self.state
            .iter()
            .filter(|(id, state)| {
                self.assignment
                    .get(*id)
                    .is_some_and(|replicas| state.isr.len() < replicas.len())
            })
            .map(|(id, _)| *id)
            .collect()
    }

    /// Partitions whose state reports no leader
    pub fn offline_partitions(&self) -> Vec<i32> {
        self.state
            .iter()
            .filter(|(_, state)| state.leader < 0)
            .map(|(id, _)| *id)
            .collect()
    }
}
