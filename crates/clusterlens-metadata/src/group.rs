//! Consumer group cache
//!
//! Keyed by group id. Two key streams feed each entry: group metadata records
//! (membership, protocol, coordinator) and offset commit records (one per
//! partition). Offsets may arrive before the metadata; the row is created
//! lazily and filled in when the metadata shows up.
//!
//! ## Sources
//!
//! Startup optionally seeds the cache from an [`AdminSnapshotSource`], then
//! replays the group log on top in the same bootstrap batch. Log data always
//! supersedes snapshot data for the same group or partition; snapshot data
//! never replaces log data.
//!
//! ## Offset Series
//!
//! Each log-sourced offset commit with a commit timestamp is appended to a
//! per-partition [`OffsetTimeSeries`]. Snapshot offsets carry no timestamp
//! and never enter a series, so rates are unavailable for a partition until
//! its first log commit.
//!
//! ## Eviction
//!
//! Only a metadata tombstone evicts a group, taking its offsets and series
//! with it. An offset tombstone removes that one partition.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use clusterlens_core::{DecodedRecord, Delta, FeedKind, RecordKey, RecordValue, TopicPartition};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{
    ApplySummary, CacheListener, DerivedState, MaterializedCache, Materializer, Outcome,
};
use crate::config::{LensConfig, TimeSeriesConfig};
use crate::error::{CacheError, Result};
use crate::feed::{decode_batch, AdminSnapshotSource, FeedRecord, FeedSink, StreamingFeed};
use crate::source::{
    DataSource, GroupView, LogGroupView, LogOffsetView, OffsetView, SnapshotGroupView,
    SnapshotOffsetView,
};
use crate::timeseries::OffsetTimeSeries;
use crate::types::{GroupProjection, OffsetProjection};

/// A change to one consumer group
pub enum GroupDelta {
    /// Group metadata; `None` is a tombstone
    Metadata(Option<Box<dyn GroupView>>),

    /// Committed offset of one partition; `None` is a tombstone
    Offset {
        topic_partition: TopicPartition,
        offset: Option<Box<dyn OffsetView>>,
    },
}

impl GroupDelta {
    fn from_record(record: DecodedRecord, coordinator: Option<i32>) -> Option<(String, Self)> {
        match (record.key, record.delta) {
            (RecordKey::GroupMetadata { group }, Delta::Upsert(RecordValue::GroupMetadata(v))) => {
                let view = LogGroupView::new(group.clone(), v, coordinator);
                Some((group, GroupDelta::Metadata(Some(Box::new(view)))))
            }
            (RecordKey::GroupMetadata { group }, Delta::Tombstone) => {
                Some((group, GroupDelta::Metadata(None)))
            }
            (
                RecordKey::Offset {
                    group,
                    topic_partition,
                },
                Delta::Upsert(RecordValue::OffsetCommit(v)),
            ) => Some((
                group,
                GroupDelta::Offset {
                    topic_partition,
                    offset: Some(Box::new(LogOffsetView(v))),
                },
            )),
            (
                RecordKey::Offset {
                    group,
                    topic_partition,
                },
                Delta::Tombstone,
            ) => Some((
                group,
                GroupDelta::Offset {
                    topic_partition,
                    offset: None,
                },
            )),
            (key, _) => {
                warn!(kind = key.kind(), "Unexpected record on the group log");
                None
            }
        }
    }
}

/// Offset series of one group, by partition
#[derive(Debug, Default)]
pub struct GroupDerived {
    series: BTreeMap<TopicPartition, OffsetTimeSeries>,
}

impl DerivedState for GroupDerived {
    fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

pub struct GroupMaterializer {
    time_series: TimeSeriesConfig,
}

impl GroupMaterializer {
    pub fn new(time_series: TimeSeriesConfig) -> Self {
        Self { time_series }
    }

    fn apply_metadata(
        &self,
        group_id: &str,
        slot: &mut Option<GroupProjection>,
        view: Option<Box<dyn GroupView>>,
    ) -> Outcome {
        let Some(view) = view else {
            return match slot.take() {
                Some(_) => Outcome::Removed,
                None => Outcome::Unchanged,
            };
        };

        let current_source = slot.as_ref().and_then(|g| g.metadata_source);
        if view.source() == DataSource::Snapshot && current_source == Some(DataSource::Log) {
            debug!(group = group_id, "Ignoring snapshot metadata for log-sourced group");
            return Outcome::Unchanged;
        }

        slot.get_or_insert_with(|| GroupProjection::offsets_only(group_id))
            .apply_metadata(view.as_ref());
        Outcome::Updated
    }

    fn apply_offset(
        &self,
        group_id: &str,
        slot: &mut Option<GroupProjection>,
        derived: &mut GroupDerived,
        topic_partition: TopicPartition,
        view: Option<Box<dyn OffsetView>>,
    ) -> Outcome {
        let Some(view) = view else {
            derived.series.remove(&topic_partition);
            let removed = slot
                .as_mut()
                .and_then(|group| group.offsets.remove(&topic_partition));
            return match removed {
                Some(_) => Outcome::Updated,
                None => Outcome::Unchanged,
            };
        };

        let current_source = slot
            .as_ref()
            .and_then(|g| g.offsets.get(&topic_partition))
            .map(|o| o.source);
        if view.source() == DataSource::Snapshot && current_source == Some(DataSource::Log) {
            debug!(
                group = group_id,
                partition = %topic_partition,
                "Ignoring snapshot offset for log-sourced partition"
            );
            return Outcome::Unchanged;
        }

        let offset = OffsetProjection::from_view(view.as_ref());
        if offset.source == DataSource::Log {
            if let Some(timestamp) = offset.commit_timestamp {
                derived
                    .series
                    .entry(topic_partition.clone())
                    .or_insert_with(|| {
                        OffsetTimeSeries::with_config(topic_partition.to_string(), &self.time_series)
                    })
                    .append(timestamp, offset.offset);
            }
        }

        slot.get_or_insert_with(|| GroupProjection::offsets_only(group_id))
            .offsets
            .insert(topic_partition, offset);
        Outcome::Updated
    }
}

impl Materializer for GroupMaterializer {
    type Key = String;
    type Value = GroupProjection;
    type Delta = GroupDelta;
    type Derived = GroupDerived;

    fn name(&self) -> &'static str {
        "groups"
    }

    fn new_derived(&self) -> GroupDerived {
        GroupDerived::default()
    }

    fn apply(
        &self,
        key: &String,
        slot: &mut Option<GroupProjection>,
        derived: &mut GroupDerived,
        delta: GroupDelta,
    ) -> Outcome {
        match delta {
            GroupDelta::Metadata(view) => self.apply_metadata(key, slot, view),
            GroupDelta::Offset {
                topic_partition,
                offset,
            } => self.apply_offset(key, slot, derived, topic_partition, offset),
        }
    }

    fn topics(&self, value: &GroupProjection) -> BTreeSet<String> {
        value.topics()
    }
}

/// Build the snapshot seed: every described group, then every listed offset
fn snapshot_deltas(admin: &dyn AdminSnapshotSource) -> Result<Vec<(String, GroupDelta)>> {
    let mut deltas = Vec::new();

    for description in admin.describe_all_groups()? {
        let group_id = description.group_id.clone();
        let view: Box<dyn GroupView> = Box::new(SnapshotGroupView(description));
        deltas.push((group_id, GroupDelta::Metadata(Some(view))));
    }

    for (group_id, offsets) in admin.list_all_group_offsets()? {
        for (topic_partition, offset) in offsets {
            let view: Box<dyn OffsetView> = Box::new(SnapshotOffsetView(offset));
            deltas.push((
                group_id.clone(),
                GroupDelta::Offset {
                    topic_partition,
                    offset: Some(view),
                },
            ));
        }
    }

    Ok(deltas)
}

fn log_deltas(records: Vec<FeedRecord>) -> Vec<(String, GroupDelta)> {
    decode_batch(FeedKind::GroupLog, records)
        .into_iter()
        .filter_map(|(record, coordinator)| GroupDelta::from_record(record, coordinator))
        .collect()
}

struct GroupFeedSink {
    cache: Arc<MaterializedCache<GroupMaterializer>>,
    seed: Mutex<Option<Vec<(String, GroupDelta)>>>,
}

impl FeedSink for GroupFeedSink {
    fn on_bootstrap(&self, records: Vec<FeedRecord>) -> Result<()> {
        let mut deltas = self.seed.lock().take().unwrap_or_default();
        let seeded = deltas.len();
        deltas.extend(log_deltas(records));
        debug!(seeded, total = deltas.len(), "Bootstrapping group cache");
        self.cache.bootstrap(deltas)?;
        Ok(())
    }

    fn on_batch(&self, records: Vec<FeedRecord>) -> Result<()> {
        self.cache.apply_incremental(log_deltas(records))?;
        Ok(())
    }
}

/// Materialized view of every consumer group
pub struct ConsumerGroupCache {
    cache: Arc<MaterializedCache<GroupMaterializer>>,
    feed: Mutex<Option<Box<dyn StreamingFeed>>>,
}

impl ConsumerGroupCache {
    pub fn new(config: &LensConfig) -> Self {
        Self {
            cache: Arc::new(MaterializedCache::new(GroupMaterializer::new(
                config.time_series,
            ))),
            feed: Mutex::new(None),
        }
    }

    /// Seed from `admin` (if given) and the feed's replay, then follow the feed.
    pub fn start(
        &self,
        mut feed: Box<dyn StreamingFeed>,
        admin: Option<&dyn AdminSnapshotSource>,
    ) -> Result<()> {
        let mut slot = self.feed.lock();
        if slot.is_some() {
            return Err(CacheError::AlreadyStarted("consumer group cache"));
        }

        let seed = match admin {
            Some(admin) => Some(snapshot_deltas(admin)?),
            None => None,
        };
        let sink = Arc::new(GroupFeedSink {
            cache: self.cache.clone(),
            seed: Mutex::new(seed),
        });
        feed.start(sink)?;
        *slot = Some(feed);

        info!(groups = self.cache.len(), "Consumer group cache started");
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        if let Some(mut feed) = self.feed.lock().take() {
            feed.close()?;
            info!("Consumer group cache closed");
        }
        Ok(())
    }

    /// Apply deltas directly, bypassing the feed
    pub fn apply(&self, deltas: Vec<(String, GroupDelta)>) -> Result<ApplySummary> {
        self.cache.apply_incremental(deltas)
    }

    pub fn group(&self, group_id: &str) -> Option<GroupProjection> {
        self.cache.get(group_id)
    }

    pub fn groups(&self) -> Vec<GroupProjection> {
        self.cache.values()
    }

    pub fn group_ids(&self) -> Vec<String> {
        self.cache.keys()
    }

    /// Groups with a committed offset on `topic`
    pub fn groups_for_topic(&self, topic: &str) -> Vec<GroupProjection> {
        self.cache.values_for_topic(topic)
    }

    /// Offset series of every partition of `group_id` with log-sourced commits
    pub fn offset_time_series(&self, group_id: &str) -> BTreeMap<TopicPartition, OffsetTimeSeries> {
        self.cache
            .derived(group_id, |d| d.series.clone())
            .unwrap_or_default()
    }

    pub fn add_listener(&self, listener: Arc<dyn CacheListener<String, GroupProjection>>) {
        self.cache.add_listener(listener);
    }

    pub fn is_started(&self) -> bool {
        self.cache.is_started()
    }

    pub fn wait_started(&self, timeout: Duration) -> bool {
        self.cache.wait_started(timeout)
    }

    pub fn cache(&self) -> &MaterializedCache<GroupMaterializer> {
        &self.cache
    }
}
