//! Topic cache
//!
//! Projects the topic subtrees of the coordination service into one
//! [`TopicProjection`] per topic:
//!
//! ```text
//! /brokers/topics/<topic>                           -> replica assignment
//! /brokers/topics/<topic>/partitions/<id>/state     -> leader, ISR, epochs
//! /config/topics/<topic>                            -> config overrides
//! ```
//!
//! A topic is present while its assignment or its partition states are
//! non-empty. Removing the topic node evicts it; removing the last partition
//! state of a topic without an assignment evicts it too. Configs that arrive
//! before the topic is visible are held and attached once it appears.
//!
//! Events received before the watch source reports `Initialized` are
//! buffered and applied as the bootstrap batch.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clusterlens_core::{
    DecodedRecord, Delta, FeedKind, PartitionStateValue, RecordKey, RecordValue,
    TopicAssignmentValue, TopicConfigValue, TopicPartition,
};
use clusterlens_observability::metrics::WATCH_EVENTS_TOTAL;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::cache::{
    ApplySummary, CacheListener, DerivedState, MaterializedCache, Materializer, Outcome,
};
use crate::error::{CacheError, Result};
use crate::feed::{
    decode_batch, FeedRecord, HierarchicalWatchSource, WatchEvent, WatchEventKind, WatchSink,
};
use crate::types::{PartitionInfo, TopicProjection};

/// A change to one topic; `None` payloads are tombstones
#[derive(Debug, Clone)]
pub enum TopicDelta {
    Assignment(Option<TopicAssignmentValue>),
    PartitionState {
        partition: i32,
        state: Option<PartitionStateValue>,
    },
    Config(Option<TopicConfigValue>),
}

impl TopicDelta {
    fn from_record(record: DecodedRecord) -> Option<(String, Self)> {
        let delta = match (record.key, record.delta) {
            (RecordKey::TopicAssignment { topic }, Delta::Upsert(RecordValue::TopicAssignment(v))) => {
                (topic, TopicDelta::Assignment(Some(v)))
            }
            (RecordKey::TopicAssignment { topic }, Delta::Tombstone) => {
                (topic, TopicDelta::Assignment(None))
            }
            (
                RecordKey::PartitionState { topic_partition },
                Delta::Upsert(RecordValue::PartitionState(v)),
            ) => (
                topic_partition.topic,
                TopicDelta::PartitionState {
                    partition: topic_partition.partition,
                    state: Some(v),
                },
            ),
            (RecordKey::PartitionState { topic_partition }, Delta::Tombstone) => (
                topic_partition.topic,
                TopicDelta::PartitionState {
                    partition: topic_partition.partition,
                    state: None,
                },
            ),
            (RecordKey::TopicConfig { topic }, Delta::Upsert(RecordValue::TopicConfig(v))) => {
                (topic, TopicDelta::Config(Some(v)))
            }
            (RecordKey::TopicConfig { topic }, Delta::Tombstone) => {
                (topic, TopicDelta::Config(None))
            }
            (key, _) => {
                warn!(kind = key.kind(), "Unexpected record in the coordination tree");
                return None;
            }
        };
        Some(delta)
    }
}

/// Latest config of a topic, kept whether or not the topic is visible
#[derive(Debug, Default)]
pub struct TopicDerived {
    config: Option<BTreeMap<String, String>>,
}

impl DerivedState for TopicDerived {
    fn is_empty(&self) -> bool {
        self.config.is_none()
    }
}

#[derive(Debug, Default)]
pub struct HierarchyProjector;

impl Materializer for HierarchyProjector {
    type Key = String;
    type Value = TopicProjection;
    type Delta = TopicDelta;
    type Derived = TopicDerived;

    fn name(&self) -> &'static str {
        "topics"
    }

    fn new_derived(&self) -> TopicDerived {
        TopicDerived::default()
    }

    fn apply(
        &self,
        key: &String,
        slot: &mut Option<TopicProjection>,
        derived: &mut TopicDerived,
        delta: TopicDelta,
    ) -> Outcome {
        let existed = slot.is_some();

        match delta {
            TopicDelta::Config(config) => {
                derived.config = config.map(|c| c.config);
                return match slot {
                    Some(topic) => {
                        topic.config = derived.config.clone();
                        Outcome::Updated
                    }
                    None => {
                        debug!(topic = %key, "Holding config until the topic appears");
                        Outcome::Unchanged
                    }
                };
            }
            TopicDelta::Assignment(None) => {
                return match slot.take() {
                    Some(_) => Outcome::Removed,
                    None => Outcome::Unchanged,
                };
            }
            TopicDelta::Assignment(Some(assignment)) => {
                slot.get_or_insert_with(|| TopicProjection::new(key))
                    .assignment = assignment.partitions;
            }
            TopicDelta::PartitionState {
                partition,
                state: Some(state),
            } => {
                slot.get_or_insert_with(|| TopicProjection::new(key))
                    .state
                    .insert(partition, state.into());
            }
            TopicDelta::PartitionState {
                partition,
                state: None,
            } => {
                let removed = slot
                    .as_mut()
                    .and_then(|topic| topic.state.remove(&partition));
                if removed.is_none() {
                    return Outcome::Unchanged;
                }
            }
        }

        if let Some(topic) = slot.as_mut().filter(|t| t.is_visible()) {
            topic.config = derived.config.clone();
            return Outcome::Updated;
        }

        *slot = None;
        if existed {
            Outcome::Removed
        } else {
            Outcome::Unchanged
        }
    }

    fn topics(&self, value: &TopicProjection) -> BTreeSet<String> {
        BTreeSet::from([value.name.clone()])
    }
}

fn decode_event(event: WatchEvent) -> Option<(String, TopicDelta)> {
    let value = match event.kind {
        WatchEventKind::NodeRemoved => None,
        _ => Some(event.data.unwrap_or_default()),
    };
    let record = FeedRecord::new(Bytes::from(event.path.into_bytes()), value);
    decode_batch(FeedKind::Coordination, vec![record])
        .into_iter()
        .next()
        .and_then(|(record, _)| TopicDelta::from_record(record))
}

struct TopicWatchSink {
    cache: Arc<MaterializedCache<HierarchyProjector>>,
    /// Events received before `Initialized`; `None` once bootstrapped
    pending: Mutex<Option<Vec<(String, TopicDelta)>>>,
}

impl WatchSink for TopicWatchSink {
    fn on_event(&self, event: WatchEvent) {
        WATCH_EVENTS_TOTAL
            .with_label_values(&[event.kind.as_str()])
            .inc();

        match event.kind {
            WatchEventKind::ConnectionChanged => {
                warn!(state = %event.path, "Coordination service connection changed");
            }
            WatchEventKind::Initialized => match self.pending.lock().take() {
                Some(deltas) => {
                    if let Err(e) = self.cache.bootstrap(deltas) {
                        error!(error = %e, "Topic cache bootstrap failed");
                    }
                }
                None => warn!("Duplicate initialization event ignored"),
            },
            WatchEventKind::NodeAdded | WatchEventKind::NodeUpdated | WatchEventKind::NodeRemoved => {
                let Some(delta) = decode_event(event) else {
                    return;
                };
                let live = match self.pending.lock().as_mut() {
                    Some(buffer) => {
                        buffer.push(delta);
                        None
                    }
                    None => Some(delta),
                };
                if let Some(delta) = live {
                    if let Err(e) = self.cache.apply_incremental(vec![delta]) {
                        error!(error = %e, "Failed to apply coordination event");
                    }
                }
            }
        }
    }
}

/// Materialized view of every topic in the coordination tree
pub struct TopicCache {
    cache: Arc<MaterializedCache<HierarchyProjector>>,
    source: Mutex<Option<Box<dyn HierarchicalWatchSource>>>,
}

impl Default for TopicCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicCache {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(MaterializedCache::new(HierarchyProjector)),
            source: Mutex::new(None),
        }
    }

    pub fn start(&self, mut source: Box<dyn HierarchicalWatchSource>) -> Result<()> {
        let mut slot = self.source.lock();
        if slot.is_some() {
            return Err(CacheError::AlreadyStarted("topic cache"));
        }

        source.start(Arc::new(TopicWatchSink {
            cache: self.cache.clone(),
            pending: Mutex::new(Some(Vec::new())),
        }))?;
        *slot = Some(source);

        info!(
            topics = self.cache.len(),
            initialized = self.cache.is_started(),
            "Topic cache started"
        );
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        if let Some(mut source) = self.source.lock().take() {
            source.close()?;
            info!("Topic cache closed");
        }
        Ok(())
    }

    /// Apply deltas directly, bypassing the watch source
    pub fn apply(&self, deltas: Vec<(String, TopicDelta)>) -> Result<ApplySummary> {
        self.cache.apply_incremental(deltas)
    }

    pub fn topic(&self, name: &str) -> Option<TopicProjection> {
        self.cache.get(name)
    }

    pub fn topics(&self) -> Vec<TopicProjection> {
        self.cache.values()
    }

    pub fn topic_names(&self) -> Vec<String> {
        self.cache.keys()
    }

    pub fn partition(&self, topic_partition: &TopicPartition) -> Option<PartitionInfo> {
        self.cache
            .get(topic_partition.topic.as_str())?
            .partition(topic_partition.partition)
    }

    pub fn add_listener(&self, listener: Arc<dyn CacheListener<String, TopicProjection>>) {
        self.cache.add_listener(listener);
    }

    pub fn is_started(&self) -> bool {
        self.cache.is_started()
    }

    pub fn wait_started(&self, timeout: Duration) -> bool {
        self.cache.wait_started(timeout)
    }

    pub fn cache(&self) -> &MaterializedCache<HierarchyProjector> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment(partitions: &[(i32, &[i32])]) -> TopicDelta {
        TopicDelta::Assignment(Some(TopicAssignmentValue {
            partitions: partitions
                .iter()
                .map(|(id, replicas)| (*id, replicas.to_vec()))
                .collect(),
        }))
    }

    fn state(partition: i32, leader: i32) -> TopicDelta {
        TopicDelta::PartitionState {
            partition,
            state: Some(PartitionStateValue {
                leader,
                isr: vec![leader],
                leader_epoch: 0,
                controller_epoch: 1,
            }),
        }
    }

    fn config(key: &str, value: &str) -> TopicDelta {
        TopicDelta::Config(Some(TopicConfigValue {
            config: BTreeMap::from([(key.to_string(), value.to_string())]),
        }))
    }

    fn on(topic: &str, delta: TopicDelta) -> (String, TopicDelta) {
        (topic.to_string(), delta)
    }

    #[test]
    fn test_assignment_replaced_wholesale() {
        let cache = TopicCache::new();
        cache
            .apply(vec![on("orders", assignment(&[(0, &[1, 2]), (1, &[2, 3])]))])
            .unwrap();
        cache
            .apply(vec![on("orders", assignment(&[(0, &[3])]))])
            .unwrap();

        let topic = cache.topic("orders").unwrap();
        assert_eq!(topic.assignment.len(), 1);
        assert_eq!(topic.assignment[&0], vec![3]);
    }

    #[test]
    fn test_config_before_topic_is_attached() {
        let cache = TopicCache::new();
        let summary = cache
            .apply(vec![on("orders", config("retention.ms", "1000"))])
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert!(cache.topic("orders").is_none());

        cache
            .apply(vec![on("orders", assignment(&[(0, &[1])]))])
            .unwrap();
        let topic = cache.topic("orders").unwrap();
        assert_eq!(
            topic.config.unwrap().get("retention.ms").map(String::as_str),
            Some("1000")
        );
    }

    #[test]
    fn test_state_tombstone_evicts_when_both_halves_empty() {
        let cache = TopicCache::new();
        cache.apply(vec![on("orders", state(0, 1))]).unwrap();
        assert!(cache.topic("orders").is_some());

        let summary = cache
            .apply(vec![on(
                "orders",
                TopicDelta::PartitionState {
                    partition: 0,
                    state: None,
                },
            )])
            .unwrap();
        assert_eq!(summary.removed, 1);
        assert!(cache.topic("orders").is_none());
    }

    #[test]
    fn test_state_tombstone_keeps_assigned_topic() {
        let cache = TopicCache::new();
        cache
            .apply(vec![on("orders", assignment(&[(0, &[1])])), on("orders", state(0, 1))])
            .unwrap();
        cache
            .apply(vec![on(
                "orders",
                TopicDelta::PartitionState {
                    partition: 0,
                    state: None,
                },
            )])
            .unwrap();

        let partition = cache.partition(&TopicPartition::new("orders", 0)).unwrap();
        assert_eq!(partition.replicas, vec![1]);
        assert_eq!(partition.leader, None);
    }

    #[test]
    fn test_assignment_tombstone_evicts_topic() {
        let cache = TopicCache::new();
        cache
            .apply(vec![
                on("orders", assignment(&[(0, &[1])])),
                on("orders", state(0, 1)),
                on("orders", config("cleanup.policy", "compact")),
            ])
            .unwrap();
        cache
            .apply(vec![on("orders", TopicDelta::Assignment(None))])
            .unwrap();

        assert!(cache.topic("orders").is_none());
        assert!(cache.cache().derived("orders", |_| ()).is_none());
        assert!(cache.partition(&TopicPartition::new("orders", 0)).is_none());
    }

    #[test]
    fn test_empty_assignment_is_not_visible() {
        let cache = TopicCache::new();
        let summary = cache.apply(vec![on("orders", assignment(&[]))]).unwrap();
        assert_eq!(summary.skipped, 1);
        assert!(cache.topic_names().is_empty());
    }

    #[test]
    fn test_config_tombstone_clears_config() {
        let cache = TopicCache::new();
        cache
            .apply(vec![
                on("orders", assignment(&[(0, &[1])])),
                on("orders", config("retention.ms", "1000")),
            ])
            .unwrap();
        cache
            .apply(vec![on("orders", TopicDelta::Config(None))])
            .unwrap();
        assert!(cache.topic("orders").unwrap().config.is_none());
    }
}
