//! Feed contracts
//!
//! The caches consume three collaborators:
//!
//! - [`StreamingFeed`]: replays a compacted log, then tails it. The feed calls
//!   [`FeedSink::on_bootstrap`] exactly once with the full replay before any
//!   [`FeedSink::on_batch`].
//! - [`AdminSnapshotSource`]: a point-in-time description of every consumer
//!   group and its committed offsets, used to seed the group cache.
//! - [`HierarchicalWatchSource`]: node events from the coordination tree,
//!   ending the initial listing with [`WatchEventKind::Initialized`].
//!
//! [`ReplayFeed`], [`ReplayWatchSource`] and [`StaticSnapshot`] are in-memory
//! implementations for replaying captured data.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use clusterlens_core::{decode, DecodedRecord, FeedKind, TopicPartition};
use clusterlens_observability::metrics::DECODE_ERRORS_TOTAL;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CacheError, Result};
use crate::source::{GroupDescription, SnapshotOffset};

/// A raw record from a compacted log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRecord {
    pub key: Bytes,
    /// `None` is a tombstone
    pub value: Option<Bytes>,
    /// Broker that served the record, when the feed knows it
    pub coordinator: Option<i32>,
}

impl FeedRecord {
    pub fn new(key: impl Into<Bytes>, value: Option<Bytes>) -> Self {
        Self {
            key: key.into(),
            value,
            coordinator: None,
        }
    }

    pub fn with_coordinator(mut self, coordinator: i32) -> Self {
        self.coordinator = Some(coordinator);
        self
    }
}

pub trait FeedSink: Send + Sync {
    /// The full replay; called once
    fn on_bootstrap(&self, records: Vec<FeedRecord>) -> Result<()>;

    /// A live batch, in log order
    fn on_batch(&self, records: Vec<FeedRecord>) -> Result<()>;
}

pub trait StreamingFeed: Send {
    fn start(&mut self, sink: Arc<dyn FeedSink>) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

pub trait AdminSnapshotSource: Send + Sync {
    fn describe_all_groups(&self) -> Result<Vec<GroupDescription>>;

    /// Group id -> partition -> committed offset
    fn list_all_group_offsets(
        &self,
    ) -> Result<BTreeMap<String, BTreeMap<TopicPartition, SnapshotOffset>>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchEventKind {
    NodeAdded,
    NodeUpdated,
    NodeRemoved,
    ConnectionChanged,
    Initialized,
}

impl WatchEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchEventKind::NodeAdded => "node_added",
            WatchEventKind::NodeUpdated => "node_updated",
            WatchEventKind::NodeRemoved => "node_removed",
            WatchEventKind::ConnectionChanged => "connection_changed",
            WatchEventKind::Initialized => "initialized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    /// Node path; empty for connection and initialization events
    pub path: String,
    pub data: Option<Bytes>,
}

impl WatchEvent {
    pub fn added(path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            kind: WatchEventKind::NodeAdded,
            path: path.into(),
            data: Some(data.into()),
        }
    }

    pub fn updated(path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            kind: WatchEventKind::NodeUpdated,
            path: path.into(),
            data: Some(data.into()),
        }
    }

    pub fn removed(path: impl Into<String>) -> Self {
        Self {
            kind: WatchEventKind::NodeRemoved,
            path: path.into(),
            data: None,
        }
    }

    pub fn connection_changed(state: impl Into<String>) -> Self {
        Self {
            kind: WatchEventKind::ConnectionChanged,
            path: state.into(),
            data: None,
        }
    }

    pub fn initialized() -> Self {
        Self {
            kind: WatchEventKind::Initialized,
            path: String::new(),
            data: None,
        }
    }
}

pub trait WatchSink: Send + Sync {
    fn on_event(&self, event: WatchEvent);
}

pub trait HierarchicalWatchSource: Send {
    fn start(&mut self, sink: Arc<dyn WatchSink>) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// Decode a feed batch, skipping records that fail to decode, name no entity
/// or carry a blank entity id. The coordinator hint travels with each record.
pub(crate) fn decode_batch(
    kind: FeedKind,
    records: Vec<FeedRecord>,
) -> Vec<(DecodedRecord, Option<i32>)> {
    let feed = kind.as_str();
    records
        .into_iter()
        .filter_map(|record| {
            match decode(kind, &record.key, record.value.as_deref()) {
                Ok(Some(decoded)) if decoded.key.entity_id().trim().is_empty() => {
                    warn!(feed, kind = decoded.key.kind(), "Skipping record with blank id");
                    DECODE_ERRORS_TOTAL
                        .with_label_values(&[feed, "blank_id"])
                        .inc();
                    None
                }
                Ok(Some(decoded)) => Some((decoded, record.coordinator)),
                Ok(None) => {
                    debug!(feed, "Record names no entity");
                    None
                }
                Err(e) => {
                    warn!(feed, error = %e, "Skipping undecodable record");
                    DECODE_ERRORS_TOTAL
                        .with_label_values(&[feed, e.label()])
                        .inc();
                    None
                }
            }
        })
        .collect()
}

// ============================================================================
// In-memory sources
// ============================================================================

/// Streaming feed over records held in memory.
///
/// `start` delivers the bootstrap records, then every batch queued so far.
/// Batches published after `start` are delivered immediately on the caller's
/// thread.
#[derive(Default)]
pub struct ReplayFeed {
    bootstrap: Vec<FeedRecord>,
    pending: Vec<Vec<FeedRecord>>,
    sink: Arc<Mutex<Option<Arc<dyn FeedSink>>>>,
}

impl ReplayFeed {
    pub fn new(bootstrap: Vec<FeedRecord>) -> Self {
        Self {
            bootstrap,
            ..Default::default()
        }
    }

    /// Queue a live batch for delivery after bootstrap
    pub fn queue(&mut self, batch: Vec<FeedRecord>) {
        self.pending.push(batch);
    }

    /// Handle for publishing live batches once the feed is started
    pub fn publisher(&self) -> FeedPublisher {
        FeedPublisher {
            sink: self.sink.clone(),
        }
    }
}

impl StreamingFeed for ReplayFeed {
    fn start(&mut self, sink: Arc<dyn FeedSink>) -> Result<()> {
        if self.sink.lock().is_some() {
            return Err(CacheError::AlreadyStarted("replay feed"));
        }
        sink.on_bootstrap(std::mem::take(&mut self.bootstrap))?;
        for batch in self.pending.drain(..) {
            sink.on_batch(batch)?;
        }
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.sink.lock().take();
        Ok(())
    }
}

/// Publishes live batches into a started [`ReplayFeed`]
#[derive(Clone)]
pub struct FeedPublisher {
    sink: Arc<Mutex<Option<Arc<dyn FeedSink>>>>,
}

impl FeedPublisher {
    pub fn publish(&self, batch: Vec<FeedRecord>) -> Result<()> {
        let sink = self
            .sink
            .lock()
            .clone()
            .ok_or_else(|| CacheError::feed("feed is not started"))?;
        sink.on_batch(batch)
    }
}

/// Watch source over events held in memory. Events published after `start`
/// are delivered immediately.
#[derive(Default)]
pub struct ReplayWatchSource {
    events: Vec<WatchEvent>,
    sink: Arc<Mutex<Option<Arc<dyn WatchSink>>>>,
}

impl ReplayWatchSource {
    pub fn new(events: Vec<WatchEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    pub fn publisher(&self) -> WatchPublisher {
        WatchPublisher {
            sink: self.sink.clone(),
        }
    }
}

impl HierarchicalWatchSource for ReplayWatchSource {
    fn start(&mut self, sink: Arc<dyn WatchSink>) -> Result<()> {
        if self.sink.lock().is_some() {
            return Err(CacheError::AlreadyStarted("replay watch source"));
        }
        for event in self.events.drain(..) {
            sink.on_event(event);
        }
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.sink.lock().take();
        Ok(())
    }
}

#[derive(Clone)]
pub struct WatchPublisher {
    sink: Arc<Mutex<Option<Arc<dyn WatchSink>>>>,
}

impl WatchPublisher {
    pub fn publish(&self, event: WatchEvent) -> Result<()> {
        let sink = self
            .sink
            .lock()
            .clone()
            .ok_or_else(|| CacheError::feed("watch source is not started"))?;
        sink.on_event(event);
        Ok(())
    }
}

/// Admin snapshot held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticSnapshot {
    pub groups: Vec<GroupDescription>,
    pub offsets: BTreeMap<String, BTreeMap<TopicPartition, SnapshotOffset>>,
}

impl AdminSnapshotSource for StaticSnapshot {
    fn describe_all_groups(&self) -> Result<Vec<GroupDescription>> {
        Ok(self.groups.clone())
    }

    fn list_all_group_offsets(
        &self,
    ) -> Result<BTreeMap<String, BTreeMap<TopicPartition, SnapshotOffset>>> {
        Ok(self.offsets.clone())
    }
}
