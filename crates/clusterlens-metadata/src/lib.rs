//! ClusterLens Metadata Caches
//!
//! This crate turns the cluster's internal, compaction-log-shaped metadata into
//! consistent, queryable, time-aware in-memory views.
//!
//! ## Purpose
//!
//! A console needs to answer questions the cluster only records implicitly:
//! - **Consumer groups**: who is in the group, where did it commit, how fast is
//!   it moving?
//! - **Transactions**: how often does a transactional id commit or abort, and
//!   how long do its transactions take?
//! - **Topics**: which brokers host each partition, who leads it, is it under
//!   replicated?
//!
//! Each question maps to one cache, fed by one source:
//!
//! ```text
//! ┌────────────────┐   ┌──────────────────┐   ┌────────────────┐
//! │   group log    │   │ transaction log  │   │ coordination   │
//! │ (+ admin seed) │   │                  │   │     tree       │
//! └───────┬────────┘   └────────┬─────────┘   └───────┬────────┘
//!         │ FeedRecord          │ FeedRecord          │ WatchEvent
//!         ▼                     ▼                     ▼
//! ┌────────────────┐   ┌──────────────────┐   ┌────────────────┐
//! │ConsumerGroup-  │   │ TransactionCache │   │   TopicCache   │
//! │     Cache      │   │                  │   │                │
//! └───────┬────────┘   └────────┬─────────┘   └───────┬────────┘
//!         └──────────── MaterializedCache<M> ─────────┘
//!                     reads, listeners, reverse index
//! ```
//!
//! ## Usage Example
//!
//! ```ignore
//! use clusterlens_metadata::{ConsumerGroupCache, LensConfig, ReplayFeed};
//!
//! let config = LensConfig::load(Path::new("clusterlens.toml"))?;
//! let groups = ConsumerGroupCache::new(&config);
//! groups.start(Box::new(ReplayFeed::new(records)), None)?;
//!
//! for group in groups.groups_for_topic("orders") {
//!     println!("{} {:?}", group.group_id, group.state);
//! }
//! let series = groups.offset_time_series("analytics");
//! ```
//!
//! ## Consistency
//!
//! - Each cache applies a batch atomically with respect to its readers.
//! - Reads return owned copies.
//! - Listeners run after the batch is visible and may read the cache.
//! - Caches are independent; there is no cross-cache snapshot.
//!
//! ## Error Handling
//!
//! Undecodable feed records are logged, counted and skipped. Operations
//! return [`CacheError`] only for caller mistakes (blank ids, double start),
//! collaborator failures and configuration problems.

pub mod cache;
pub mod config;
pub mod error;
pub mod feed;
pub mod group;
pub mod source;
pub mod stats;
pub mod timeseries;
pub mod topic;
pub mod transaction;
pub mod transaction_cache;
pub mod types;

pub use cache::{
    ApplySummary, CacheKey, CacheListener, DerivedState, MaterializedCache, Materializer, Outcome,
};
pub use config::{LensConfig, TimeSeriesConfig, TransactionConfig};
pub use error::{CacheError, Result};
pub use feed::{
    AdminSnapshotSource, FeedPublisher, FeedRecord, FeedSink, HierarchicalWatchSource,
    ReplayFeed, ReplayWatchSource, StaticSnapshot, StreamingFeed, WatchEvent, WatchEventKind,
    WatchPublisher, WatchSink,
};
pub use group::{ConsumerGroupCache, GroupDelta, GroupMaterializer};
pub use source::{
    DataSource, GroupDescription, GroupView, MemberDescription, MemberView, OffsetView,
    SnapshotOffset,
};
pub use stats::Statistics;
pub use timeseries::{Granularity, OffsetTimeSeries};
pub use topic::{HierarchyProjector, TopicCache, TopicDelta};
pub use transaction::{TransactionProjection, TransactionProjector};
pub use transaction_cache::{TransactionCache, TransactionMaterializer};
pub use types::{
    GroupProjection, MemberProjection, OffsetProjection, PartitionInfo, PartitionLeadership,
    TopicProjection,
};
