//! Command handlers for lensctl
//!
//! Every command replays a capture into fresh caches, then queries them:
//! - Groups: consumer groups, committed offsets and commit rates
//! - Transactions: transactional ids, outcome counters and durations
//! - Topics: partition assignment, leadership and configuration

use std::path::Path;

use anyhow::{Context, Result};
use clusterlens_metadata::{
    AdminSnapshotSource, ConsumerGroupCache, LensConfig, TopicCache, TransactionCache,
};
use tracing::info;

use crate::capture::Capture;

pub mod groups;
pub mod topics;
pub mod transactions;

pub use groups::GroupCommands;
pub use topics::TopicCommands;
pub use transactions::TransactionCommands;

/// The three caches, populated from one capture
pub struct Lens {
    pub groups: ConsumerGroupCache,
    pub transactions: TransactionCache,
    pub topics: TopicCache,
}

impl Lens {
    pub fn open(config: &LensConfig, capture_path: &Path) -> Result<Self> {
        let capture = Capture::load(capture_path)?;
        Self::from_capture(config, &capture)
    }

    pub fn from_capture(config: &LensConfig, capture: &Capture) -> Result<Self> {
        let groups = ConsumerGroupCache::new(config);
        groups
            .start(
                Box::new(capture.group_feed()),
                capture.snapshot().map(|s| s as &dyn AdminSnapshotSource),
            )
            .context("Failed to replay group log")?;

        let transactions = TransactionCache::new(config);
        transactions
            .start(Box::new(capture.transaction_feed()))
            .context("Failed to replay transaction log")?;

        let topics = TopicCache::new();
        topics
            .start(Box::new(capture.watch_source()))
            .context("Failed to replay coordination events")?;

        info!(
            groups = groups.cache().len(),
            transactions = transactions.cache().len(),
            topics = topics.cache().len(),
            "Capture replayed"
        );

        Ok(Self {
            groups,
            transactions,
            topics,
        })
    }
}
