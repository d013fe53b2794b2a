//! Transaction cache
//!
//! Keyed by transactional id. Each coordinator snapshot is folded into the
//! entry's [`TransactionProjection`]; a tombstone evicts the entry.
//!
//! Besides the projection, every entry keeps two series of cumulative
//! counters (commits and aborts) sampled at each snapshot's last-update
//! timestamp, so the series rates read as commits or aborts per unit time.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use clusterlens_core::{
    DecodedRecord, Delta, FeedKind, RecordKey, RecordValue, TransactionLogValue,
};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::cache::{
    ApplySummary, CacheListener, DerivedState, MaterializedCache, Materializer, Outcome,
};
use crate::config::{LensConfig, TimeSeriesConfig};
use crate::error::{CacheError, Result};
use crate::feed::{decode_batch, FeedRecord, FeedSink, StreamingFeed};
use crate::timeseries::OffsetTimeSeries;
use crate::transaction::{TransactionProjection, TransactionProjector};

#[derive(Debug, Default)]
pub struct TransactionDerived {
    commits: Option<OffsetTimeSeries>,
    aborts: Option<OffsetTimeSeries>,
}

impl DerivedState for TransactionDerived {
    fn is_empty(&self) -> bool {
        self.commits.is_none() && self.aborts.is_none()
    }
}

pub struct TransactionMaterializer {
    projector: TransactionProjector,
    time_series: TimeSeriesConfig,
}

impl TransactionMaterializer {
    pub fn new(projector: TransactionProjector, time_series: TimeSeriesConfig) -> Self {
        Self {
            projector,
            time_series,
        }
    }

    pub fn projector(&self) -> &TransactionProjector {
        &self.projector
    }
}

impl Materializer for TransactionMaterializer {
    type Key = String;
    type Value = TransactionProjection;
    type Delta = Option<TransactionLogValue>;
    type Derived = TransactionDerived;

    fn name(&self) -> &'static str {
        "transactions"
    }

    fn new_derived(&self) -> TransactionDerived {
        TransactionDerived::default()
    }

    fn apply(
        &self,
        key: &String,
        slot: &mut Option<TransactionProjection>,
        derived: &mut TransactionDerived,
        delta: Option<TransactionLogValue>,
    ) -> Outcome {
        let Some(record) = delta else {
            return match slot.take() {
                Some(_) => Outcome::Removed,
                None => Outcome::Unchanged,
            };
        };

        let timestamp = record.last_update_timestamp;
        *slot = self.projector.fold(key, slot.take(), [Some(record)]);

        if let Some(projection) = slot.as_ref() {
            let config = &self.time_series;
            derived
                .commits
                .get_or_insert_with(|| OffsetTimeSeries::with_config(format!("{}-commits", key), config))
                .append(timestamp, projection.commit_count() as i64);
            derived
                .aborts
                .get_or_insert_with(|| OffsetTimeSeries::with_config(format!("{}-aborts", key), config))
                .append(timestamp, projection.abort_count() as i64);
        }
        Outcome::Updated
    }

    fn topics(&self, value: &TransactionProjection) -> BTreeSet<String> {
        value.topics().clone()
    }
}

fn log_deltas(records: Vec<FeedRecord>) -> Vec<(String, Option<TransactionLogValue>)> {
    decode_batch(FeedKind::TransactionLog, records)
        .into_iter()
        .filter_map(|(record, _)| from_record(record))
        .collect()
}

fn from_record(record: DecodedRecord) -> Option<(String, Option<TransactionLogValue>)> {
    match (record.key, record.delta) {
        (RecordKey::Transaction { transactional_id }, Delta::Upsert(RecordValue::Transaction(v))) => {
            Some((transactional_id, Some(v)))
        }
        (RecordKey::Transaction { transactional_id }, Delta::Tombstone) => {
            Some((transactional_id, None))
        }
        (key, _) => {
            warn!(kind = key.kind(), "Unexpected record on the transaction log");
            None
        }
    }
}

struct TransactionFeedSink {
    cache: Arc<MaterializedCache<TransactionMaterializer>>,
}

impl FeedSink for TransactionFeedSink {
    fn on_bootstrap(&self, records: Vec<FeedRecord>) -> Result<()> {
        self.cache.bootstrap(log_deltas(records))?;
        Ok(())
    }

    fn on_batch(&self, records: Vec<FeedRecord>) -> Result<()> {
        self.cache.apply_incremental(log_deltas(records))?;
        Ok(())
    }
}

/// Materialized view of every transactional id
pub struct TransactionCache {
    cache: Arc<MaterializedCache<TransactionMaterializer>>,
    feed: Mutex<Option<Box<dyn StreamingFeed>>>,
}

impl TransactionCache {
    pub fn new(config: &LensConfig) -> Self {
        let projector = TransactionProjector::new(config.transactions.history_size);
        Self {
            cache: Arc::new(MaterializedCache::new(TransactionMaterializer::new(
                projector,
                config.time_series,
            ))),
            feed: Mutex::new(None),
        }
    }

    pub fn start(&self, mut feed: Box<dyn StreamingFeed>) -> Result<()> {
        let mut slot = self.feed.lock();
        if slot.is_some() {
            return Err(CacheError::AlreadyStarted("transaction cache"));
        }

        feed.start(Arc::new(TransactionFeedSink {
            cache: self.cache.clone(),
        }))?;
        *slot = Some(feed);

        info!(transactions = self.cache.len(), "Transaction cache started");
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        if let Some(mut feed) = self.feed.lock().take() {
            feed.close()?;
            info!("Transaction cache closed");
        }
        Ok(())
    }

    /// Apply deltas directly, bypassing the feed. `None` is a tombstone.
    pub fn apply(
        &self,
        deltas: Vec<(String, Option<TransactionLogValue>)>,
    ) -> Result<ApplySummary> {
        self.cache.apply_incremental(deltas)
    }

    pub fn transaction(&self, transactional_id: &str) -> Option<TransactionProjection> {
        self.cache.get(transactional_id)
    }

    pub fn transactions(&self) -> Vec<TransactionProjection> {
        self.cache.values()
    }

    pub fn transactional_ids(&self) -> Vec<String> {
        self.cache.keys()
    }

    /// Transactions whose retained history touches `topic`
    pub fn transactions_for_topic(&self, topic: &str) -> Vec<TransactionProjection> {
        self.cache.values_for_topic(topic)
    }

    /// Cumulative commit count over time
    pub fn commit_time_series(&self, transactional_id: &str) -> Option<OffsetTimeSeries> {
        self.cache
            .derived(transactional_id, |d| d.commits.clone())
            .flatten()
    }

    /// Cumulative abort count over time
    pub fn abort_time_series(&self, transactional_id: &str) -> Option<OffsetTimeSeries> {
        self.cache
            .derived(transactional_id, |d| d.aborts.clone())
            .flatten()
    }

    pub fn add_listener(&self, listener: Arc<dyn CacheListener<String, TransactionProjection>>) {
        self.cache.add_listener(listener);
    }

    pub fn is_started(&self) -> bool {
        self.cache.is_started()
    }

    pub fn wait_started(&self, timeout: Duration) -> bool {
        self.cache.wait_started(timeout)
    }

    pub fn cache(&self) -> &MaterializedCache<TransactionMaterializer> {
        &self.cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterlens_core::{TopicPartition, TransactionState};

    const MINUTE: i64 = 60_000;

    fn record(state: TransactionState, start: i64, update: i64, topic: &str) -> TransactionLogValue {
        TransactionLogValue {
            version: 1,
            producer_id: 42,
            producer_epoch: 0,
            timeout_ms: 60_000,
            state,
            partitions: vec![TopicPartition::new(topic, 0)],
            last_update_timestamp: update,
            start_timestamp: start,
        }
    }

    fn delta(id: &str, value: TransactionLogValue) -> (String, Option<TransactionLogValue>) {
        (id.to_string(), Some(value))
    }

    #[test]
    fn test_txn1_commit_scenario() {
        let cache = TransactionCache::new(&LensConfig::default());
        cache
            .apply(vec![
                delta("txn1", record(TransactionState::Ongoing, 0, 0, "orders")),
                delta("txn1", record(TransactionState::CompleteCommit, 0, 100, "orders")),
            ])
            .unwrap();
        cache
            .apply(vec![
                delta("txn1", record(TransactionState::Ongoing, 200, 200, "orders")),
                delta("txn1", record(TransactionState::CompleteCommit, 200, 250, "orders")),
            ])
            .unwrap();

        let txn = cache.transaction("txn1").unwrap();
        assert_eq!(txn.commit_count(), 2);
        assert_eq!(txn.execution_time().mean(), Some(75.0));
        assert_eq!(txn.history_len(), 4);
    }

    #[test]
    fn test_counter_series_rates() {
        let cache = TransactionCache::new(&LensConfig::default());
        cache
            .apply(vec![
                delta("txn1", record(TransactionState::CompleteCommit, 0, 0, "a")),
                delta("txn1", record(TransactionState::CompleteCommit, 0, MINUTE, "a")),
                delta("txn1", record(TransactionState::CompleteCommit, 0, MINUTE + 1, "a")),
                delta("txn1", record(TransactionState::CompleteAbort, 0, 2 * MINUTE, "a")),
            ])
            .unwrap();

        let commits = cache.commit_time_series("txn1").unwrap();
        assert_eq!(commits.id(), "txn1-commits");
        let values: Vec<_> = commits.samples().map(|(_, v)| v).collect();
        assert_eq!(values, vec![1, 3, 3]);

        let aborts = cache.abort_time_series("txn1").unwrap();
        assert_eq!(aborts.current_rate_per_minute(), Some(1.0));
    }

    #[test]
    fn test_tombstone_evicts_entry_and_series() {
        let cache = TransactionCache::new(&LensConfig::default());
        cache
            .apply(vec![delta("txn1", record(TransactionState::Ongoing, 0, 0, "orders"))])
            .unwrap();
        assert_eq!(cache.transactions_for_topic("orders").len(), 1);

        let summary = cache.apply(vec![("txn1".to_string(), None)]).unwrap();
        assert_eq!(summary.removed, 1);
        assert!(cache.transaction("txn1").is_none());
        assert!(cache.commit_time_series("txn1").is_none());
        assert!(cache.transactions_for_topic("orders").is_empty());

        // Absent key: no-op
        let summary = cache.apply(vec![("txn1".to_string(), None)]).unwrap();
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_history_size_from_config() {
        let mut config = LensConfig::default();
        config.transactions.history_size = 3;
        let cache = TransactionCache::new(&config);
        let deltas = (0..5)
            .map(|i| delta("txn1", record(TransactionState::Ongoing, i, i, &format!("t{}", i))))
            .collect();
        cache.apply(deltas).unwrap();

        let txn = cache.transaction("txn1").unwrap();
        assert_eq!(txn.history_len(), 3);
        assert!(cache.transactions_for_topic("t0").is_empty());
        assert_eq!(cache.transactions_for_topic("t4").len(), 1);
    }
}
