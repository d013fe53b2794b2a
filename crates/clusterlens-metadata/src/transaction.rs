//! Transaction Projection
//!
//! Folds the unbounded stream of coordinator snapshots for one transactional
//! id into a bounded projection:
//!
//! - a ring of the most recent snapshots (oldest evicted on overflow)
//! - a commit counter (`CompleteCommit` snapshots)
//! - an abort counter (`CompleteAbort` and `Dead` snapshots)
//! - execution-time statistics over committed transactions
//!   (`last_update_timestamp - start_timestamp`, saturating, negative spans
//!   count as zero)
//! - the set of topics touched by the retained snapshots
//!
//! Folding is incremental: [`TransactionProjector::fold`] continues from an
//! existing projection without rescanning history. A tombstone resets the
//! projection to `None` and folding continues from scratch.

use std::collections::{BTreeSet, VecDeque};

use clusterlens_core::{TransactionLogValue, TransactionState};
use serde::{Deserialize, Serialize};

use crate::stats::Statistics;

pub const DEFAULT_HISTORY_SIZE: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionProjection {
    transactional_id: String,
    capacity: usize,
    history: VecDeque<TransactionLogValue>,
    commit_count: u64,
    abort_count: u64,
    execution_time: Statistics,
    topics: BTreeSet<String>,
}

impl TransactionProjection {
    fn new(transactional_id: &str, capacity: usize) -> Self {
        Self {
            transactional_id: transactional_id.to_string(),
            capacity: capacity.max(1),
            history: VecDeque::with_capacity(capacity),
            commit_count: 0,
            abort_count: 0,
            execution_time: Statistics::new(),
            topics: BTreeSet::new(),
        }
    }

    pub fn transactional_id(&self) -> &str {
        &self.transactional_id
    }

    /// The latest snapshot
    pub fn current(&self) -> Option<&TransactionLogValue> {
        self.history.back()
    }

    /// Retained snapshots, oldest first
    pub fn history(&self) -> impl Iterator<Item = &TransactionLogValue> + '_ {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn commit_count(&self) -> u64 {
        self.commit_count
    }

    pub fn abort_count(&self) -> u64 {
        self.abort_count
    }

    pub fn execution_time(&self) -> &Statistics {
        &self.execution_time
    }

    pub fn topics(&self) -> &BTreeSet<String> {
        &self.topics
    }

    fn push(&mut self, record: TransactionLogValue) {
        match record.state {
            TransactionState::CompleteCommit => {
                self.commit_count += 1;
                let elapsed = record
                    .last_update_timestamp
                    .saturating_sub(record.start_timestamp)
                    .max(0);
                self.execution_time.add(elapsed as f64);
            }
            TransactionState::CompleteAbort | TransactionState::Dead => {
                self.abort_count += 1;
            }
            _ => {}
        }

        self.history.push_back(record);
        while self.history.len() > self.capacity {
            self.history.pop_front();
        }

        self.topics = self
            .history
            .iter()
            .flat_map(|r| r.partitions.iter().map(|tp| tp.topic.clone()))
            .collect();
    }
}

/// Folds coordinator snapshots into [`TransactionProjection`]s.
#[derive(Debug, Clone, Copy)]
pub struct TransactionProjector {
    history_size: usize,
}

impl Default for TransactionProjector {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl TransactionProjector {
    pub fn new(history_size: usize) -> Self {
        Self {
            history_size: history_size.max(1),
        }
    }

    pub fn history_size(&self) -> usize {
        self.history_size
    }

    /// Fold `records` (in log order, `None` = tombstone) onto `previous`.
    pub fn fold<I>(
        &self,
        transactional_id: &str,
        previous: Option<TransactionProjection>,
        records: I,
    ) -> Option<TransactionProjection>
    where
        I: IntoIterator<Item = Option<TransactionLogValue>>,
    {
        let mut projection = previous;
        for record in records {
            match record {
                None => projection = None,
                Some(record) => projection
                    .get_or_insert_with(|| {
                        TransactionProjection::new(transactional_id, self.history_size)
                    })
                    .push(record),
            }
        }
        projection
    }
}
