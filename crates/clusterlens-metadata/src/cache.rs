//! Materialized Cache Engine
//!
//! A generic in-memory view folded from a keyed change feed. The engine owns
//! the concurrency discipline; a [`Materializer`] supplies the domain rules
//! (how a delta changes an entry, which topics an entry references).
//!
//! ## Per-key Lifecycle
//!
//! ```text
//! absent ──upsert──▶ present ──upsert──▶ present ...
//!    ▲                  │
//!    └────tombstone─────┘
//! ```
//!
//! ## Consistency
//!
//! One `parking_lot::RwLock` guards the primary map, the per-key derived
//! state (time series, pending attachments) and the topic reverse index.
//! A batch is applied inside a single write-lock section, so readers see
//! either none or all of it.
//!
//! - **Reads** take the shared lock and return owned copies.
//! - **Writes** take the exclusive lock once per batch.
//! - **Listeners** run after the lock is released, on the thread that applied
//!   the batch. They may call back into the read API.
//!
//! ## Bootstrap
//!
//! [`MaterializedCache::bootstrap`] applies the initial replay once, fires no
//! listeners and raises the started signal. Reads before that are valid but
//! possibly incomplete.
//!
//! ## Listener Delivery
//!
//! After each incremental batch every listener is told about every key whose
//! state effectively changed, once per key, in the order keys first appeared
//! in the batch. The final state wins: a key updated twice is delivered once
//! with its last value. Listener errors and panics are logged and counted per
//! key; delivery continues.
//!
//! A delta whose [`Materializer::apply`] panics is logged, counted and
//! skipped. Whatever the materializer left in the slot stays in place and
//! the rest of the batch is applied.

use std::borrow::Borrow;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clusterlens_observability::metrics::{
    APPLY_PANICS_TOTAL, BATCHES_REJECTED_TOTAL, BATCH_SIZE, CACHE_ENTRIES,
    LISTENER_FAILURES_TOTAL, RECORDS_APPLIED_TOTAL,
};
use parking_lot::{Condvar, Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::error::{CacheError, Result};

/// Primary key of a cache entry
pub trait CacheKey: Clone + Ord + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Blank keys are rejected by every write operation
    fn is_blank(&self) -> bool;
}

impl CacheKey for String {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

/// Per-key state kept beside an entry but never returned as part of it
pub trait DerivedState: Send + Sync + 'static {
    /// Empty derived state of an absent key is dropped
    fn is_empty(&self) -> bool;
}

impl DerivedState for () {
    fn is_empty(&self) -> bool {
        true
    }
}

/// Effect of one delta on its key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The entry was created or changed
    Updated,
    /// The entry was evicted
    Removed,
    /// Nothing visible changed
    Unchanged,
}

/// Domain rules plugged into a [`MaterializedCache`]
pub trait Materializer: Send + Sync + 'static {
    type Key: CacheKey;
    type Value: Clone + Send + Sync + 'static;
    type Delta: Send;
    type Derived: DerivedState;

    /// Cache name used in logs and metrics
    fn name(&self) -> &'static str;

    fn new_derived(&self) -> Self::Derived;

    /// Fold `delta` into the entry. `slot` holds the current value (`None` if
    /// absent); leaving it `None` evicts the entry. Must return `Removed`
    /// only when a present entry was evicted.
    fn apply(
        &self,
        key: &Self::Key,
        slot: &mut Option<Self::Value>,
        derived: &mut Self::Derived,
        delta: Self::Delta,
    ) -> Outcome;

    /// Topics the value references, for the reverse index
    fn topics(&self, value: &Self::Value) -> BTreeSet<String>;
}

/// Receives effective changes after each incremental batch
pub trait CacheListener<K, V>: Send + Sync {
    fn on_entity_updated(&self, key: &K, value: &V) -> anyhow::Result<()>;
    fn on_entity_removed(&self, key: &K) -> anyhow::Result<()>;
}

/// Per-delta outcome counts of one applied batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub updated: usize,
    pub removed: usize,
    pub skipped: usize,
}

impl ApplySummary {
    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Updated => self.updated += 1,
            Outcome::Removed => self.removed += 1,
            Outcome::Unchanged => self.skipped += 1,
        }
    }
}

enum Change<K, V> {
    Updated(K, V),
    Removed(K),
}

struct State<M: Materializer> {
    entries: BTreeMap<M::Key, M::Value>,
    derived: HashMap<M::Key, M::Derived>,
    topic_index: HashMap<String, BTreeSet<M::Key>>,
    topics_of: HashMap<M::Key, BTreeSet<String>>,
}

impl<M: Materializer> State<M> {
    fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            derived: HashMap::new(),
            topic_index: HashMap::new(),
            topics_of: HashMap::new(),
        }
    }

    fn reindex(&mut self, key: &M::Key, topics: BTreeSet<String>) {
        let previous = self.topics_of.remove(key).unwrap_or_default();

        for topic in previous.difference(&topics) {
            if let Some(keys) = self.topic_index.get_mut(topic) {
                keys.remove(key);
                if keys.is_empty() {
                    self.topic_index.remove(topic);
                }
            }
        }
        for topic in topics.difference(&previous) {
            self.topic_index
                .entry(topic.clone())
                .or_default()
                .insert(key.clone());
        }

        if !topics.is_empty() {
            self.topics_of.insert(key.clone(), topics);
        }
    }
}

/// Raised once bootstrap completes
struct StartedSignal {
    started: Mutex<bool>,
    cond: Condvar,
}

impl StartedSignal {
    fn new() -> Self {
        Self {
            started: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn set(&self) {
        let mut started = self.started.lock();
        *started = true;
        self.cond.notify_all();
    }

    fn is_set(&self) -> bool {
        *self.started.lock()
    }

    fn wait(&self, timeout: Duration) -> bool {
        let mut started = self.started.lock();
        // A timeout past the end of the clock waits without a deadline
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            while !*started {
                self.cond.wait(&mut started);
            }
            return true;
        };
        while !*started {
            if self.cond.wait_until(&mut started, deadline).timed_out() {
                return *started;
            }
        }
        true
    }
}

pub struct MaterializedCache<M: Materializer> {
    materializer: M,
    state: RwLock<State<M>>,
    listeners: RwLock<Vec<Arc<dyn CacheListener<M::Key, M::Value>>>>,
    bootstrapped: AtomicBool,
    started: StartedSignal,
}

impl<M: Materializer> MaterializedCache<M> {
    pub fn new(materializer: M) -> Self {
        Self {
            materializer,
            state: RwLock::new(State::new()),
            listeners: RwLock::new(Vec::new()),
            bootstrapped: AtomicBool::new(false),
            started: StartedSignal::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.materializer.name()
    }

    pub fn materializer(&self) -> &M {
        &self.materializer
    }

    pub fn add_listener(&self, listener: Arc<dyn CacheListener<M::Key, M::Value>>) {
        self.listeners.write().push(listener);
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    fn validate(&self, deltas: &[(M::Key, M::Delta)]) -> Result<()> {
        if let Some((key, _)) = deltas.iter().find(|(key, _)| key.is_blank()) {
            BATCHES_REJECTED_TOTAL
                .with_label_values(&[self.name()])
                .inc();
            return Err(CacheError::PreconditionViolation(format!(
                "blank key {:?} in {} batch",
                key,
                self.name()
            )));
        }
        Ok(())
    }

    /// Apply the initial replay. Fires no listeners; may be called once.
    pub fn bootstrap(&self, deltas: Vec<(M::Key, M::Delta)>) -> Result<ApplySummary> {
        self.validate(&deltas)?;
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            return Err(CacheError::AlreadyStarted(self.name()));
        }

        let (summary, _) = self.apply_batch(deltas);
        self.started.set();
        info!(
            cache = self.name(),
            entries = self.len(),
            updated = summary.updated,
            removed = summary.removed,
            "Bootstrap complete"
        );
        Ok(summary)
    }

    /// Apply a live batch, then notify listeners of the effective changes.
    pub fn apply_incremental(&self, deltas: Vec<(M::Key, M::Delta)>) -> Result<ApplySummary> {
        self.validate(&deltas)?;
        let (summary, changes) = self.apply_batch(deltas);
        self.dispatch(changes);
        Ok(summary)
    }

    fn apply_batch(
        &self,
        deltas: Vec<(M::Key, M::Delta)>,
    ) -> (ApplySummary, Vec<Change<M::Key, M::Value>>) {
        let name = self.name();
        BATCH_SIZE
            .with_label_values(&[name])
            .observe(deltas.len() as f64);

        let mut summary = ApplySummary::default();
        // First-seen order of changed keys, with whether each existed before the batch
        let mut touched: Vec<(M::Key, bool)> = Vec::new();
        let mut seen: BTreeSet<M::Key> = BTreeSet::new();

        let (changes, entries) = {
            let mut state = self.state.write();

            for (key, delta) in deltas {
                let existed = state.entries.contains_key(&key);
                let outcome = self.apply_one(&mut state, &key, delta);
                summary.record(outcome);
                if outcome != Outcome::Unchanged && seen.insert(key.clone()) {
                    touched.push((key, existed));
                }
            }

            let changes: Vec<_> = touched
                .into_iter()
                .filter_map(|(key, existed)| match state.entries.get(&key) {
                    Some(value) => {
                        let value = value.clone();
                        Some(Change::Updated(key, value))
                    }
                    None if existed => Some(Change::Removed(key)),
                    None => None,
                })
                .collect();
            (changes, state.entries.len())
        };

        RECORDS_APPLIED_TOTAL
            .with_label_values(&[name, "updated"])
            .inc_by(summary.updated as u64);
        RECORDS_APPLIED_TOTAL
            .with_label_values(&[name, "removed"])
            .inc_by(summary.removed as u64);
        RECORDS_APPLIED_TOTAL
            .with_label_values(&[name, "skipped"])
            .inc_by(summary.skipped as u64);
        CACHE_ENTRIES
            .with_label_values(&[name])
            .set(entries as i64);

        (summary, changes)
    }

    fn apply_one(&self, state: &mut State<M>, key: &M::Key, delta: M::Delta) -> Outcome {
        let mut slot = state.entries.remove(key);
        let mut derived = state
            .derived
            .remove(key)
            .unwrap_or_else(|| self.materializer.new_derived());

        let outcome = match catch_unwind(AssertUnwindSafe(|| {
            self.materializer.apply(key, &mut slot, &mut derived, delta)
        })) {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(cache = self.name(), key = %key, "Fold panicked, delta skipped");
                APPLY_PANICS_TOTAL.with_label_values(&[self.name()]).inc();
                Outcome::Unchanged
            }
        };

        let topics = slot
            .as_ref()
            .map(|value| self.materializer.topics(value))
            .unwrap_or_default();
        let absent = slot.is_none();
        if let Some(value) = slot {
            state.entries.insert(key.clone(), value);
        }

        // Eviction takes derived state with it
        if outcome != Outcome::Removed && !(absent && derived.is_empty()) {
            state.derived.insert(key.clone(), derived);
        }
        state.reindex(key, topics);

        if outcome == Outcome::Unchanged {
            debug!(cache = self.name(), key = %key, "Delta had no visible effect");
        }
        outcome
    }

    fn dispatch(&self, changes: Vec<Change<M::Key, M::Value>>) {
        if changes.is_empty() {
            return;
        }
        let listeners = self.listeners.read().clone();
        let name = self.name();

        for change in &changes {
            for listener in &listeners {
                let (key, result) = match change {
                    Change::Updated(key, value) => (
                        key,
                        catch_unwind(AssertUnwindSafe(|| listener.on_entity_updated(key, value))),
                    ),
                    Change::Removed(key) => (
                        key,
                        catch_unwind(AssertUnwindSafe(|| listener.on_entity_removed(key))),
                    ),
                };

                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        error!(cache = name, key = %key, error = %e, "Listener failed");
                        LISTENER_FAILURES_TOTAL
                            .with_label_values(&[name, "error"])
                            .inc();
                    }
                    Err(_) => {
                        error!(cache = name, key = %key, "Listener panicked");
                        LISTENER_FAILURES_TOTAL
                            .with_label_values(&[name, "panic"])
                            .inc();
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get<Q>(&self, key: &Q) -> Option<M::Value>
    where
        M::Key: Borrow<Q>,
        Q: Ord + Hash + ?Sized,
    {
        self.state.read().entries.get(key).cloned()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        M::Key: Borrow<Q>,
        Q: Ord + Hash + ?Sized,
    {
        self.state.read().entries.contains_key(key)
    }

    /// All values, ordered by key
    pub fn values(&self) -> Vec<M::Value> {
        self.state.read().entries.values().cloned().collect()
    }

    /// All keys, sorted
    pub fn keys(&self) -> Vec<M::Key> {
        self.state.read().entries.keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(M::Key, M::Value)> {
        self.state
            .read()
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Keys whose value references `topic`, sorted
    pub fn keys_for_topic(&self, topic: &str) -> Vec<M::Key> {
        self.state
            .read()
            .topic_index
            .get(topic)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Values whose key references `topic`, ordered by key
    pub fn values_for_topic(&self, topic: &str) -> Vec<M::Value> {
        let state = self.state.read();
        state
            .topic_index
            .get(topic)
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| state.entries.get(key).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Topics referenced by at least one entry, sorted
    pub fn indexed_topics(&self) -> Vec<String> {
        let state = self.state.read();
        let mut topics: Vec<String> = state.topic_index.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Read derived state under the shared lock
    pub fn derived<Q, R>(&self, key: &Q, f: impl FnOnce(&M::Derived) -> R) -> Option<R>
    where
        M::Key: Borrow<Q>,
        Q: Ord + Hash + Eq + ?Sized,
    {
        self.state.read().derived.get(key).map(f)
    }

    pub fn is_started(&self) -> bool {
        self.started.is_set()
    }

    /// Block until bootstrap completes or `timeout` elapses
    pub fn wait_started(&self, timeout: Duration) -> bool {
        self.started.wait(timeout)
    }
}
