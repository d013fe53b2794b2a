//! Time-bucketed offset series
//!
//! An [`OffsetTimeSeries`] keeps one numeric value per time bucket for a single
//! series (an offset-committing partition, or a transaction counter). Samples
//! are quantized by flooring their timestamp to the series [`Granularity`].
//!
//! ## Semantics
//!
//! - Samples may arrive out of chronological order; each lands in its own bucket.
//! - Within a bucket the most recently appended value wins.
//! - Only the newest `max_buckets` buckets are retained.
//! - Deltas and rates compare a bucket with the previous *populated* bucket.
//!   A negative delta (an offset reset, for example) is a valid result.
//! - Arithmetic saturates, so extreme timestamps or values never panic.
//!
//! ## Example
//!
//! ```ignore
//! let mut series = OffsetTimeSeries::new("orders-0", Granularity::Minute, 10);
//! series.append(0, 100);
//! series.append(60_000, 160);
//! assert_eq!(series.current_rate_per_sec(), Some(1.0));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::TimeSeriesConfig;

/// Width of a time bucket, also used as the unit of a rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Second,
    Minute,
    Hour,
    Day,
}

impl Granularity {
    pub fn millis(&self) -> i64 {
        match self {
            Granularity::Second => 1_000,
            Granularity::Minute => 60_000,
            Granularity::Hour => 3_600_000,
            Granularity::Day => 86_400_000,
        }
    }

    /// Start of the bucket containing `timestamp_ms`. Timestamps in the
    /// partial bucket at the bottom of the `i64` range share `i64::MIN`.
    pub fn bucket(&self, timestamp_ms: i64) -> i64 {
        let width = self.millis();
        timestamp_ms.div_euclid(width).saturating_mul(width)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Second => "second",
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetTimeSeries {
    id: String,
    granularity: Granularity,
    max_buckets: usize,
    /// Bucket start (ms since epoch) -> value
    samples: BTreeMap<i64, i64>,
}

impl OffsetTimeSeries {
    pub fn new(id: impl Into<String>, granularity: Granularity, max_buckets: usize) -> Self {
        Self {
            id: id.into(),
            granularity,
            max_buckets: max_buckets.max(1),
            samples: BTreeMap::new(),
        }
    }

    pub fn with_config(id: impl Into<String>, config: &TimeSeriesConfig) -> Self {
        Self::new(id, config.granularity, config.max_buckets)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Populated buckets in chronological order
    pub fn samples(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.samples.iter().map(|(bucket, value)| (*bucket, *value))
    }

    /// Record `value` at `timestamp_ms`. Replaces any earlier value in the
    /// same bucket, then drops the oldest buckets beyond the retention limit.
    pub fn append(&mut self, timestamp_ms: i64, value: i64) {
        let bucket = self.granularity.bucket(timestamp_ms);
        self.samples.insert(bucket, value);
        while self.samples.len() > self.max_buckets {
            self.samples.pop_first();
        }
    }

    pub fn value_at(&self, timestamp_ms: i64) -> Option<i64> {
        self.samples
            .get(&self.granularity.bucket(timestamp_ms))
            .copied()
    }

    pub fn latest(&self) -> Option<(i64, i64)> {
        self.samples
            .last_key_value()
            .map(|(bucket, value)| (*bucket, *value))
    }

    /// Value at bucket(`timestamp_ms`) minus the value at the previous
    /// populated bucket. `None` unless both exist.
    pub fn delta_at(&self, timestamp_ms: i64) -> Option<i64> {
        let bucket = self.granularity.bucket(timestamp_ms);
        let value = self.samples.get(&bucket)?;
        let (_, previous) = self.samples.range(..bucket).next_back()?;
        Some(value.saturating_sub(*previous))
    }

    fn latest_pair(&self) -> Option<((i64, i64), (i64, i64))> {
        let mut newest_first = self.samples.iter().rev();
        let (t2, v2) = newest_first.next()?;
        let (t1, v1) = newest_first.next()?;
        Some(((*t1, *v1), (*t2, *v2)))
    }

    /// Delta between the two newest populated buckets
    pub fn current_delta(&self) -> Option<i64> {
        self.latest_pair().map(|((_, v1), (_, v2))| v2.saturating_sub(v1))
    }

    /// Rate between the two newest populated buckets, per `unit`
    pub fn current_rate_per(&self, unit: Granularity) -> Option<f64> {
        let ((t1, v1), (t2, v2)) = self.latest_pair()?;
        let elapsed_units = t2.saturating_sub(t1) as f64 / unit.millis() as f64;
        Some(v2.saturating_sub(v1) as f64 / elapsed_units)
    }

    pub fn current_rate_per_sec(&self) -> Option<f64> {
        self.current_rate_per(Granularity::Second)
    }

    pub fn current_rate_per_minute(&self) -> Option<f64> {
        self.current_rate_per(Granularity::Minute)
    }

    pub fn current_rate_per_hour(&self) -> Option<f64> {
        self.current_rate_per(Granularity::Hour)
    }
}
