//! Running summary statistics
//!
//! Count, min, max, mean and variance maintained incrementally with Welford's
//! algorithm, so a value is folded in O(1) without keeping the samples.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    count: u64,
    min: f64,
    max: f64,
    mean: f64,
    /// Sum of squared differences from the running mean
    m2: f64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation in
    pub fn add(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);

        // Welford's algorithm
        let old_mean = self.mean;
        self.mean = old_mean + (value - old_mean) / self.count as f64;
        self.m2 += (value - old_mean) * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn min(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.max)
    }

    pub fn mean(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.mean)
    }

    /// Sample variance; needs at least two observations
    pub fn variance(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        Some(self.m2 / (self.count - 1) as f64)
    }

    pub fn std_dev(&self) -> Option<f64> {
        self.variance().map(f64::sqrt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let stats = Statistics::new();
        assert_eq!(stats.count(), 0);
        assert_eq!(stats.mean(), None);
        assert_eq!(stats.min(), None);
        assert_eq!(stats.variance(), None);
    }

    #[test]
    fn test_matches_direct_computation() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut stats = Statistics::new();
        for v in values {
            stats.add(v);
        }

        assert_eq!(stats.count(), 8);
        assert_eq!(stats.min(), Some(2.0));
        assert_eq!(stats.max(), Some(9.0));
        assert!((stats.mean().unwrap() - 5.0).abs() < 1e-9);
        // Sum of squares about the mean is 32
        assert!((stats.variance().unwrap() - 32.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_value() {
        let mut stats = Statistics::new();
        stats.add(-3.5);
        assert_eq!(stats.min(), Some(-3.5));
        assert_eq!(stats.max(), Some(-3.5));
        assert_eq!(stats.mean(), Some(-3.5));
        assert_eq!(stats.std_dev(), None);
    }
}
