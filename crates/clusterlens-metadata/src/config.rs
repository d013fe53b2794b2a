//! Cache configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file (or no file)
//! is a valid configuration:
//!
//! ```toml
//! [time_series]
//! granularity = "minute"
//! max_buckets = 10
//!
//! [transactions]
//! history_size = 16
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::timeseries::Granularity;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LensConfig {
    pub time_series: TimeSeriesConfig,
    pub transactions: TransactionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeSeriesConfig {
    /// Bucket width
    pub granularity: Granularity,

    /// Newest buckets retained per series
    pub max_buckets: usize,
}

impl Default for TimeSeriesConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::Minute,
            max_buckets: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Coordinator snapshots retained per transactional id
    pub history_size: usize,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self { history_size: 16 }
    }
}

impl LensConfig {
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: LensConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CacheError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.time_series.max_buckets < 2 {
            return Err(CacheError::Config(
                "time_series.max_buckets must be at least 2".to_string(),
            ));
        }
        if self.transactions.history_size == 0 {
            return Err(CacheError::Config(
                "transactions.history_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LensConfig::default();
        assert_eq!(config.time_series.granularity, Granularity::Minute);
        assert_eq!(config.time_series.max_buckets, 10);
        assert_eq!(config.transactions.history_size, 16);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(LensConfig::from_toml("").unwrap(), LensConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = LensConfig::from_toml(
            r#"
            [time_series]
            granularity = "second"
        "#,
        )
        .unwrap();
        assert_eq!(config.time_series.granularity, Granularity::Second);
        assert_eq!(config.time_series.max_buckets, 10);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = LensConfig::from_toml("[transactions]\nhistory_size = 0\n");
        assert!(matches!(result, Err(CacheError::Config(_))));

        let result = LensConfig::from_toml("[time_series]\ngranularity = \"fortnight\"\n");
        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[transactions]\nhistory_size = 4").unwrap();
        let config = LensConfig::load(file.path()).unwrap();
        assert_eq!(config.transactions.history_size, 4);
    }
}
