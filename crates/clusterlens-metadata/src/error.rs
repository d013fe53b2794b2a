//! Cache Error Types
//!
//! ## Error Categories
//!
//! ### Caller Errors
//! - `PreconditionViolation`: malformed input to a public operation, such as a
//!   blank entity identifier. The whole call is rejected and nothing is applied.
//! - `AlreadyStarted`: a one-time operation (bootstrap, feed start) was repeated
//!
//! ### Collaborator Errors
//! - `Feed`: a streaming feed, watch source or admin source failed to start,
//!   stop or answer
//!
//! ### Setup Errors
//! - `Config`: the configuration file could not be read or parsed
//!
//! Listener failures are not errors of the calling operation: they are caught,
//! logged and counted per key. Undecodable records are logged, counted and
//! skipped by the feed.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("{0} already started")]
    AlreadyStarted(&'static str),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    pub fn feed(err: impl std::fmt::Display) -> Self {
        CacheError::Feed(err.to_string())
    }
}

impl From<toml::de::Error> for CacheError {
    fn from(e: toml::de::Error) -> Self {
        CacheError::Config(e.to_string())
    }
}
