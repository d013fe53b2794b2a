//! # clusterlens-core
//!
//! Decoders for the metadata records of a log-based messaging platform:
//! consumer group and offset commits, transaction coordinator state and the
//! topic subtrees of the coordination service.
//!
//! The crate is pure: every decoder is a function from bytes to a typed
//! [`DecodedRecord`] or a [`DecodeError`]. Folding records into queryable
//! state is the job of `clusterlens-metadata`.

pub mod codec;
pub mod decoder;
pub mod error;
pub mod record;
pub mod types;
pub mod varint;

pub use decoder::{decode, FeedKind};
pub use error::{DecodeError, Result};
pub use record::{
    DecodedRecord, Delta, GroupMetadataValue, MemberMetadataValue, OffsetCommitValue,
    PartitionStateValue, RecordKey, RecordValue, TopicAssignmentValue, TopicConfigValue,
    TransactionLogValue,
};
pub use types::{GroupState, TopicPartition, TransactionState};
