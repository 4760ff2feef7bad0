//! Error taxonomy shared by [`TwoLockQueue`](crate::TwoLockQueue) and
//! [`ShardedQueue`](crate::ShardedQueue).
//!
//! Argument and configuration validation always happens before any mutation,
//! so a failed call has no side effects. Internal invariant violations are
//! not represented here: they indicate corrupted state and panic instead.

use thiserror::Error;

/// Result alias for queue operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the queue types.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The record size passed at construction was zero.
    #[error("record size must be greater than zero")]
    SizeIsZero,

    /// The record size passed at construction exceeds what a queue node can
    /// represent.
    #[error("record size {0} exceeds the maximum representable node size")]
    SizeTooLarge(usize),

    /// The shard count passed at construction was zero.
    #[error("concurrency must be greater than zero")]
    ConcurrencyIsZero,

    /// A record or output buffer does not match the queue's fixed record size.
    #[error("record length {actual} does not match the queue record size {expected}")]
    RecordSizeMismatch {
        /// The record size the queue was constructed with.
        expected: usize,
        /// The length of the buffer the caller passed.
        actual: usize,
    },

    /// Allocation failed while growing the queue.
    #[error("allocation failed while growing the queue")]
    ResourceExhausted,

    /// No record is available to remove or peek.
    #[error("queue is empty")]
    Empty,
}
