//! Thread-safe FIFO queues of fixed-size records.
//!
//! # Overview
//!
//! - [`TwoLockQueue`] - An unbounded FIFO protected by separate head and tail
//!   mutexes, so a producer appending records and a consumer removing them
//!   only contend when the queue holds one record or less.
//! - [`ShardedQueue`] - Stripes records across many [`TwoLockQueue`] shards
//!   behind atomic round-robin cursors, trading strict global FIFO order for
//!   reduced cross-thread contention.
//!
//! Records are opaque byte blobs of a fixed size chosen at construction.
//! They are copied in on [`add`](TwoLockQueue::add) and copied out on
//! [`remove`](TwoLockQueue::remove)/[`peek`](TwoLockQueue::peek); the queue
//! never aliases caller memory after a call returns.
//!
//! # Example
//!
//! ```
//! use shoal::ShardedQueue;
//!
//! let queue = ShardedQueue::new(8, 4)?;
//!
//! queue.add(&42u64.to_le_bytes())?;
//!
//! let mut out = [0u8; 8];
//! queue.remove(&mut out)?;
//! assert_eq!(u64::from_le_bytes(out), 42);
//! # Ok::<(), shoal::Error>(())
//! ```
//!
//! # Ordering guarantees
//!
//! A single [`TwoLockQueue`] is strictly FIFO. A [`ShardedQueue`] delivers
//! every record to exactly one caller but only guarantees FIFO order within
//! each shard, not across shards.

pub mod error;
pub mod queue;
pub mod sharded;
pub mod trace;

mod fifo;

pub use error::{Error, Result};
pub use queue::TwoLockQueue;
pub use sharded::ShardedQueue;
pub use trace::init_tracing;
