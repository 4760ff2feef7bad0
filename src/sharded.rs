//! Sharded FIFO queue: round-robin striping over two-lock shards.
//!
//! A [`ShardedQueue`] owns a fixed array of [`TwoLockQueue`] shards plus two
//! atomic cursors. `add` picks its shard with a single `fetch_add` on the
//! enqueue cursor; `remove`/`peek` start from the dequeue cursor and probe
//! every shard once until one yields a record.
//!
//! # Algorithm
//!
//! - Cursors are `u64` and deliberately allowed to wrap: only their value
//!   modulo the shard count matters, so the walk uses wrapping arithmetic and
//!   stays correct when `begin + C` crosses the overflow boundary.
//! - A caller that finds its reserved shard momentarily empty falls back to
//!   sibling shards. Every record is still delivered to exactly one caller,
//!   but cross-shard delivery order is not globally FIFO.
//! - A remove that observes all `C` shards empty fails [`Error::Empty`]
//!   immediately; there is no retry, even if an add is in flight.
//!
//! # Example
//!
//! ```
//! use shoal::ShardedQueue;
//!
//! let queue = ShardedQueue::new(8, 4)?;
//! for i in 0..4u64 {
//!     queue.add(&i.to_le_bytes())?; // lands in shard i % 4
//! }
//!
//! let mut out = [0u8; 8];
//! for _ in 0..4 {
//!     queue.remove(&mut out)?;
//! }
//! assert!(queue.is_empty());
//! # Ok::<(), shoal::Error>(())
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::queue::TwoLockQueue;
use crate::trace::{debug, trace};

/// Atomic cursor on its own cache line, so the enqueue and dequeue sides do
/// not false-share.
#[repr(align(64))]
struct Cursor(AtomicU64);

impl Cursor {
    const fn new() -> Self {
        Self(AtomicU64::new(0))
    }
}

/// Thread-safe FIFO of fixed-size records, striped over independent shards.
///
/// The shard array is immutable in length and address for the life of the
/// instance, so concurrent callers index it without synchronization; only
/// the contents of each shard are synchronized, via that shard's own locks.
/// No operation ever holds locks belonging to two different shards at once,
/// making cross-shard deadlock structurally impossible.
pub struct ShardedQueue {
    /// The shards, all sharing the same record size.
    shards: Box<[TwoLockQueue]>,

    /// Reserves a shard for each `add` (pre-increment value, modulo the
    /// shard count). Never rolled back, even when the shard's add fails.
    enqueue: Cursor,

    /// Reserves a scan start for each `remove`. `peek` reads it without
    /// incrementing.
    dequeue: Cursor,
}

impl ShardedQueue {
    /// Creates a queue with `concurrency` shards for records of
    /// `record_size` bytes.
    ///
    /// # Errors
    ///
    /// [`Error::ConcurrencyIsZero`] if `concurrency` is zero; shard
    /// construction errors ([`Error::SizeIsZero`], [`Error::SizeTooLarge`],
    /// [`Error::ResourceExhausted`]) propagate unchanged, with all previously
    /// constructed shards torn down.
    pub fn new(record_size: usize, concurrency: usize) -> Result<Self> {
        if concurrency == 0 {
            return Err(Error::ConcurrencyIsZero);
        }
        let mut shards = Vec::new();
        shards
            .try_reserve_exact(concurrency)
            .map_err(|_| Error::ResourceExhausted)?;
        for _ in 0..concurrency {
            // On failure the vector drops, tearing down the shards built so
            // far before the error reaches the caller.
            shards.push(TwoLockQueue::new(record_size)?);
        }
        debug!(record_size, concurrency, "sharded queue created");
        Ok(Self {
            shards: shards.into_boxed_slice(),
            enqueue: Cursor::new(),
            dequeue: Cursor::new(),
        })
    }

    /// Returns the fixed record size in bytes (shared by every shard).
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.shards[0].record_size()
    }

    /// Returns the fixed shard count.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.shards.len()
    }

    /// Returns a snapshot of one shard's record count, or `None` if `shard`
    /// is out of range.
    ///
    /// Useful for observing how adds distribute across shards.
    #[must_use]
    pub fn shard_len(&self, shard: usize) -> Option<usize> {
        self.shards.get(shard).map(TwoLockQueue::len)
    }

    /// Returns a snapshot of the total record count.
    ///
    /// Shards are counted one after another without a global lock, so the
    /// total may be slightly inaccurate while other threads are active.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(TwoLockQueue::len).sum()
    }

    /// Returns `true` if no records are queued. Snapshot semantics as
    /// [`len`](Self::len).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.len() == 0)
    }

    /// Appends a copy of `record` to the next shard in round-robin order.
    ///
    /// # Errors
    ///
    /// [`Error::RecordSizeMismatch`] if `record` is not exactly
    /// [`record_size`](Self::record_size) bytes (checked before the cursor
    /// moves), [`Error::ResourceExhausted`] if the target shard cannot
    /// allocate. A failed add leaves its reserved cursor slot skipped; the
    /// cursor is only ever used modulo the shard count, so the skip is
    /// harmless.
    pub fn add(&self, record: &[u8]) -> Result<()> {
        self.check_len(record.len())?;

        let ticket = self.enqueue.0.fetch_add(1, Ordering::Relaxed);
        let shard = self.shard_at(ticket);
        self.shards[shard].add(record)
    }

    /// Removes one record, copying it into `out`.
    ///
    /// Reserves a starting shard via the dequeue cursor, then probes each of
    /// the `C` shards exactly once until one yields a record. Strict FIFO
    /// order holds only within a shard.
    ///
    /// # Errors
    ///
    /// [`Error::RecordSizeMismatch`] if `out` is not exactly
    /// [`record_size`](Self::record_size) bytes (checked before the cursor
    /// moves), [`Error::Empty`] if every shard reported empty during the
    /// scan.
    pub fn remove(&self, out: &mut [u8]) -> Result<()> {
        self.check_len(out.len())?;

        let begin = self.dequeue.0.fetch_add(1, Ordering::Relaxed);
        self.scan(begin, |shard| shard.remove(out))
    }

    /// Copies the next record the scan would remove into `out`, without
    /// removing it.
    ///
    /// Starts from the current dequeue cursor *without* incrementing it, so
    /// repeated peeks with no intervening removes observe the same shard
    /// walk.
    ///
    /// # Errors
    ///
    /// Same as [`remove`](Self::remove).
    pub fn peek(&self, out: &mut [u8]) -> Result<()> {
        self.check_len(out.len())?;

        let begin = self.dequeue.0.load(Ordering::Relaxed);
        self.scan(begin, |shard| shard.peek(out))
    }

    /// Removes every queued record, handing each to `on_record`, until the
    /// structure reports empty. Returns the number of records drained.
    ///
    /// Records are visited with the same probing walk as
    /// [`remove`](Self::remove): FIFO within a shard, unordered across
    /// shards. Takes `&mut self`: draining is not safe to run concurrently
    /// with other operations on the same queue.
    pub fn drain_with<F: FnMut(&[u8])>(&mut self, mut on_record: F) -> usize {
        let mut buf = vec![0u8; self.record_size()];
        let mut drained = 0usize;
        loop {
            match self.remove(&mut buf) {
                Ok(()) => {
                    drained += 1;
                    on_record(&buf);
                }
                Err(Error::Empty) => break,
                // The buffer length always matches, so no other error exists.
                Err(err) => unreachable!("drain hit unexpected error: {err}"),
            }
        }
        trace!(drained, "sharded queue drained");
        drained
    }

    /// Removes every queued record, discarding the contents. Returns the
    /// number of records dropped.
    pub fn clear(&mut self) -> usize {
        self.drain_with(|_| {})
    }

    /// Maps a cursor value onto a shard index.
    fn shard_at(&self, cursor: u64) -> usize {
        (cursor % self.shards.len() as u64) as usize
    }

    /// Probes every shard exactly once, starting at the cursor-derived
    /// index, and returns the first non-`Empty` outcome.
    ///
    /// `begin` may sit anywhere in the `u64` range; the walk uses wrapping
    /// arithmetic so the probe sequence stays correct when `begin + C`
    /// crosses the overflow boundary. The bound is always exactly `C`
    /// attempts: with `C == 1` the single shard is still probed once.
    fn scan<F>(&self, begin: u64, mut probe: F) -> Result<()>
    where
        F: FnMut(&TwoLockQueue) -> Result<()>,
    {
        for step in 0..self.shards.len() as u64 {
            let at = self.shard_at(begin.wrapping_add(step));
            match probe(&self.shards[at]) {
                Err(Error::Empty) => {
                    trace!(shard = at, "probe found shard empty");
                }
                outcome => return outcome,
            }
        }
        Err(Error::Empty)
    }

    /// Validates a caller buffer length against the fixed record size.
    fn check_len(&self, len: usize) -> Result<()> {
        let expected = self.record_size();
        if len != expected {
            return Err(Error::RecordSizeMismatch {
                expected,
                actual: len,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ShardedQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedQueue")
            .field("record_size", &self.record_size())
            .field("concurrency", &self.concurrency())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
impl ShardedQueue {
    /// Forces both cursors to arbitrary values, for wraparound tests.
    fn set_cursors(&self, enqueue: u64, dequeue: u64) {
        self.enqueue.0.store(enqueue, Ordering::Relaxed);
        self.dequeue.0.store(dequeue, Ordering::Relaxed);
    }

    /// Reads both cursors as `(enqueue, dequeue)`.
    fn cursors(&self) -> (u64, u64) {
        (
            self.enqueue.0.load(Ordering::Relaxed),
            self.dequeue.0.load(Ordering::Relaxed),
        )
    }
}
