//! Two-lock FIFO queue of fixed-size records.
//!
//! A classic two-lock queue: one mutex guards the head end, another the tail
//! end, so one producer and one consumer proceed without contending for the
//! same lock whenever the queue holds at least two records.
//!
//! # Overview
//!
//! - [`TwoLockQueue::add`] - appends under the tail lock only
//! - [`TwoLockQueue::remove`] / [`TwoLockQueue::peek`] - take the head lock,
//!   plus the tail lock in the ≤ 1-record boundary case where the two ends
//!   may alias the same node
//!
//! # Example
//!
//! ```
//! use shoal::TwoLockQueue;
//!
//! let queue = TwoLockQueue::new(4)?;
//! queue.add(&1u32.to_le_bytes())?;
//!
//! let mut out = [0u8; 4];
//! queue.remove(&mut out)?;
//! assert_eq!(u32::from_le_bytes(out), 1);
//! # Ok::<(), shoal::Error>(())
//! ```

use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::fifo::LinkedFifo;
use crate::trace::trace;

/// Unbounded thread-safe FIFO of fixed-size records.
///
/// # Lock order
///
/// Head-then-tail, never the reverse. `add` never touches the head lock,
/// which is what lets concurrent add and remove overlap in the common case.
pub struct TwoLockQueue {
    /// The unsynchronized node chain; access follows the lock protocol in
    /// [`crate::fifo`].
    fifo: LinkedFifo,

    /// Guards the head end (remove/peek side).
    head_lock: Mutex<()>,

    /// Guards the tail end (add side).
    tail_lock: Mutex<()>,
}

impl TwoLockQueue {
    /// Largest supported record size in bytes.
    pub const MAX_RECORD_SIZE: usize = crate::fifo::MAX_RECORD_SIZE;

    /// Creates an empty queue for records of `record_size` bytes.
    ///
    /// # Errors
    ///
    /// [`Error::SizeIsZero`] if `record_size` is zero, [`Error::SizeTooLarge`]
    /// if it exceeds [`Self::MAX_RECORD_SIZE`].
    pub fn new(record_size: usize) -> Result<Self> {
        Ok(Self {
            fifo: LinkedFifo::new(record_size)?,
            head_lock: Mutex::new(()),
            tail_lock: Mutex::new(()),
        })
    }

    /// Returns the fixed record size in bytes.
    #[must_use]
    pub fn record_size(&self) -> usize {
        self.fifo.record_size()
    }

    /// Returns a snapshot of the number of queued records.
    ///
    /// Takes both locks, so the value is exact at the moment it is read but
    /// may be stale by the time the caller acts on it.
    #[must_use]
    pub fn len(&self) -> usize {
        let _head = self.head_lock.lock().expect("head lock poisoned");
        let _tail = self.tail_lock.lock().expect("tail lock poisoned");
        self.fifo.len()
    }

    /// Returns `true` if no records are queued. Snapshot semantics as
    /// [`len`](Self::len).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a copy of `record` at the tail of the queue.
    ///
    /// Holds only the tail lock, so it never blocks a concurrent
    /// [`remove`](Self::remove) on a queue with two or more records.
    ///
    /// # Errors
    ///
    /// [`Error::RecordSizeMismatch`] if `record` is not exactly
    /// [`record_size`](Self::record_size) bytes, [`Error::ResourceExhausted`]
    /// if the node cannot be allocated. Failed calls leave the queue
    /// unchanged.
    pub fn add(&self, record: &[u8]) -> Result<()> {
        self.check_len(record.len())?;

        let _tail = self.tail_lock.lock().expect("tail lock poisoned");
        // SAFETY: the tail lock is held for the duration of the call.
        unsafe { self.fifo.push_back(record) }
    }

    /// Removes the head record, copying it into `out`.
    ///
    /// # Errors
    ///
    /// [`Error::RecordSizeMismatch`] if `out` is not exactly
    /// [`record_size`](Self::record_size) bytes, [`Error::Empty`] if no
    /// record is queued. Failed calls leave the queue unchanged.
    pub fn remove(&self, out: &mut [u8]) -> Result<()> {
        self.check_len(out.len())?;

        let _head = self.head_lock.lock().expect("head lock poisoned");
        // The count can only grow while we hold the head lock, so a value of
        // two or more guarantees the head and tail ends stay disjoint.
        if self.fifo.len() <= 1 {
            let _tail = self.tail_lock.lock().expect("tail lock poisoned");
            // SAFETY: both locks held; we have exclusive access to the chain.
            // The tail guard drops before the head guard.
            unsafe { self.fifo.pop_front(out) }
        } else {
            // SAFETY: head lock held and ≥ 2 records queued, so the pop
            // cannot touch the tail end.
            unsafe { self.fifo.pop_front(out) }
        }
    }

    /// Copies the head record into `out` without removing it.
    ///
    /// Repeated peeks without intervening mutation observe the same record.
    ///
    /// # Errors
    ///
    /// Same as [`remove`](Self::remove).
    pub fn peek(&self, out: &mut [u8]) -> Result<()> {
        self.check_len(out.len())?;

        let _head = self.head_lock.lock().expect("head lock poisoned");
        if self.fifo.len() <= 1 {
            let _tail = self.tail_lock.lock().expect("tail lock poisoned");
            // SAFETY: both locks held.
            unsafe { self.fifo.peek_front(out) }
        } else {
            // SAFETY: head lock held and ≥ 2 records queued.
            unsafe { self.fifo.peek_front(out) }
        }
    }

    /// Removes every queued record in FIFO order, handing each to
    /// `on_record`. Returns the number of records drained.
    ///
    /// Takes `&mut self`: draining is not safe to run concurrently with any
    /// other operation on the same queue. Dropping the queue frees remaining
    /// records without the callback.
    pub fn drain_with<F: FnMut(&[u8])>(&mut self, mut on_record: F) -> usize {
        let mut buf = vec![0u8; self.record_size()];
        let mut drained = 0usize;
        loop {
            // SAFETY: &mut self grants exclusive access to the whole chain.
            match unsafe { self.fifo.pop_front(&mut buf) } {
                Ok(()) => {
                    drained += 1;
                    on_record(&buf);
                }
                Err(Error::Empty) => break,
                // The buffer length always matches, so no other error exists.
                Err(err) => unreachable!("drain hit unexpected error: {err}"),
            }
        }
        trace!(drained, "two-lock queue drained");
        drained
    }

    /// Removes every queued record, discarding the contents. Returns the
    /// number of records dropped.
    pub fn clear(&mut self) -> usize {
        self.drain_with(|_| {})
    }

    /// Validates a caller buffer length against the fixed record size.
    fn check_len(&self, len: usize) -> Result<()> {
        let expected = self.fifo.record_size();
        if len != expected {
            return Err(Error::RecordSizeMismatch {
                expected,
                actual: len,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for TwoLockQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoLockQueue")
            .field("record_size", &self.record_size())
            .finish_non_exhaustive()
    }
}
