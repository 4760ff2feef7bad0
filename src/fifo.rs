//! Core non-thread-safe linked FIFO of fixed-size records.
//!
//! This module provides the unbounded node chain shared by
//! [`TwoLockQueue`](crate::TwoLockQueue). It is not synchronized by itself:
//! every mutating operation is `unsafe fn` with a lock-protocol contract, and
//! the safe wrapper in [`crate::queue`] upholds it.
//!
//! # Protocol
//!
//! The chain has a head end and a tail end. The owning queue associates one
//! mutex with each end:
//!
//! - `push_back` requires the tail-side lock.
//! - `pop_front`/`peek_front` require the head-side lock, and additionally the
//!   tail-side lock whenever the observed count is ≤ 1 — at that size the head
//!   and tail pointers may alias the same node.
//!
//! With ≥ 2 records queued the two ends reference disjoint nodes, so both
//! locks may be held by different threads at once. Cross-end visibility of
//! node writes is published through the `len` counter (`Release` on update,
//! `Acquire` on read).

use std::cell::UnsafeCell;
use std::mem::size_of;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{Error, Result};

/// Largest record size a node can represent.
///
/// A node carries its payload plus a header; anything larger than this cannot
/// be allocated as a single object.
pub(crate) const MAX_RECORD_SIZE: usize = isize::MAX as usize - size_of::<Node>();

/// One link in the chain, holding a copy of a single record.
struct Node {
    /// The next node towards the tail, or null for the last node.
    next: *mut Node,

    /// The record payload, exactly `record_size` bytes.
    record: Box<[u8]>,
}

impl Node {
    /// Allocates a node holding a copy of `record`.
    ///
    /// The payload allocation is fallible and reports [`Error::ResourceExhausted`];
    /// the node header itself is negligible next to the payload and goes
    /// through the infallible allocator path.
    fn alloc(record: &[u8]) -> Result<*mut Node> {
        let mut payload = Vec::new();
        payload
            .try_reserve_exact(record.len())
            .map_err(|_| Error::ResourceExhausted)?;
        payload.extend_from_slice(record);
        let node = Box::new(Node {
            next: ptr::null_mut(),
            record: payload.into_boxed_slice(),
        });
        Ok(Box::into_raw(node))
    }
}

/// The two ends of the chain. Null/null when the chain is empty; head and
/// tail point at the same node when exactly one record is queued.
struct Ends {
    head: *mut Node,
    tail: *mut Node,
}

/// Unbounded FIFO of fixed-size records with externally locked ends.
pub(crate) struct LinkedFifo {
    /// Fixed record size in bytes, immutable after construction.
    record_size: usize,

    /// Head and tail pointers, mutated only under the lock protocol above.
    ends: UnsafeCell<Ends>,

    /// Number of queued records.
    ///
    /// Incremented by the tail side, decremented by the head side. Also the
    /// publication point for node writes between the two ends.
    len: AtomicUsize,
}

// SAFETY: LinkedFifo is Send because the nodes it points to are owned by the
// chain alone and contain only Send data.
unsafe impl Send for LinkedFifo {}

// SAFETY: LinkedFifo is Sync because all access to `ends` and the nodes is
// mediated by the head/tail lock protocol documented at the module level;
// `len` is atomic.
unsafe impl Sync for LinkedFifo {}

impl LinkedFifo {
    /// Creates an empty chain for records of `record_size` bytes.
    ///
    /// # Errors
    ///
    /// [`Error::SizeIsZero`] if `record_size` is zero, [`Error::SizeTooLarge`]
    /// if a node holding one record could not be represented.
    pub(crate) fn new(record_size: usize) -> Result<Self> {
        if record_size == 0 {
            return Err(Error::SizeIsZero);
        }
        if record_size > MAX_RECORD_SIZE {
            return Err(Error::SizeTooLarge(record_size));
        }
        Ok(Self {
            record_size,
            ends: UnsafeCell::new(Ends {
                head: ptr::null_mut(),
                tail: ptr::null_mut(),
            }),
            len: AtomicUsize::new(0),
        })
    }

    /// Returns the fixed record size in bytes.
    pub(crate) fn record_size(&self) -> usize {
        self.record_size
    }

    /// Returns the number of queued records.
    ///
    /// The `Acquire` load also makes the nodes behind the counter visible to
    /// the reading end.
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Appends a copy of `record` at the tail.
    ///
    /// # Safety
    ///
    /// Caller must hold the tail-side lock. `record` must be exactly
    /// `record_size` bytes (the safe wrapper validates this).
    ///
    /// # Errors
    ///
    /// [`Error::ResourceExhausted`] if the node cannot be allocated; the
    /// chain is left unchanged.
    pub(crate) unsafe fn push_back(&self, record: &[u8]) -> Result<()> {
        debug_assert_eq!(record.len(), self.record_size);

        let node = Node::alloc(record)?;
        let ends = self.ends.get();
        // SAFETY: the tail-side lock grants exclusive access to `tail` and to
        // the last node's `next` pointer. `head` is written only on the
        // empty-to-one transition, where no head-side reader can be touching
        // it: a reader that observed len == 0 backed off without reading the
        // pointers, and a reader that observed len == 1 holds the tail lock
        // too and is therefore serialized with us.
        unsafe {
            if (*ends).tail.is_null() {
                (*ends).head = node;
                (*ends).tail = node;
            } else {
                (*(*ends).tail).next = node;
                (*ends).tail = node;
            }
        }
        // Publish the node to the head side.
        self.len.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Pops the head record into `out`.
    ///
    /// # Safety
    ///
    /// Caller must hold the head-side lock, and additionally the tail-side
    /// lock if the count observed under the head lock was ≤ 1. `out` must be
    /// exactly `record_size` bytes.
    ///
    /// # Errors
    ///
    /// [`Error::Empty`] if no record is queued; the chain is left unchanged.
    pub(crate) unsafe fn pop_front(&self, out: &mut [u8]) -> Result<()> {
        debug_assert_eq!(out.len(), self.record_size);

        if self.len.load(Ordering::Acquire) == 0 {
            return Err(Error::Empty);
        }
        let ends = self.ends.get();
        // SAFETY: len > 0, so `head` is a valid node published by a prior
        // `push_back`. Only this thread pops (head lock held); the count can
        // only grow concurrently. If the popped node is also the last one,
        // the caller holds the tail lock as well, making the `tail` write
        // exclusive.
        unsafe {
            let head = (*ends).head;
            out.copy_from_slice(&(*head).record);
            let next = (*head).next;
            (*ends).head = next;
            if next.is_null() {
                (*ends).tail = ptr::null_mut();
            }
            drop(Box::from_raw(head));
        }
        self.len.fetch_sub(1, Ordering::Release);
        Ok(())
    }

    /// Copies the head record into `out` without removing it.
    ///
    /// # Safety
    ///
    /// Same contract as [`pop_front`](Self::pop_front).
    ///
    /// # Errors
    ///
    /// [`Error::Empty`] if no record is queued.
    pub(crate) unsafe fn peek_front(&self, out: &mut [u8]) -> Result<()> {
        debug_assert_eq!(out.len(), self.record_size);

        if self.len.load(Ordering::Acquire) == 0 {
            return Err(Error::Empty);
        }
        let ends = self.ends.get();
        // SAFETY: as in `pop_front`; no pointers are mutated here.
        unsafe {
            let head = (*ends).head;
            out.copy_from_slice(&(*head).record);
        }
        Ok(())
    }
}

impl Drop for LinkedFifo {
    fn drop(&mut self) {
        // Exclusive access through &mut self; walk the chain and free it.
        let ends = self.ends.get_mut();
        let mut node = ends.head;
        while !node.is_null() {
            // SAFETY: every non-null pointer in the chain came from
            // `Box::into_raw` in `Node::alloc` and is freed exactly once.
            let boxed = unsafe { Box::from_raw(node) };
            node = boxed.next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The unsafe calls below are sound: each test owns its fifo and runs on
    // a single thread, which trivially satisfies the lock protocol.

    #[test]
    fn rejects_zero_record_size() {
        assert_eq!(LinkedFifo::new(0).err(), Some(Error::SizeIsZero));
    }

    #[test]
    fn rejects_oversized_records() {
        assert_eq!(
            LinkedFifo::new(usize::MAX).err(),
            Some(Error::SizeTooLarge(usize::MAX))
        );
    }

    #[test]
    fn push_pop_preserves_fifo_order() {
        let fifo = LinkedFifo::new(4).unwrap();
        for i in 0..10u32 {
            unsafe { fifo.push_back(&i.to_le_bytes()).unwrap() };
        }
        assert_eq!(fifo.len(), 10);

        let mut out = [0u8; 4];
        for i in 0..10u32 {
            unsafe { fifo.pop_front(&mut out).unwrap() };
            assert_eq!(u32::from_le_bytes(out), i);
        }
        assert_eq!(unsafe { fifo.pop_front(&mut out) }, Err(Error::Empty));
        assert_eq!(fifo.len(), 0);
    }

    #[test]
    fn peek_does_not_consume() {
        let fifo = LinkedFifo::new(4).unwrap();
        unsafe { fifo.push_back(&7u32.to_le_bytes()).unwrap() };

        let mut out = [0u8; 4];
        unsafe { fifo.peek_front(&mut out).unwrap() };
        assert_eq!(u32::from_le_bytes(out), 7);
        assert_eq!(fifo.len(), 1);

        out = [0u8; 4];
        unsafe { fifo.peek_front(&mut out).unwrap() };
        assert_eq!(u32::from_le_bytes(out), 7);

        unsafe { fifo.pop_front(&mut out).unwrap() };
        assert_eq!(unsafe { fifo.peek_front(&mut out) }, Err(Error::Empty));
    }

    #[test]
    fn empty_to_one_transition_resets_both_ends() {
        let fifo = LinkedFifo::new(1).unwrap();
        let mut out = [0u8; 1];
        for round in 0..3u8 {
            unsafe { fifo.push_back(&[round]).unwrap() };
            unsafe { fifo.pop_front(&mut out).unwrap() };
            assert_eq!(out[0], round);
            assert_eq!(fifo.len(), 0);
        }
    }

    #[test]
    fn drop_frees_remaining_nodes() {
        let fifo = LinkedFifo::new(8).unwrap();
        for i in 0..100u64 {
            unsafe { fifo.push_back(&i.to_le_bytes()).unwrap() };
        }
        drop(fifo); // must not leak or double-free
    }
}
