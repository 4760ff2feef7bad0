//! Multi-thread stress tests for the queue types.
//!
//! These tests verify the conservation guarantee: across any interleaving of
//! concurrent adders and removers, every added record is returned by exactly
//! one remove (no duplication, no loss), and once the queue is drained every
//! further remove fails with `Empty`.
//!
//! # Running with tracing
//!
//! To see full debug output, run with the tracing feature and no capture:
//! ```bash
//! RUST_LOG=shoal=trace cargo test --features tracing -- --nocapture
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::thread;

use shoal::{Error, ShardedQueue, TwoLockQueue};

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        shoal::init_tracing();
    });
}

/// Encodes a unique record for producer `p`, item `i`.
fn record(p: u64, i: u64, per_producer: u64) -> [u8; 8] {
    (p * per_producer + i).to_le_bytes()
}

#[test]
fn sharded_producers_then_consumers_conserve_records() {
    init_test_tracing();

    const PRODUCERS: u64 = 8;
    const PER_PRODUCER: u64 = 5_000;
    const CONSUMERS: usize = 8;
    let total = (PRODUCERS * PER_PRODUCER) as usize;

    let queue = Arc::new(ShardedQueue::new(8, 4).unwrap());

    let mut producers = vec![];
    for p in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        producers.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                queue.add(&record(p, i, PER_PRODUCER)).unwrap();
            }
        }));
    }
    for handle in producers {
        handle.join().unwrap();
    }
    assert_eq!(queue.len(), total);

    // All adds completed, so each consumer may stop at its first Empty: a
    // full scan that observed every shard empty means every record had
    // already been claimed by some consumer.
    let mut consumers = vec![];
    for _ in 0..CONSUMERS {
        let queue = Arc::clone(&queue);
        consumers.push(thread::spawn(move || {
            let mut out = [0u8; 8];
            let mut seen = HashSet::new();
            loop {
                match queue.remove(&mut out) {
                    Ok(()) => {
                        assert!(
                            seen.insert(u64::from_le_bytes(out)),
                            "record delivered twice to one consumer"
                        );
                    }
                    Err(Error::Empty) => break,
                    Err(err) => panic!("unexpected error: {err}"),
                }
            }
            seen
        }));
    }

    let mut all = HashSet::new();
    let mut received = 0usize;
    for handle in consumers {
        let seen = handle.join().unwrap();
        received += seen.len();
        all.extend(seen);
    }

    assert_eq!(received, total, "some record was lost or duplicated");
    assert_eq!(all.len(), total, "a record was delivered to two consumers");
    assert!(all.iter().all(|&v| v < total as u64));

    let mut out = [0u8; 8];
    assert_eq!(queue.remove(&mut out), Err(Error::Empty));
}

#[test]
fn sharded_concurrent_adders_and_removers() {
    init_test_tracing();

    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 10_000;
    const CONSUMERS: usize = 4;
    let total = (PRODUCERS * PER_PRODUCER) as usize;

    let queue = Arc::new(ShardedQueue::new(8, 8).unwrap());
    let collected = Arc::new(AtomicUsize::new(0));

    let mut handles = vec![];

    for p in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        handles.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                queue.add(&record(p, i, PER_PRODUCER)).unwrap();
            }
            HashSet::new()
        }));
    }

    // Removers run while adds are still in flight. A transiently empty scan
    // is expected here; they retry until the global count is reached.
    for _ in 0..CONSUMERS {
        let queue = Arc::clone(&queue);
        let collected = Arc::clone(&collected);
        handles.push(thread::spawn(move || {
            let mut out = [0u8; 8];
            let mut seen = HashSet::new();
            while collected.load(Ordering::Relaxed) < total {
                match queue.remove(&mut out) {
                    Ok(()) => {
                        seen.insert(u64::from_le_bytes(out));
                        collected.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(Error::Empty) => thread::yield_now(),
                    Err(err) => panic!("unexpected error: {err}"),
                }
            }
            seen
        }));
    }

    let mut all = HashSet::new();
    let mut received = 0usize;
    for handle in handles {
        let seen = handle.join().unwrap();
        received += seen.len();
        all.extend(seen);
    }

    assert_eq!(collected.load(Ordering::Relaxed), total);
    assert_eq!(received, total);
    assert_eq!(all.len(), total);

    let mut out = [0u8; 8];
    assert_eq!(queue.remove(&mut out), Err(Error::Empty));
    assert!(queue.is_empty());
}

#[test]
fn two_lock_queue_conserves_records_across_threads() {
    init_test_tracing();

    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 5_000;
    const CONSUMERS: usize = 2;
    let total = (PRODUCERS * PER_PRODUCER) as usize;

    let queue = Arc::new(TwoLockQueue::new(8).unwrap());

    let mut producers = vec![];
    for p in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        producers.push(thread::spawn(move || {
            for i in 0..PER_PRODUCER {
                queue.add(&record(p, i, PER_PRODUCER)).unwrap();
            }
        }));
    }
    for handle in producers {
        handle.join().unwrap();
    }
    assert_eq!(queue.len(), total);

    let mut consumers = vec![];
    for _ in 0..CONSUMERS {
        let queue = Arc::clone(&queue);
        consumers.push(thread::spawn(move || {
            let mut out = [0u8; 8];
            let mut seen = HashSet::new();
            loop {
                match queue.remove(&mut out) {
                    Ok(()) => {
                        seen.insert(u64::from_le_bytes(out));
                    }
                    Err(Error::Empty) => break,
                    Err(err) => panic!("unexpected error: {err}"),
                }
            }
            seen
        }));
    }

    let mut all = HashSet::new();
    let mut received = 0usize;
    for handle in consumers {
        let seen = handle.join().unwrap();
        received += seen.len();
        all.extend(seen);
    }

    assert_eq!(received, total);
    assert_eq!(all.len(), total);
    assert!(queue.is_empty());
}

#[test]
fn sharded_peek_never_consumes_under_contention() {
    init_test_tracing();

    let queue = Arc::new(ShardedQueue::new(8, 4).unwrap());
    for i in 0..100u64 {
        queue.add(&i.to_le_bytes()).unwrap();
    }

    // Peeking threads race against each other; none of them may consume.
    let mut peekers = vec![];
    for _ in 0..4 {
        let queue = Arc::clone(&queue);
        peekers.push(thread::spawn(move || {
            let mut out = [0u8; 8];
            for _ in 0..1_000 {
                queue.peek(&mut out).unwrap();
            }
        }));
    }
    for handle in peekers {
        handle.join().unwrap();
    }

    assert_eq!(queue.len(), 100);
}
