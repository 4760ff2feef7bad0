//! Queue throughput benchmark.
//!
//! Usage:
//!     cargo run --release --bin queue_bench
//!
//! Environment variables:
//!     THREADS=8        Producer/consumer pairs (default: 4)
//!     RECORDS=1000000  Records per producer (default: 1 << 20)
//!     SHARDS=8         Shard count for the sharded run (default: THREADS)

use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use shoal::{Error, ShardedQueue, TwoLockQueue};

const RECORD_SIZE: usize = 8;

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn bench_two_lock(threads: usize, records: usize) {
    let queue = Arc::new(TwoLockQueue::new(RECORD_SIZE).unwrap());
    let total = threads * records;
    let consumed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let mut handles = vec![];
    for p in 0..threads {
        let queue = Arc::clone(&queue);
        handles.push(thread::spawn(move || {
            for i in 0..records {
                let value = (p * records + i) as u64;
                queue.add(&value.to_le_bytes()).unwrap();
            }
        }));
    }
    for _ in 0..threads {
        let queue = Arc::clone(&queue);
        let consumed = Arc::clone(&consumed);
        handles.push(thread::spawn(move || {
            let mut out = [0u8; RECORD_SIZE];
            while consumed.load(Ordering::Relaxed) < total {
                match queue.remove(&mut out) {
                    Ok(()) => {
                        consumed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(Error::Empty) => thread::yield_now(),
                    Err(err) => panic!("unexpected error: {err}"),
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let elapsed = start.elapsed();
    let ops_per_ms = total as u128 * 1_000_000 / elapsed.as_nanos();
    println!("two-lock queue:  {} ops/ms", ops_per_ms);
}

fn bench_sharded(threads: usize, records: usize, shards: usize) {
    let queue = Arc::new(ShardedQueue::new(RECORD_SIZE, shards).unwrap());
    let total = threads * records;
    let consumed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();

    let mut handles = vec![];
    for p in 0..threads {
        let queue = Arc::clone(&queue);
        handles.push(thread::spawn(move || {
            for i in 0..records {
                let value = (p * records + i) as u64;
                queue.add(&value.to_le_bytes()).unwrap();
            }
        }));
    }
    for _ in 0..threads {
        let queue = Arc::clone(&queue);
        let consumed = Arc::clone(&consumed);
        handles.push(thread::spawn(move || {
            let mut out = [0u8; RECORD_SIZE];
            while consumed.load(Ordering::Relaxed) < total {
                match queue.remove(&mut out) {
                    Ok(()) => {
                        consumed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(Error::Empty) => thread::yield_now(),
                    Err(err) => panic!("unexpected error: {err}"),
                }
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let elapsed = start.elapsed();
    let ops_per_ms = total as u128 * 1_000_000 / elapsed.as_nanos();
    println!("sharded (C={}):  {} ops/ms", shards, ops_per_ms);
}

fn main() {
    shoal::init_tracing();

    let threads = env_usize("THREADS", 4);
    let records = env_usize("RECORDS", 1 << 20);
    let shards = env_usize("SHARDS", threads);

    println!(
        "shoal queue bench (threads={}, records/thread={}):",
        threads, records
    );
    bench_two_lock(threads, records);
    bench_sharded(threads, records, shards);
}
