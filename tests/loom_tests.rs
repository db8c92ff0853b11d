//! Loom-based concurrency tests
//!
//! These tests use the `loom` library to exhaustively check the thread
//! interleavings of the read protocol against the publish-drain-reapply write
//! protocol. `loom::cell::UnsafeCell` reports any overlap between a reader's
//! access to a replica and the writer's mutation of it.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`

#![cfg(feature = "loom")]

use loom::model::Builder;
use loom::thread;
use swmr_leftright::{AtomicIndicator, LeftRightBuilder, ReadIndicator, ShardedIndicator};

fn build<I: ReadIndicator>(
    initial: (u32, u32),
) -> (
    swmr_leftright::WriteHandle<(u32, u32), I>,
    swmr_leftright::ReadHandle<(u32, u32), I>,
) {
    LeftRightBuilder::new()
        .read_indicator::<I>()
        .shards(2)
        .build(initial)
}

/// Test: a read racing one write sees the old or the new pair, never a mix
fn single_write_single_reader<I: ReadIndicator>() {
    let (mut writer, reader) = build::<I>((0, 0));

    let r = reader.clone();
    let handle = thread::spawn(move || {
        let (a, b) = r.read(|pair| *pair);
        assert_eq!(a, b);
        assert!(a == 0 || a == 1);
    });

    writer.write(|pair| *pair = (1, 1));
    handle.join().unwrap();

    assert_eq!(reader.read(|pair| *pair), (1, 1));
    assert_eq!(writer.replicas(), (&(1, 1), &(1, 1)));
}

#[test]
fn loom_single_write_atomic_indicator() {
    loom::model(single_write_single_reader::<AtomicIndicator>);
}

#[test]
fn loom_single_write_sharded_indicator() {
    loom::model(single_write_single_reader::<ShardedIndicator>);
}

/// Test: a reader that loaded the epoch before a write and registered after
/// it must hold back the following write
fn two_writes_single_reader<I: ReadIndicator>() {
    let (mut writer, reader) = build::<I>((0, 0));

    let r = reader.clone();
    let handle = thread::spawn(move || {
        let (a, b) = r.read(|pair| *pair);
        assert_eq!(a, b);
        assert!(a <= 2);
    });

    writer.write(|pair| *pair = (1, 1));
    writer.write(|pair| *pair = (2, 2));
    handle.join().unwrap();

    assert_eq!(writer.replicas(), (&(2, 2), &(2, 2)));
}

#[test]
fn loom_two_writes_atomic_indicator() {
    let mut builder = Builder::new();
    builder.preemption_bound = Some(3);
    builder.check(two_writes_single_reader::<AtomicIndicator>);
}

#[test]
fn loom_two_writes_sharded_indicator() {
    let mut builder = Builder::new();
    builder.preemption_bound = Some(3);
    builder.check(two_writes_single_reader::<ShardedIndicator>);
}

/// Test: successive reads by one reader never go backwards
#[test]
fn loom_reads_are_monotonic() {
    let mut builder = Builder::new();
    builder.preemption_bound = Some(3);
    builder.check(|| {
        let (mut writer, reader) = build::<AtomicIndicator>((0, 0));

        let r = reader.clone();
        let handle = thread::spawn(move || {
            let first = r.read(|pair| pair.0);
            let second = r.read(|pair| pair.0);
            assert!(second >= first);
        });

        writer.write(|pair| *pair = (1, 1));
        handle.join().unwrap();
    });
}

/// Test: a held guard keeps its replica stable while the writer publishes
#[test]
fn loom_guard_blocks_reuse_of_its_replica() {
    loom::model(|| {
        let (mut writer, reader) = build::<AtomicIndicator>((0, 0));

        let r = reader.clone();
        let handle = thread::spawn(move || {
            let guard = r.enter();
            let first = *guard;
            thread::yield_now();
            let second = *guard;
            assert_eq!(first, second);
            assert_eq!(first.0, first.1);
        });

        writer.write(|pair| *pair = (1, 1));
        handle.join().unwrap();
    });
}

/// Test: two readers and one write
#[test]
fn loom_two_readers_one_write() {
    let mut builder = Builder::new();
    builder.preemption_bound = Some(2);
    builder.check(|| {
        let (mut writer, reader) = build::<ShardedIndicator>((0, 0));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let r = reader.clone();
                thread::spawn(move || {
                    let (a, b) = r.read(|pair| *pair);
                    assert_eq!(a, b);
                })
            })
            .collect();

        writer.write(|pair| *pair = (1, 1));
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(reader.read(|pair| *pair), (1, 1));
    });
}

/// Test: writes serialized through the shared write handle
#[test]
fn loom_shared_write_handle() {
    let mut builder = Builder::new();
    builder.preemption_bound = Some(2);
    builder.check(|| {
        let (writer, reader) = build::<AtomicIndicator>((0, 0));
        let shared = writer.into_shared();

        let other = shared.clone();
        let handle = thread::spawn(move || {
            other.write(|pair| {
                pair.0 += 1;
                pair.1 += 1;
            });
        });

        shared.write(|pair| {
            pair.0 += 1;
            pair.1 += 1;
        });
        handle.join().unwrap();

        assert_eq!(reader.read(|pair| *pair), (2, 2));
    });
}
