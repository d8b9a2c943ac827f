//! Snapshot publishing tests.

use livetail::{FlushPolicy, Snapshot, SnapshotStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn counter(store: &SnapshotStore<&'static str>) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&calls);
    let _ = store.subscribe(move || {
        c.fetch_add(1, Ordering::SeqCst);
    });
    calls
}

// --- Stability ---

#[test]
fn test_snapshot_identity_between_flushes() {
    let store = SnapshotStore::manual(5).unwrap();
    store.push("a");
    store.flush();

    let first = store.get_snapshot();
    let second = store.get_snapshot();
    assert!(Snapshot::ptr_eq(&first, &second));

    store.push("b");
    // Not flushed yet: still the same object
    assert!(Snapshot::ptr_eq(&first, &store.get_snapshot()));

    store.flush();
    let third = store.get_snapshot();
    assert!(!Snapshot::ptr_eq(&first, &third));
    assert_eq!(third.as_slice(), &["b", "a"]);
    // The old snapshot is frozen
    assert_eq!(first.as_slice(), &["a"]);
}

#[test]
fn test_coalesced_mutations_reflected_in_one_snapshot() {
    let store = SnapshotStore::manual(3).unwrap();
    let calls = counter(&store);

    store.push("a");
    store.push("b");
    store.clear();
    store.push("c");
    store.set_capacity(2).unwrap();
    store.push("d");
    store.push("e");

    assert!(store.flush());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.get_snapshot().as_slice(), &["e", "d"]);
    assert_eq!(store.get_snapshot().version(), 1);
}

#[test]
fn test_end_to_end_scenario() {
    let store = SnapshotStore::immediate(3).unwrap();

    for item in ["A", "B", "C", "D"] {
        store.push(item);
    }
    assert_eq!(store.get_snapshot().as_slice(), &["D", "C", "B"]);

    store.set_capacity(5).unwrap();
    assert_eq!(store.get_snapshot().as_slice(), &["D", "C", "B"]);

    store.push("E");
    assert_eq!(store.get_snapshot().as_slice(), &["E", "D", "C", "B"]);
}

// --- Tick scheduling ---

#[test]
fn test_tick_burst_produces_single_notification() {
    let store = SnapshotStore::new(1000, FlushPolicy::tick(Duration::from_millis(100))).unwrap();
    let calls = counter(&store);
    let watcher = store.watch(4);

    // One burst, well inside the tick window
    store.extend(["x"; 500]);
    for _ in 0..10 {
        store.push("y");
    }

    let snapshot = watcher.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(snapshot.len(), 510);
    assert_eq!(snapshot[0], "y");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    thread::sleep(Duration::from_millis(250));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(watcher.try_recv().is_err());
}

#[test]
fn test_dropping_store_cancels_pending_flush() {
    let store = SnapshotStore::new(10, FlushPolicy::tick(Duration::from_millis(50))).unwrap();
    let calls = counter(&store);

    store.push("a");
    drop(store);

    thread::sleep(Duration::from_millis(150));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// --- Concurrent readers ---

#[test]
fn test_readers_never_see_torn_snapshots() {
    let store: SnapshotStore<u64> = SnapshotStore::immediate(64).unwrap();
    let writer_store = store.clone();

    let writer = thread::spawn(move || {
        for i in 0..5_000u64 {
            writer_store.push(i);
        }
    });

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..2_000 {
                    let snapshot = store.get_snapshot();
                    // Newest first, consecutive, never longer than capacity
                    assert!(snapshot.len() <= 64);
                    for pair in snapshot.windows(2) {
                        assert_eq!(pair[0], pair[1] + 1);
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    let last = store.get_snapshot();
    assert_eq!(last.len(), 64);
    assert_eq!(last[0], 4_999);
}

#[test]
fn test_versions_increase_monotonically() {
    let store = SnapshotStore::immediate(4).unwrap();
    let watcher = store.watch(100);

    for i in 0..20 {
        store.push(i);
    }

    let versions: Vec<u64> = watcher.receiver.try_iter().map(|s| s.version()).collect();
    assert_eq!(versions.len(), 20);
    assert!(versions.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(store.stats().evictions, 16);
}

#[test]
fn test_versions_increase_monotonically_with_many_writers() {
    let store = SnapshotStore::immediate(8).unwrap();
    let watcher = store.watch(100_000);

    let writers: Vec<_> = (0..4u64)
        .map(|w| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..2_000 {
                    store.push(w * 10_000 + i);
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }
    store.flush();

    let versions: Vec<u64> = watcher.receiver.try_iter().map(|s| s.version()).collect();
    assert!(!versions.is_empty());
    assert!(versions.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(versions.last().copied(), Some(store.get_snapshot().version()));
    assert_eq!(store.get_snapshot().len(), 8);
    assert_eq!(store.stats().pushes, 8_000);
}

#[test]
fn test_manual_flush_races_tick_flusher_in_order() {
    let store = SnapshotStore::new(16, FlushPolicy::tick(Duration::from_millis(1))).unwrap();
    let watcher = store.watch(100_000);

    let flusher = {
        let store = store.clone();
        thread::spawn(move || {
            for _ in 0..2_000 {
                store.flush();
            }
        })
    };
    for i in 0..2_000u32 {
        store.push(i);
    }
    flusher.join().unwrap();

    let versions: Vec<u64> = watcher.receiver.try_iter().map(|s| s.version()).collect();
    assert!(versions.windows(2).all(|w| w[0] < w[1]));
}
