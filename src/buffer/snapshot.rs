//! Snapshot publishing with flush coalescing.

use crate::buffer::RingBuffer;
use crate::error::Result;
use crate::subscriptions::{SubscriberSet, Subscription, Watcher};
use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::{Mutex, ReentrantMutex};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

/// Default coalescing window, roughly one display frame.
const DEFAULT_TICK_MS: u64 = 16;

struct SnapshotData<T> {
    items: Vec<T>,
    version: u64,
}

/// Immutable, newest-first view of a buffer at one flush.
///
/// Cloning shares the same allocation, so two snapshots taken with no flush
/// in between are the same object ([`Snapshot::ptr_eq`]).
pub struct Snapshot<T>(Arc<SnapshotData<T>>);

impl<T> Snapshot<T> {
    /// The empty snapshot published before the first flush.
    pub fn empty() -> Self {
        Self::from_vec(Vec::new(), 0)
    }

    pub(crate) fn from_vec(items: Vec<T>, version: u64) -> Self {
        Snapshot(Arc::new(SnapshotData { items, version }))
    }

    /// Flush counter value at which this snapshot was published.
    pub fn version(&self) -> u64 {
        self.0.version
    }

    pub fn as_slice(&self) -> &[T] {
        &self.0.items
    }

    /// Whether both handles point at the same published snapshot.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Snapshot(Arc::clone(&self.0))
    }
}

impl<T> Deref for Snapshot<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.0.items
    }
}

impl<'a, T> IntoIterator for &'a Snapshot<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.items.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("version", &self.0.version)
            .field("items", &self.0.items)
            .finish()
    }
}

/// When a scheduled flush actually runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Flush inside the mutating call. No batching; for headless use.
    Immediate,
    /// A background thread flushes once per tick window after the first
    /// write of a burst.
    Tick { tick_ms: u64 },
    /// Flush only when the host calls [`SnapshotStore::flush`].
    Manual,
}

impl FlushPolicy {
    pub fn tick(interval: Duration) -> Self {
        FlushPolicy::Tick {
            tick_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        FlushPolicy::Tick {
            tick_ms: DEFAULT_TICK_MS,
        }
    }
}

/// Counters describing store activity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub pushes: u64,
    pub evictions: u64,
    pub flushes: u64,
    pub len: usize,
    pub capacity: usize,
}

struct StoreShared<T> {
    ring: Mutex<RingBuffer<T>>,
    published: ArcSwap<SnapshotData<T>>,
    /// Set by the first mutation after a flush, cleared when a flush starts.
    pending: AtomicBool,
    /// Held from version assignment through notification, so listeners see
    /// versions in order. Reentrant because listeners may write or flush.
    flush_lock: ReentrantMutex<()>,
    /// Set by `close`; nothing is published afterwards.
    closed: AtomicBool,
    policy: FlushPolicy,
    /// Wakes the flusher thread under `FlushPolicy::Tick`.
    waker: Option<Sender<()>>,
    subscribers: Arc<SubscriberSet<T>>,
    pushes: AtomicU64,
    evictions: AtomicU64,
    flushes: AtomicU64,
}

impl<T> StoreShared<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn schedule(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if self.pending.swap(true, Ordering::AcqRel) {
            return;
        }

        match self.policy {
            FlushPolicy::Immediate => {
                self.flush();
            }
            FlushPolicy::Tick { .. } => {
                if let Some(waker) = &self.waker {
                    // A full channel means a wake is already queued.
                    let _ = waker.try_send(());
                }
            }
            FlushPolicy::Manual => {}
        }
    }

    fn flush(&self) -> bool {
        let _guard = self.flush_lock.lock();
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        // Clear before reading the ring so that writes racing with this flush
        // schedule another one instead of being lost.
        if !self.pending.swap(false, Ordering::AcqRel) {
            return false;
        }

        let snapshot = {
            let ring = self.ring.lock();
            let version = self.flushes.fetch_add(1, Ordering::SeqCst) + 1;
            let data = Arc::new(SnapshotData {
                items: ring.to_vec_newest_first(),
                version,
            });
            self.published.store(Arc::clone(&data));
            Snapshot(data)
        };

        tracing::trace!(version = snapshot.version(), len = snapshot.len(), "published snapshot");
        self.subscribers.notify(&snapshot);
        true
    }

    fn close(&self) {
        // Waits out a flush running on another thread.
        let _guard = self.flush_lock.lock();
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.pending.store(false, Ordering::Release);
            tracing::debug!("snapshot store closed");
        }
    }
}

fn run_flusher<T>(shared: Weak<StoreShared<T>>, wake: Receiver<()>, tick: Duration)
where
    T: Clone + Send + Sync + 'static,
{
    while wake.recv().is_ok() {
        thread::sleep(tick);
        match shared.upgrade() {
            Some(shared) if !shared.closed.load(Ordering::Acquire) => {
                shared.flush();
            }
            _ => break,
        }
    }
    tracing::trace!("snapshot flusher stopped");
}

/// A ring buffer that publishes coalesced immutable snapshots.
///
/// Writes mutate the buffer immediately but only become visible to readers
/// at the next flush; a burst of writes before that flush produces exactly
/// one new snapshot and one round of notifications. Handles are cheap to
/// clone and share the same buffer. Dropping the last handle stops the
/// flusher and discards any pending flush.
pub struct SnapshotStore<T> {
    shared: Arc<StoreShared<T>>,
}

impl<T> Clone for SnapshotStore<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> SnapshotStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a store holding at most `capacity` items.
    pub fn new(capacity: usize, policy: FlushPolicy) -> Result<Self> {
        let ring = RingBuffer::new(capacity)?;

        let (waker, wake_rx) = match policy {
            FlushPolicy::Tick { .. } => {
                let (tx, rx) = bounded(1);
                (Some(tx), Some(rx))
            }
            _ => (None, None),
        };

        let shared = Arc::new(StoreShared {
            ring: Mutex::new(ring),
            published: ArcSwap::from_pointee(SnapshotData {
                items: Vec::new(),
                version: 0,
            }),
            pending: AtomicBool::new(false),
            flush_lock: ReentrantMutex::new(()),
            closed: AtomicBool::new(false),
            policy,
            waker,
            subscribers: Arc::new(SubscriberSet::new()),
            pushes: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
        });

        if let (FlushPolicy::Tick { tick_ms }, Some(wake_rx)) = (policy, wake_rx) {
            let weak = Arc::downgrade(&shared);
            let tick = Duration::from_millis(tick_ms);
            thread::Builder::new()
                .name("snapshot-flusher".to_string())
                .spawn(move || run_flusher(weak, wake_rx, tick))?;
        }

        Ok(Self { shared })
    }

    /// Store that flushes synchronously on every write.
    pub fn immediate(capacity: usize) -> Result<Self> {
        Self::new(capacity, FlushPolicy::Immediate)
    }

    /// Store flushed only by explicit [`flush`](Self::flush) calls.
    pub fn manual(capacity: usize) -> Result<Self> {
        Self::new(capacity, FlushPolicy::Manual)
    }

    // --- Mutations ---

    /// Append an item and schedule a flush.
    pub fn push(&self, item: T) {
        {
            let mut ring = self.shared.ring.lock();
            if ring.push(item).is_some() {
                self.shared.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.shared.pushes.fetch_add(1, Ordering::Relaxed);
        self.shared.schedule();
    }

    /// Append several items under one lock and schedule a single flush.
    pub fn extend<I>(&self, items: I)
    where
        I: IntoIterator<Item = T>,
    {
        if self.extend_unscheduled(items) > 0 {
            self.shared.schedule();
        }
    }

    /// Append items without scheduling a flush; returns how many were pushed.
    ///
    /// Lets a caller mutate while holding its own lock and schedule (which may
    /// run subscriber callbacks) only after releasing it.
    pub(crate) fn extend_unscheduled<I>(&self, items: I) -> u64
    where
        I: IntoIterator<Item = T>,
    {
        let mut pushed = 0u64;
        {
            let mut ring = self.shared.ring.lock();
            for item in items {
                pushed += 1;
                if ring.push(item).is_some() {
                    self.shared.evictions.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        self.shared.pushes.fetch_add(pushed, Ordering::Relaxed);
        pushed
    }

    pub(crate) fn schedule_flush(&self) {
        self.shared.schedule();
    }

    /// Resize the buffer, keeping the newest items that fit.
    pub fn set_capacity(&self, capacity: usize) -> Result<()> {
        let changed = {
            let mut ring = self.shared.ring.lock();
            let previous = ring.capacity();
            ring.set_capacity(capacity)?;
            previous != capacity
        };
        if changed {
            tracing::debug!(capacity, "buffer capacity changed");
            self.shared.schedule();
        }
        Ok(())
    }

    /// Drop every buffered item and schedule a flush.
    pub fn clear(&self) {
        self.shared.ring.lock().clear();
        self.shared.schedule();
    }

    /// Run a pending flush now. Returns false if nothing was pending.
    pub fn flush(&self) -> bool {
        self.shared.flush()
    }

    /// Stop publishing for good.
    ///
    /// Cancels any pending flush and waits for one already running on
    /// another thread, so no listener is notified once this returns. The last
    /// published snapshot stays readable; later writes still reach the buffer
    /// but are never published.
    pub fn close(&self) {
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    // --- Reads ---

    /// The currently published snapshot.
    ///
    /// Calls with no flush in between return the same snapshot object.
    pub fn get_snapshot(&self) -> Snapshot<T> {
        Snapshot(self.shared.published.load_full())
    }

    /// Register a callback invoked once per flush.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.subscribers.subscribe(callback)
    }

    /// Receive every published snapshot over a bounded channel.
    pub fn watch(&self, buffer: usize) -> Watcher<T> {
        self.shared.subscribers.watch(buffer)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.len()
    }

    /// Items currently buffered (including unflushed writes).
    pub fn len(&self) -> usize {
        self.shared.ring.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.ring.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.ring.lock().capacity()
    }

    pub fn is_flush_pending(&self) -> bool {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn policy(&self) -> FlushPolicy {
        self.shared.policy
    }

    pub fn stats(&self) -> StoreStats {
        let (len, capacity) = {
            let ring = self.shared.ring.lock();
            (ring.len(), ring.capacity())
        };
        StoreStats {
            pushes: self.shared.pushes.load(Ordering::Relaxed),
            evictions: self.shared.evictions.load(Ordering::Relaxed),
            flushes: self.shared.flushes.load(Ordering::SeqCst),
            len,
            capacity,
        }
    }
}
