//! Subscription handles.

use crate::buffer::Snapshot;
use std::sync::Weak;
use std::time::Duration;

/// Unique identifier for a subscriber.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(pub u64);

/// Anything a [`Subscription`] can detach itself from.
pub(crate) trait Unsubscribe: Send + Sync {
    fn remove(&self, id: SubscriberId) -> bool;
}

/// Disposer returned by `subscribe`.
///
/// Dropping the handle leaves the callback registered; call
/// [`unsubscribe`](Subscription::unsubscribe) to detach it.
pub struct Subscription {
    id: SubscriberId,
    set: Weak<dyn Unsubscribe>,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, set: Weak<dyn Unsubscribe>) -> Self {
        Self { id, set }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Detach the callback. Returns false if it was already gone (or the
    /// store no longer exists).
    pub fn unsubscribe(self) -> bool {
        match self.set.upgrade() {
            Some(set) => set.remove(self.id),
            None => false,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Channel-based subscription receiving every published snapshot.
pub struct Watcher<T> {
    pub id: SubscriberId,
    /// Channel to receive snapshots.
    pub receiver: crossbeam_channel::Receiver<Snapshot<T>>,
}

impl<T> Watcher<T> {
    /// Receive the next snapshot (blocking).
    pub fn recv(&self) -> Result<Snapshot<T>, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a snapshot (non-blocking).
    pub fn try_recv(&self) -> Result<Snapshot<T>, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Snapshot<T>, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything queued and return the most recent snapshot, if any.
    pub fn latest(&self) -> Option<Snapshot<T>> {
        self.receiver.try_iter().last()
    }
}
