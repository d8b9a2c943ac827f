//! Subscriber registry notified once per flush.

use crate::buffer::Snapshot;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::types::{SubscriberId, Subscription, Unsubscribe, Watcher};

type Callback = Arc<dyn Fn() + Send + Sync>;

/// Internal listener state.
enum Listener<T> {
    Callback(Callback),
    Channel {
        sender: Sender<Snapshot<T>>,
        /// Highest snapshot version handed to this watcher.
        last_version: Arc<AtomicU64>,
    },
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        match self {
            Listener::Callback(cb) => Listener::Callback(Arc::clone(cb)),
            Listener::Channel {
                sender,
                last_version,
            } => Listener::Channel {
                sender: sender.clone(),
                last_version: Arc::clone(last_version),
            },
        }
    }
}

/// Set of flush listeners.
///
/// Listeners are kept ordered by id, which is also registration order.
pub struct SubscriberSet<T> {
    listeners: RwLock<BTreeMap<SubscriberId, Listener<T>>>,
    next_id: AtomicU64,
}

impl<T: Send + Sync + 'static> SubscriberSet<T> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> SubscriberId {
        SubscriberId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a callback. The returned handle detaches it.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.listeners
            .write()
            .insert(id, Listener::Callback(Arc::new(callback)));

        let set: Weak<dyn Unsubscribe> = Arc::downgrade(self) as Weak<dyn Unsubscribe>;
        Subscription::new(id, set)
    }

    /// Register a bounded channel receiving each new snapshot.
    pub fn watch(&self, buffer: usize) -> Watcher<T> {
        let id = self.next_id();
        let (sender, receiver) = bounded(buffer.max(1));
        self.listeners.write().insert(
            id,
            Listener::Channel {
                sender,
                last_version: Arc::new(AtomicU64::new(0)),
            },
        );
        Watcher { id, receiver }
    }

    /// Remove a listener by id.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Notify every listener of a freshly published snapshot.
    ///
    /// Listeners run outside the registry lock, so a callback may subscribe
    /// or unsubscribe. Watchers that cannot take the snapshot are dropped.
    /// A watcher never receives a snapshot older than one it already got,
    /// which can otherwise happen when a callback triggers a nested flush.
    pub fn notify(&self, snapshot: &Snapshot<T>) {
        let listeners: Vec<(SubscriberId, Listener<T>)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, listener)| (*id, listener.clone()))
            .collect();

        let mut to_remove = Vec::new();
        for (id, listener) in listeners {
            match listener {
                Listener::Callback(callback) => callback(),
                Listener::Channel {
                    sender,
                    last_version,
                } => {
                    let version = snapshot.version();
                    if last_version.fetch_max(version, Ordering::AcqRel) > version {
                        continue;
                    }
                    match sender.try_send(snapshot.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            tracing::debug!(subscriber = id.0, "dropping slow snapshot watcher");
                            to_remove.push(id);
                        }
                        Err(TrySendError::Disconnected(_)) => to_remove.push(id),
                    }
                }
            }
        }

        if !to_remove.is_empty() {
            let mut listeners = self.listeners.write();
            for id in to_remove {
                listeners.remove(&id);
            }
        }
    }
}

impl<T: Send + Sync + 'static> Default for SubscriberSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> Unsubscribe for SubscriberSet<T> {
    fn remove(&self, id: SubscriberId) -> bool {
        self.unsubscribe(id)
    }
}
