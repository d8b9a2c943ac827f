//! Flush notifications for snapshot readers.
//!
//! Every flush of a [`SnapshotStore`](crate::SnapshotStore) publishes one new
//! snapshot and then notifies its subscribers:
//! - Callbacks: zero-argument closures that re-read `get_snapshot()`
//! - Watchers: bounded channels that receive the new snapshot itself
//!
//! Listeners are notified in registration order. A watcher whose channel is
//! full is dropped rather than allowed to stall the flush.
//!
//! # Example
//!
//! ```ignore
//! let store = SnapshotStore::new(100, FlushPolicy::default())?;
//!
//! let subscription = store.subscribe(|| println!("buffer changed"));
//! let watcher = store.watch(16);
//!
//! store.push(record);
//! let snapshot = watcher.recv()?;
//!
//! subscription.unsubscribe();
//! ```

mod manager;
mod types;

pub use manager::SubscriberSet;
pub use types::{SubscriberId, Subscription, Watcher};
