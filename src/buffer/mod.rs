//! Bounded buffering with coalesced, immutable snapshots.
//!
//! [`RingBuffer`] is the raw fixed-capacity store. [`SnapshotStore`] wraps one
//! and publishes a new [`Snapshot`] at most once per flush, however many
//! writes landed in between.

mod ring;
mod snapshot;

pub use ring::RingBuffer;
pub use snapshot::{FlushPolicy, Snapshot, SnapshotStore, StoreStats};
