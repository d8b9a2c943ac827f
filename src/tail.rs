//! One live tail view: a snapshot store, the consumer feeding it, and the
//! filter applied when reading.

use crate::buffer::{Snapshot, SnapshotStore, StoreStats};
use crate::config::TailConfig;
use crate::error::{Result, TransportError};
use crate::filter::FilterSpec;
use crate::stream::{
    ConsumerOptions, ConsumerStats, ConsumerStatus, HttpTransport, StreamConsumer, Transport,
};
use crate::subscriptions::{Subscription, Watcher};
use crate::types::TailRecord;
use parking_lot::RwLock;
use std::sync::Arc;

/// The surface a presentation layer talks to.
///
/// Provides a unified interface for:
/// - Reading the current snapshot, raw or filtered
/// - Subscribing to flushes
/// - Pausing, resuming and clearing the stream
/// - Reconfiguring the buffer size and filter at runtime
pub struct LiveTail<R: TailRecord> {
    store: SnapshotStore<R>,
    consumer: StreamConsumer<R>,
    filter: RwLock<FilterSpec>,
}

impl<R: TailRecord> LiveTail<R> {
    /// Build a view streaming over HTTP. Must be called inside a tokio runtime.
    pub fn new(config: TailConfig) -> Result<Self> {
        Self::with_transport(config, Arc::new(HttpTransport::new()))
    }

    /// Build a view over any transport.
    pub fn with_transport(config: TailConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        let store = SnapshotStore::new(config.buffer_size, config.flush)?;
        let consumer = StreamConsumer::with_options(
            config.url.clone(),
            transport,
            store.clone(),
            ConsumerOptions {
                reconnect: config.reconnect,
                runtime: None,
            },
        )?;

        let filter = FilterSpec {
            allow: config.allow.clone(),
            query: config.query.clone(),
            ..Default::default()
        };

        if !config.initial_paused {
            consumer.resume()?;
        }

        Ok(Self {
            store,
            consumer,
            filter: RwLock::new(filter),
        })
    }

    // --- Reads ---

    /// Current snapshot, newest first, unfiltered.
    pub fn snapshot(&self) -> Snapshot<R> {
        self.store.get_snapshot()
    }

    /// Current snapshot with the active filter applied.
    pub fn filtered(&self) -> Vec<R> {
        let snapshot = self.store.get_snapshot();
        let filter = self.filter.read();
        filter.apply(&snapshot).into_iter().cloned().collect()
    }

    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.store.subscribe(callback)
    }

    pub fn watch(&self, buffer: usize) -> Watcher<R> {
        self.store.watch(buffer)
    }

    // --- Stream control ---

    pub fn pause(&self) {
        self.consumer.pause();
    }

    pub fn resume(&self) -> Result<()> {
        self.consumer.resume()
    }

    pub fn set_paused(&self, paused: bool) -> Result<()> {
        self.consumer.set_paused(paused)
    }

    pub fn is_paused(&self) -> bool {
        self.consumer.is_paused()
    }

    /// Drop buffered records. The connection is unaffected.
    pub fn clear(&self) {
        self.store.clear();
    }

    pub fn set_buffer_size(&self, size: usize) -> Result<()> {
        self.consumer.set_buffer_size(size)
    }

    /// Close the stream and stop publishing for good.
    ///
    /// Once this returns no subscriber is notified again, even if a flush was
    /// pending. The last published snapshot stays readable.
    pub fn dispose(&self) {
        self.consumer.dispose();
        self.store.close();
    }

    // --- Filtering ---

    pub fn filter(&self) -> FilterSpec {
        self.filter.read().clone()
    }

    pub fn set_filter(&self, filter: FilterSpec) {
        *self.filter.write() = filter;
    }

    pub fn set_allow(&self, allow: Vec<String>) {
        self.filter.write().allow = allow;
    }

    pub fn set_query(&self, query: impl Into<String>) {
        self.filter.write().query = query.into();
    }

    /// Hide or re-show one severity/status. Returns true if now hidden.
    pub fn toggle_hidden(&self, value: &str) -> bool {
        self.filter.write().toggle_hidden(value)
    }

    // --- Status ---

    pub fn status(&self) -> ConsumerStatus {
        self.consumer.status()
    }

    pub fn error(&self) -> Option<TransportError> {
        self.consumer.error()
    }

    pub fn store(&self) -> &SnapshotStore<R> {
        &self.store
    }

    pub fn consumer(&self) -> &StreamConsumer<R> {
        &self.consumer
    }

    pub fn store_stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn consumer_stats(&self) -> ConsumerStats {
        self.consumer.stats()
    }
}

impl<R: TailRecord> Drop for LiveTail<R> {
    fn drop(&mut self) {
        self.dispose();
    }
}
