//! Long-lived stream consumer feeding a snapshot store.
//!
//! The consumer owns at most one connection at a time. Each connection runs
//! as a tokio task tagged with a generation number; `pause` and `dispose` bump
//! the generation and abort the task, which drops the transport stream and
//! closes the connection. Records are only pushed while holding the consumer
//! lock and only for the current generation, so nothing from a superseded
//! connection reaches the store once `pause` returns.

use crate::buffer::SnapshotStore;
use crate::config::ReconnectPolicy;
use crate::error::{Result, TailError, TransportError};
use crate::stream::sse::{SseDecoder, SseEvent};
use crate::stream::transport::{ConnectRequest, Transport};
use crate::types::TailRecord;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Lifecycle state of a consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerStatus {
    /// Paused, no connection.
    Idle,
    /// Connection attempt in flight.
    Connecting,
    /// Connected and receiving.
    Open,
    /// Last connection failed; see [`StreamConsumer::error`].
    Errored,
    /// Terminal.
    Disposed,
}

/// Counters for one consumer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConsumerStats {
    /// Events dispatched by the decoder.
    pub received: u64,
    /// Records pushed into the store.
    pub accepted: u64,
    /// Message events whose data did not parse as a record.
    pub malformed: u64,
    /// Named events other than `message`.
    pub ignored: u64,
    /// Connection attempts.
    pub connects: u64,
}

/// Options beyond the url, transport and store.
#[derive(Clone, Debug, Default)]
pub struct ConsumerOptions {
    pub reconnect: ReconnectPolicy,
    /// Runtime driving the connection task (default: the current one).
    pub runtime: Option<Handle>,
}

struct ConsumerState {
    status: ConsumerStatus,
    generation: u64,
    task: Option<JoinHandle<()>>,
    error: Option<TransportError>,
    last_event_id: Option<String>,
    status_tx: Option<watch::Sender<ConsumerStatus>>,
}

impl ConsumerState {
    fn set_status(&mut self, status: ConsumerStatus) {
        self.status = status;
        if let Some(tx) = &self.status_tx {
            tx.send_replace(status);
        }
    }

    /// Invalidate the running connection, if any.
    fn cancel_task(&mut self) {
        self.generation += 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct ConsumerShared<R> {
    url: String,
    transport: Arc<dyn Transport>,
    store: SnapshotStore<R>,
    reconnect: ReconnectPolicy,
    runtime: Handle,
    state: Mutex<ConsumerState>,
    received: AtomicU64,
    accepted: AtomicU64,
    malformed: AtomicU64,
    ignored: AtomicU64,
    connects: AtomicU64,
}

impl<R: TailRecord> ConsumerShared<R> {
    /// Update the status if `generation` is still current.
    fn transition(&self, generation: u64, status: ConsumerStatus) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.set_status(status);
        true
    }

    fn connect_request(&self, generation: u64) -> Option<ConnectRequest> {
        let mut state = self.state.lock();
        if state.generation != generation {
            return None;
        }
        state.set_status(ConsumerStatus::Connecting);
        Some(ConnectRequest {
            url: self.url.clone(),
            last_event_id: state.last_event_id.clone(),
        })
    }

    fn mark_open(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.error = None;
        state.set_status(ConsumerStatus::Open);
        true
    }

    fn mark_failed(&self, generation: u64, error: TransportError) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        tracing::warn!(url = %self.url, generation, error = %error, "stream transport failed");
        state.error = Some(error);
        state.set_status(ConsumerStatus::Errored);
        true
    }

    /// Parse dispatched events and push the records for `generation`.
    ///
    /// Returns false if the connection has been superseded.
    fn deliver(&self, generation: u64, events: Vec<SseEvent>, last_event_id: Option<&str>) -> bool {
        let mut records = Vec::with_capacity(events.len());
        for event in events {
            self.received.fetch_add(1, Ordering::Relaxed);
            if !event.is_message() {
                self.ignored.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(event = %event.event, "ignoring named event");
                continue;
            }
            match serde_json::from_str::<R>(&event.data) {
                Ok(record) => records.push(record),
                Err(e) => {
                    self.malformed.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(error = %e, "dropping malformed record");
                }
            }
        }

        let pushed = {
            let mut state = self.state.lock();
            if state.generation != generation {
                return false;
            }
            state.last_event_id = last_event_id.map(str::to_string);
            self.store.extend_unscheduled(records)
        };

        // Scheduling may flush inline and run subscriber callbacks, which are
        // free to call back into the consumer.
        if pushed > 0 {
            self.accepted.fetch_add(pushed, Ordering::Relaxed);
            self.store.schedule_flush();
        }
        true
    }
}

async fn run_connection<R: TailRecord>(shared: Arc<ConsumerShared<R>>, generation: u64) {
    let mut decoder = SseDecoder::new();
    let mut base_delay = shared.reconnect.initial_delay();
    let mut delay = base_delay;

    loop {
        let Some(request) = shared.connect_request(generation) else {
            return;
        };
        shared.connects.fetch_add(1, Ordering::Relaxed);
        tracing::info!(url = %request.url, generation, "connecting to event stream");

        let failure = match shared.transport.connect(&request).await {
            Ok(mut stream) => {
                if !shared.mark_open(generation) {
                    return;
                }
                tracing::info!(url = %request.url, generation, "event stream open");
                decoder.reset();
                delay = base_delay;

                loop {
                    match stream.next_chunk().await {
                        Ok(Some(chunk)) => {
                            let events = match decoder.feed(&chunk) {
                                Ok(events) => events,
                                Err(e) => break e,
                            };
                            if let Some(retry) = decoder.take_retry() {
                                base_delay = retry;
                                delay = retry;
                            }
                            if !shared.deliver(generation, events, decoder.last_event_id()) {
                                return;
                            }
                        }
                        Ok(None) => break TransportError::Closed,
                        Err(e) => break e,
                    }
                }
            }
            Err(e) => e,
        };

        if !shared.mark_failed(generation, failure) {
            return;
        }
        if !shared.reconnect.enabled {
            return;
        }

        tracing::warn!(url = %shared.url, delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::time::sleep(delay).await;
        delay = shared.reconnect.next_delay(delay);
    }
}

/// Feeds records from one server-push stream into a [`SnapshotStore`].
///
/// Starts paused. `resume` opens the connection, `pause` closes it, and
/// `dispose` (also run on drop) closes it for good. Transport failures are
/// kept as a sticky [`error`](Self::error); buffered records are untouched.
pub struct StreamConsumer<R: TailRecord> {
    shared: Arc<ConsumerShared<R>>,
}

impl<R: TailRecord> StreamConsumer<R> {
    /// Create a paused consumer on the current tokio runtime.
    pub fn new(
        url: impl Into<String>,
        transport: Arc<dyn Transport>,
        store: SnapshotStore<R>,
    ) -> Result<Self> {
        Self::with_options(url, transport, store, ConsumerOptions::default())
    }

    pub fn with_options(
        url: impl Into<String>,
        transport: Arc<dyn Transport>,
        store: SnapshotStore<R>,
        options: ConsumerOptions,
    ) -> Result<Self> {
        let runtime = match options.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| TailError::NoRuntime)?,
        };

        let (status_tx, _) = watch::channel(ConsumerStatus::Idle);

        Ok(Self {
            shared: Arc::new(ConsumerShared {
                url: url.into(),
                transport,
                store,
                reconnect: options.reconnect,
                runtime,
                state: Mutex::new(ConsumerState {
                    status: ConsumerStatus::Idle,
                    generation: 0,
                    task: None,
                    error: None,
                    last_event_id: None,
                    status_tx: Some(status_tx),
                }),
                received: AtomicU64::new(0),
                accepted: AtomicU64::new(0),
                malformed: AtomicU64::new(0),
                ignored: AtomicU64::new(0),
                connects: AtomicU64::new(0),
            }),
        })
    }

    // --- Lifecycle ---

    /// Open the connection. Clears any previous error.
    ///
    /// No-op while already connecting or open. While errored, any pending
    /// automatic retry is replaced by an immediate attempt.
    pub fn resume(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        match state.status {
            ConsumerStatus::Disposed => return Err(TailError::Disposed),
            ConsumerStatus::Connecting | ConsumerStatus::Open => return Ok(()),
            ConsumerStatus::Idle | ConsumerStatus::Errored => {}
        }

        state.cancel_task();
        state.error = None;
        state.set_status(ConsumerStatus::Connecting);

        let generation = state.generation;
        let task = self
            .shared
            .runtime
            .spawn(run_connection(Arc::clone(&self.shared), generation));
        state.task = Some(task);

        tracing::info!(url = %self.shared.url, generation, "stream resumed");
        Ok(())
    }

    /// Close the connection and go idle. The sticky error, if any, is kept.
    pub fn pause(&self) {
        let mut state = self.shared.state.lock();
        if matches!(state.status, ConsumerStatus::Idle | ConsumerStatus::Disposed) {
            return;
        }
        state.cancel_task();
        state.set_status(ConsumerStatus::Idle);
        tracing::info!(url = %self.shared.url, "stream paused");
    }

    /// Close the connection permanently and detach status listeners.
    pub fn dispose(&self) {
        let mut state = self.shared.state.lock();
        if state.status == ConsumerStatus::Disposed {
            return;
        }
        state.cancel_task();
        state.set_status(ConsumerStatus::Disposed);
        state.status_tx = None;
        tracing::info!(url = %self.shared.url, "stream disposed");
    }

    /// Pause or resume.
    pub fn set_paused(&self, paused: bool) -> Result<()> {
        if paused {
            self.pause();
            Ok(())
        } else {
            self.resume()
        }
    }

    /// Resize the backing store, whatever the connection state.
    pub fn set_buffer_size(&self, capacity: usize) -> Result<()> {
        self.shared.store.set_capacity(capacity)
    }

    // --- Observation ---

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn store(&self) -> &SnapshotStore<R> {
        &self.shared.store
    }

    pub fn status(&self) -> ConsumerStatus {
        self.shared.state.lock().status
    }

    pub fn is_paused(&self) -> bool {
        self.status() == ConsumerStatus::Idle
    }

    pub fn is_disposed(&self) -> bool {
        self.status() == ConsumerStatus::Disposed
    }

    /// Sticky transport error from the last failed connection.
    pub fn error(&self) -> Option<TransportError> {
        self.shared.state.lock().error.clone()
    }

    /// Observe status changes. After dispose the channel is closed.
    pub fn status_receiver(&self) -> watch::Receiver<ConsumerStatus> {
        let state = self.shared.state.lock();
        match &state.status_tx {
            Some(tx) => tx.subscribe(),
            None => watch::channel(ConsumerStatus::Disposed).1,
        }
    }

    pub fn stats(&self) -> ConsumerStats {
        ConsumerStats {
            received: self.shared.received.load(Ordering::Relaxed),
            accepted: self.shared.accepted.load(Ordering::Relaxed),
            malformed: self.shared.malformed.load(Ordering::Relaxed),
            ignored: self.shared.ignored.load(Ordering::Relaxed),
            connects: self.shared.connects.load(Ordering::Relaxed),
        }
    }

    /// Wait until the status satisfies `predicate` or `timeout` elapses.
    pub async fn wait_for_status<F>(&self, predicate: F, timeout: Duration) -> Option<ConsumerStatus>
    where
        F: Fn(ConsumerStatus) -> bool,
    {
        let mut rx = self.status_receiver();
        let result = tokio::time::timeout(timeout, rx.wait_for(|status| predicate(*status))).await;
        match result {
            Ok(Ok(status)) => Some(*status),
            _ => None,
        }
    }
}

impl<R: TailRecord> Drop for StreamConsumer<R> {
    fn drop(&mut self) {
        self.dispose();
    }
}
