//! # Live Tail
//!
//! A bounded live-event buffer fed by a server-sent event stream, for views
//! that tail logs or traces as they happen.
//!
//! ## Core Concepts
//!
//! - **Ring buffer**: fixed capacity, the oldest record is evicted when full
//! - **Snapshots**: immutable newest-first views, republished at most once per flush
//! - **Consumer**: one streaming connection with pause, resume and reconnect
//! - **Filters**: allow-list, hide-set and free-text query over a snapshot
//!
//! ## Example
//!
//! ```ignore
//! use livetail::{LiveTail, LogRecord, TailConfig};
//!
//! let tail: LiveTail<LogRecord> = LiveTail::new(TailConfig {
//!     initial_paused: false,
//!     ..TailConfig::new("http://localhost:8080/logs/stream")
//! })?;
//!
//! // Re-render whenever a flush publishes a new snapshot
//! let subscription = tail.subscribe(|| println!("new records"));
//!
//! // Only warnings and errors mentioning "checkout"
//! tail.set_allow(vec!["warn".into(), "error".into()]);
//! tail.set_query("checkout");
//! let visible = tail.filtered();
//!
//! tail.pause();
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod filter;
pub mod stream;
pub mod subscriptions;
pub mod tail;
pub mod types;

// Re-exports
pub use buffer::{FlushPolicy, RingBuffer, Snapshot, SnapshotStore, StoreStats};
pub use config::{ReconnectPolicy, TailConfig, DEFAULT_BUFFER_SIZE};
pub use error::{Result, TailError, TransportError};
pub use filter::{filter_records, FilterSpec};
pub use stream::{
    ChannelFeed, ChannelTransport, ConnectRequest, ConsumerOptions, ConsumerStats,
    ConsumerStatus, EventStream, HttpTransport, SseDecoder, SseEvent, StreamConsumer, Transport,
    DEFAULT_MAX_EVENT_BYTES,
};
pub use subscriptions::{SubscriberId, SubscriberSet, Subscription, Watcher};
pub use tail::LiveTail;
pub use types::{LogRecord, TailRecord, Timestamp, TraceRecord};
