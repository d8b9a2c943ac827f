//! Streaming ingestion: server-sent event decoding, transports, and the
//! consumer that feeds decoded records into a [`SnapshotStore`](crate::SnapshotStore).

mod consumer;
mod sse;
mod transport;

pub use consumer::{ConsumerOptions, ConsumerStats, ConsumerStatus, StreamConsumer};
pub use sse::{SseDecoder, SseEvent, DEFAULT_EVENT, DEFAULT_MAX_EVENT_BYTES};
pub use transport::{
    ChannelFeed, ChannelTransport, ConnectRequest, EventStream, HttpTransport, Transport,
    LAST_EVENT_ID_HEADER,
};
