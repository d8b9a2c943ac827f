//! Connection seam between the consumer and the network.
//!
//! A [`Transport`] opens one server-push connection per call and hands back an
//! [`EventStream`] of raw bytes. Dropping the stream closes the connection,
//! which is how the consumer cancels a blocked read when paused.

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use std::collections::VecDeque;
use tokio::sync::mpsc;

/// Header carrying the last seen event id on reconnect.
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-ID";

/// Parameters of one connection attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    pub url: String,
    pub last_event_id: Option<String>,
}

/// Opens server-push connections.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Box<dyn EventStream>, TransportError>;
}

/// Byte stream of one open connection.
#[async_trait]
pub trait EventStream: Send {
    /// Next chunk of bytes; `Ok(None)` once the server ends the response.
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError>;
}

// --- HTTP ---

/// `text/event-stream` over HTTP(S), backed by reqwest.
#[derive(Clone, Debug, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured client (proxies, TLS roots, default headers).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Box<dyn EventStream>, TransportError> {
        let mut builder = self
            .client
            .get(&request.url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");

        if let Some(id) = &request.last_event_id {
            builder = builder.header(LAST_EVENT_ID_HEADER, id.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        Ok(Box::new(HttpEventStream { response }))
    }
}

struct HttpEventStream {
    response: reqwest::Response,
}

#[async_trait]
impl EventStream for HttpEventStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        self.response
            .chunk()
            .await
            .map_err(|e| TransportError::Read(e.to_string()))
    }
}

// --- In-process ---

/// In-process transport fed through channels.
///
/// Each `connect` takes the next scripted outcome: an open connection whose
/// bytes come from a [`ChannelFeed`], or a failure. With nothing scripted,
/// `connect` fails. Useful for in-process producers and for tests.
#[derive(Default)]
pub struct ChannelTransport {
    scripted: Mutex<VecDeque<Result<mpsc::UnboundedReceiver<Bytes>, TransportError>>>,
    requests: Mutex<Vec<ConnectRequest>>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a successful connection and return its producer side.
    pub fn push_connection(&self) -> ChannelFeed {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.scripted.lock().push_back(Ok(receiver));
        ChannelFeed { sender }
    }

    /// Script a failed connection attempt.
    pub fn push_failure(&self, error: TransportError) {
        self.scripted.lock().push_back(Err(error));
    }

    /// Every connection request seen so far.
    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.requests.lock().clone()
    }

    pub fn connect_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(
        &self,
        request: &ConnectRequest,
    ) -> Result<Box<dyn EventStream>, TransportError> {
        self.requests.lock().push(request.clone());
        let next = self.scripted.lock().pop_front();
        match next {
            Some(Ok(receiver)) => Ok(Box::new(ChannelEventStream { receiver })),
            Some(Err(e)) => Err(e),
            None => Err(TransportError::Connect(format!(
                "no connection available for {}",
                request.url
            ))),
        }
    }
}

struct ChannelEventStream {
    receiver: mpsc::UnboundedReceiver<Bytes>,
}

#[async_trait]
impl EventStream for ChannelEventStream {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.receiver.recv().await)
    }
}

/// Producer side of a [`ChannelTransport`] connection.
///
/// Dropping the feed ends the stream, as a server closing the response would.
#[derive(Clone)]
pub struct ChannelFeed {
    sender: mpsc::UnboundedSender<Bytes>,
}

impl ChannelFeed {
    /// Send raw bytes. Returns false once the consumer closed the connection.
    pub fn send_raw(&self, bytes: impl Into<Bytes>) -> bool {
        self.sender.send(bytes.into()).is_ok()
    }

    /// Send one `data:` event.
    pub fn send_data(&self, data: &str) -> bool {
        self.send_raw(format!("data: {data}\n\n"))
    }

    /// Send a keepalive comment.
    pub fn send_comment(&self, comment: &str) -> bool {
        self.send_raw(format!(": {comment}\n"))
    }

    /// Whether the consumer side has closed the connection.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Wait until the consumer side closes the connection.
    pub async fn closed(&self) {
        self.sender.closed().await
    }
}
