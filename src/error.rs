//! Error types for the live-tail core.

use thiserror::Error;

/// Main error type for buffer, store and consumer operations.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid capacity: buffer capacity must be at least 1")]
    InvalidCapacity,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Consumer has been disposed")]
    Disposed,

    #[error("No tokio runtime available to drive the stream")]
    NoRuntime,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Failure reported by a streaming transport.
///
/// Cloneable so it can be kept as the consumer's sticky error while also
/// being handed out to callers.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("read failed: {0}")]
    Read(String),

    #[error("stream closed by server")]
    Closed,
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => TransportError::Status(status.as_u16()),
            None if e.is_connect() || e.is_builder() || e.is_request() => {
                TransportError::Connect(e.to_string())
            }
            None => TransportError::Read(e.to_string()),
        }
    }
}

/// Result type for live-tail operations.
pub type Result<T> = std::result::Result<T, TailError>;
