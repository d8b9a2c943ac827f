//! Incremental `text/event-stream` decoder.
//!
//! Bytes arrive in arbitrary chunks; the decoder buffers partial lines and
//! emits one [`SseEvent`] per blank-line-terminated block that carried data.

use crate::error::TransportError;
use std::time::Duration;

const BOM: char = '\u{FEFF}';

/// Default bound on one line, and on the data of one event, in bytes.
pub const DEFAULT_MAX_EVENT_BYTES: usize = 1 << 20;

/// Event type used when the server sends no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// One dispatched server-sent event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (`message` unless the server named it).
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream at dispatch time.
    pub id: Option<String>,
}

impl SseEvent {
    /// Unnamed or explicitly `message` events, which carry records.
    pub fn is_message(&self) -> bool {
        self.event == DEFAULT_EVENT
    }
}

/// Stateful decoder for one connection.
#[derive(Debug)]
pub struct SseDecoder {
    /// Bytes of the current, not yet terminated line.
    line: Vec<u8>,
    /// Previous byte was `\r`; a following `\n` belongs to the same break.
    after_cr: bool,
    /// Whether the first line (which may start with a BOM) was seen.
    seen_first_line: bool,
    data: String,
    event: String,
    last_event_id: Option<String>,
    retry: Option<Duration>,
    max_event_bytes: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_event_bytes(DEFAULT_MAX_EVENT_BYTES)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder rejecting lines or event data longer than `max` bytes.
    pub fn with_max_event_bytes(max: usize) -> Self {
        Self {
            line: Vec::new(),
            after_cr: false,
            seen_first_line: false,
            data: String::new(),
            event: String::new(),
            last_event_id: None,
            retry: None,
            max_event_bytes: max,
        }
    }

    /// Feed a chunk of bytes, returning every event completed by it.
    ///
    /// Fails once a single line or the data of one event outgrows the
    /// configured bound; the partial event is discarded and the connection
    /// should be dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, TransportError> {
        let mut events = Vec::new();

        for &byte in chunk {
            if self.after_cr {
                self.after_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }

            match byte {
                b'\n' => self.end_line(&mut events),
                b'\r' => {
                    self.end_line(&mut events);
                    self.after_cr = true;
                }
                _ => self.line.push(byte),
            }

            if self.line.len() > self.max_event_bytes || self.data.len() > self.max_event_bytes {
                let limit = self.max_event_bytes;
                self.reset();
                return Err(TransportError::Read(format!(
                    "event stream line or event exceeds {limit} bytes"
                )));
            }
        }

        Ok(events)
    }

    /// Last `id:` value received, sent back as `Last-Event-ID` on reconnect.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Reconnect delay requested by the server since the last call.
    pub fn take_retry(&mut self) -> Option<Duration> {
        self.retry.take()
    }

    /// Forget any partially received line or event. The last event id is kept.
    pub fn reset(&mut self) {
        self.line.clear();
        self.after_cr = false;
        self.seen_first_line = false;
        self.data.clear();
        self.event.clear();
    }

    fn end_line(&mut self, events: &mut Vec<SseEvent>) {
        let raw = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();

        let line = if self.seen_first_line {
            raw.as_str()
        } else {
            self.seen_first_line = true;
            raw.strip_prefix(BOM).unwrap_or(&raw)
        };

        if line.is_empty() {
            if let Some(event) = self.dispatch() {
                events.push(event);
            }
            return;
        }

        if line.starts_with(':') {
            // Comment / keepalive
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "event" => self.event = value.to_string(),
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = if value.is_empty() {
                        None
                    } else {
                        Some(value.to_string())
                    };
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse::<u64>() {
                        self.retry = Some(Duration::from_millis(ms));
                    }
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = std::mem::take(&mut self.event);
        if self.data.is_empty() {
            return None;
        }

        let mut data = std::mem::take(&mut self.data);
        data.pop();

        Some(SseEvent {
            event: if event.is_empty() {
                DEFAULT_EVENT.to_string()
            } else {
                event
            },
            data,
            id: self.last_event_id.clone(),
        })
    }
}
