//! Configuration for a live tail view.

use crate::buffer::FlushPolicy;
use crate::error::{Result, TailError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of records kept per view.
pub const DEFAULT_BUFFER_SIZE: usize = 200;

/// How the consumer reconnects after a transport failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Retry automatically (otherwise stay errored until resumed).
    pub enabled: bool,
    /// Delay before the first retry. A server `retry:` field overrides it.
    pub initial_delay_ms: u64,
    /// Upper bound for the doubling backoff.
    pub max_delay_ms: u64,
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.max(self.initial_delay_ms))
    }

    /// Delay to use after `current`, doubling up to the cap.
    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay())
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

/// Full configuration of one live tail view.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Event stream endpoint.
    pub url: String,
    /// Maximum records retained; older ones are evicted.
    pub buffer_size: usize,
    /// Start without connecting.
    pub initial_paused: bool,
    /// Severity (logs) or status (traces) allow-list.
    pub allow: Vec<String>,
    /// Free-text query.
    pub query: String,
    pub flush: FlushPolicy,
    pub reconnect: ReconnectPolicy,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            initial_paused: true,
            allow: Vec::new(),
            query: String::new(),
            flush: FlushPolicy::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl TailConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Reject configurations that could never stream or hold data.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(TailError::InvalidConfig("url must not be empty".to_string()));
        }
        if self.buffer_size == 0 {
            return Err(TailError::InvalidConfig(
                "buffer_size must be at least 1".to_string(),
            ));
        }
        if self.reconnect.enabled && self.reconnect.initial_delay_ms == 0 {
            return Err(TailError::InvalidConfig(
                "reconnect.initial_delay_ms must be positive when reconnect is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
