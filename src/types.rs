//! Core record types consumed by the live-tail buffer.

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default();
        Timestamp(millis)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({}ms)", self.0)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    // Producers emit epoch-millis as a plain JSON number, which may carry a
    // fractional part.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let millis = f64::deserialize(deserializer)?;
        if !millis.is_finite() {
            return Err(de::Error::custom("timestamp must be a finite number"));
        }
        Ok(Timestamp(millis.trunc() as i64))
    }
}

/// A record that can be buffered, filtered and searched by the live tail.
///
/// Records arrive as one JSON object per stream message. Anything that fails
/// to deserialize into the implementing type is treated as malformed.
pub trait TailRecord: DeserializeOwned + Clone + Send + Sync + 'static {
    /// When the record was produced.
    fn timestamp(&self) -> Timestamp;

    /// Field used by allow-list and hide filtering (severity, status, ...).
    fn discriminant(&self) -> &str;

    /// Text fields searched by the free-text query.
    fn search_fields(&self) -> Vec<&str>;

    /// Case-insensitive substring match. `needle` must already be lowercase.
    fn matches_text(&self, needle: &str) -> bool {
        self.search_fields()
            .iter()
            .any(|field| contains_folded(field, needle))
    }
}

/// Substring test against a lowercase `needle`, folding `haystack` on the fly.
pub(crate) fn contains_folded(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    if haystack.is_ascii() && needle.is_ascii() {
        return haystack
            .as_bytes()
            .windows(needle.len())
            .any(|window| window.eq_ignore_ascii_case(needle.as_bytes()));
    }

    haystack.char_indices().any(|(start, _)| {
        let mut folded = haystack[start..].chars().flat_map(char::to_lowercase);
        needle.chars().all(|expected| folded.next() == Some(expected))
    })
}

/// A single log line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub ts: Timestamp,
    pub severity: String,
    pub service: String,
    pub body: String,

    /// Any additional fields sent by the producer.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl LogRecord {
    pub fn new(
        severity: impl Into<String>,
        service: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            ts: Timestamp::now(),
            severity: severity.into(),
            service: service.into(),
            body: body.into(),
            extra: BTreeMap::new(),
        }
    }
}

impl TailRecord for LogRecord {
    fn timestamp(&self) -> Timestamp {
        self.ts
    }

    fn discriminant(&self) -> &str {
        &self.severity
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.body.as_str(), self.service.as_str()]
    }
}

/// A single finished trace span.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub trace_id: String,
    pub span_id: String,
    pub name: String,
    pub dur_ms: f64,
    pub status: String,
    pub ts: Timestamp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl TailRecord for TraceRecord {
    fn timestamp(&self) -> Timestamp {
        self.ts
    }

    fn discriminant(&self) -> &str {
        &self.status
    }

    fn search_fields(&self) -> Vec<&str> {
        let mut fields = vec![self.name.as_str()];
        if let Some(service) = &self.service {
            fields.push(service);
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_record_keeps_extra_fields() {
        let record: LogRecord = serde_json::from_value(json!({
            "ts": 1_700_000_000_123_i64,
            "severity": "warn",
            "service": "api",
            "body": "slow request",
            "latency_ms": 812,
            "route": "/v1/items"
        }))
        .unwrap();

        assert_eq!(record.ts, Timestamp(1_700_000_000_123));
        assert_eq!(record.discriminant(), "warn");
        assert_eq!(record.extra.len(), 2);
        assert_eq!(record.extra["route"], "/v1/items");
    }

    #[test]
    fn test_log_record_missing_field_is_malformed() {
        let result: Result<LogRecord, _> = serde_json::from_value(json!({
            "ts": 1,
            "severity": "info",
            "body": "no service"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_fractional_timestamp_truncates() {
        let record: LogRecord = serde_json::from_str(
            r#"{"ts": 1700000000123.9, "severity": "info", "service": "a", "body": "b"}"#,
        )
        .unwrap();
        assert_eq!(record.ts.as_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_string_timestamp_is_malformed() {
        let result: Result<LogRecord, _> = serde_json::from_str(
            r#"{"ts": "yesterday", "severity": "info", "service": "a", "body": "b"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_trace_record_optional_fields() {
        let record: TraceRecord = serde_json::from_value(json!({
            "trace_id": "t1",
            "span_id": "s1",
            "name": "GET /users",
            "dur_ms": 12.5,
            "status": "ok",
            "ts": 42
        }))
        .unwrap();

        assert!(record.service.is_none());
        assert!(record.attributes.is_empty());
        assert_eq!(record.search_fields(), vec!["GET /users"]);
        assert!(record.matches_text("users"));
        assert!(!record.matches_text("checkout"));
    }

    #[test]
    fn test_matches_text_is_case_insensitive() {
        let record = LogRecord::new("error", "Billing", "Payment DECLINED");
        assert!(record.matches_text("declined"));
        assert!(record.matches_text("billing"));
        assert!(!record.matches_text("refund"));
    }

    #[test]
    fn test_contains_folded() {
        assert!(contains_folded("Payment DECLINED", "declined"));
        assert!(contains_folded("anything", ""));
        assert!(!contains_folded("abc", "abcd"));
        assert!(contains_folded("Größe ÜBER limit", "über"));
        assert!(contains_folded("CAFÉ open", "café"));
        assert!(!contains_folded("CAFÉ open", "cafe"));
    }
}
