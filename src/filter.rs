//! Client-side filtering over published snapshots.
//!
//! Filtering is a pure function of a snapshot and a [`FilterSpec`]; it never
//! reorders, so the newest-first order of the snapshot is preserved.

use crate::types::TailRecord;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Allow-list, hide-set and free-text query applied to a snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    /// Keep only these discriminant values (empty = keep all).
    pub allow: Vec<String>,
    /// Discriminant values hidden interactively, independent of `allow`.
    pub hidden: BTreeSet<String>,
    /// Case-insensitive substring matched against the record's search fields.
    pub query: String,
}

impl FilterSpec {
    /// Create a new empty filter (matches everything).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allow<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_hidden<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hidden = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Hide a discriminant value, or show it again if already hidden.
    /// Returns true if the value is hidden afterwards.
    pub fn toggle_hidden(&mut self, value: &str) -> bool {
        if self.hidden.remove(value) {
            false
        } else {
            self.hidden.insert(value.to_string());
            true
        }
    }

    /// True when no criterion is set.
    pub fn is_pass_through(&self) -> bool {
        self.allow.is_empty() && self.hidden.is_empty() && self.query.trim().is_empty()
    }

    /// Check a single record. `needle` is the lowercased, trimmed query.
    fn matches<R: TailRecord>(&self, record: &R, needle: &str) -> bool {
        let discriminant = record.discriminant();

        if !self.allow.is_empty() && !self.allow.iter().any(|v| v == discriminant) {
            return false;
        }

        if self.hidden.contains(discriminant) {
            return false;
        }

        needle.is_empty() || record.matches_text(needle)
    }

    /// Apply the filter, borrowing from `records`.
    pub fn apply<'a, R: TailRecord>(&self, records: &'a [R]) -> Vec<&'a R> {
        if self.is_pass_through() {
            return records.iter().collect();
        }

        let needle = self.query.trim().to_lowercase();
        records
            .iter()
            .filter(|record| self.matches(*record, &needle))
            .collect()
    }
}

/// Filter a snapshot (or any newest-first slice) with `spec`.
pub fn filter_records<'a, R: TailRecord>(records: &'a [R], spec: &FilterSpec) -> Vec<&'a R> {
    spec.apply(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LogRecord;

    fn log(severity: &str, service: &str, body: &str) -> LogRecord {
        LogRecord::new(severity, service, body)
    }

    fn bodies<'a>(records: &[&'a LogRecord]) -> Vec<&'a str> {
        records.iter().map(|r| r.body.as_str()).collect()
    }

    fn sample() -> Vec<LogRecord> {
        // Newest first
        vec![
            log("error", "billing", "charge failed"),
            log("warn", "api", "slow response"),
            log("info", "api", "request ok"),
            log("warn", "billing", "retrying charge"),
            log("error", "auth", "token expired"),
        ]
    }

    #[test]
    fn test_empty_filter_passes_everything() {
        let records = sample();
        let spec = FilterSpec::new();
        assert!(spec.is_pass_through());
        assert_eq!(filter_records(&records, &spec).len(), records.len());
    }

    #[test]
    fn test_allow_list() {
        let records = sample();
        let spec = FilterSpec::new().with_allow(["warn"]);
        assert_eq!(
            bodies(&spec.apply(&records)),
            vec!["slow response", "retrying charge"]
        );
    }

    #[test]
    fn test_allow_and_hidden_compose() {
        let records = sample();
        let spec = FilterSpec::new()
            .with_allow(["warn", "error"])
            .with_hidden(["error"]);
        let filtered = spec.apply(&records);
        assert!(filtered.iter().all(|r| r.severity == "warn"));
        assert_eq!(
            bodies(&filtered),
            vec!["slow response", "retrying charge"]
        );
    }

    #[test]
    fn test_hidden_without_allow_list() {
        let records = sample();
        let spec = FilterSpec::new().with_hidden(["info", "warn"]);
        assert_eq!(
            bodies(&spec.apply(&records)),
            vec!["charge failed", "token expired"]
        );
    }

    #[test]
    fn test_query_matches_body_or_service_case_insensitively() {
        let records = sample();

        let spec = FilterSpec::new().with_query("CHARGE");
        assert_eq!(
            bodies(&spec.apply(&records)),
            vec!["charge failed", "retrying charge"]
        );

        let spec = FilterSpec::new().with_query("Auth");
        assert_eq!(bodies(&spec.apply(&records)), vec!["token expired"]);
    }

    #[test]
    fn test_whitespace_query_is_ignored() {
        let records = sample();
        let spec = FilterSpec::new().with_query("   ");
        assert!(spec.is_pass_through());
        assert_eq!(spec.apply(&records).len(), records.len());
    }

    #[test]
    fn test_all_criteria_together() {
        let records = sample();
        let spec = FilterSpec::new()
            .with_allow(["warn", "error"])
            .with_hidden(["warn"])
            .with_query("billing");
        assert_eq!(bodies(&spec.apply(&records)), vec!["charge failed"]);
    }

    #[test]
    fn test_toggle_hidden() {
        let mut spec = FilterSpec::new();
        assert!(spec.toggle_hidden("debug"));
        assert!(spec.hidden.contains("debug"));
        assert!(!spec.toggle_hidden("debug"));
        assert!(spec.hidden.is_empty());
    }
}
