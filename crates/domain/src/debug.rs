//! Structured per-request debug log, grouped by stage.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One debug record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugEntry {
    /// Pipeline stage, e.g. `interpolate` or `transport`.
    pub stage: String,
    /// Message.
    pub message: String,
    /// Structured detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// When it was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Debug records for one request, in recording order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugLog {
    entries: Vec<DebugEntry>,
}

impl DebugLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a message.
    pub fn log(&mut self, stage: &str, message: impl Into<String>) {
        self.push(stage, message.into(), None);
    }

    /// Records a message with structured data.
    pub fn log_with(&mut self, stage: &str, message: impl Into<String>, data: Value) {
        self.push(stage, message.into(), Some(data));
    }

    fn push(&mut self, stage: &str, message: String, data: Option<Value>) {
        tracing::debug!(stage, "{message}");
        self.entries.push(DebugEntry {
            stage: stage.to_string(),
            message,
            data,
            timestamp: Utc::now(),
        });
    }

    /// All records.
    #[must_use]
    pub fn entries(&self) -> &[DebugEntry] {
        &self.entries
    }

    /// Records grouped by stage, each group in recording order.
    #[must_use]
    pub fn by_stage(&self) -> BTreeMap<&str, Vec<&DebugEntry>> {
        let mut groups: BTreeMap<&str, Vec<&DebugEntry>> = BTreeMap::new();
        for entry in &self.entries {
            groups.entry(entry.stage.as_str()).or_default().push(entry);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_by_stage_groups_in_order() {
        let mut log = DebugLog::new();
        log.log("prepare", "a");
        log.log("transport", "b");
        log.log_with("prepare", "c", serde_json::json!({"k": 1}));

        let groups = log.by_stage();
        let prepare: Vec<&str> = groups["prepare"].iter().map(|e| e.message.as_str()).collect();
        assert_eq!(prepare, vec!["a", "c"]);
        assert_eq!(groups["transport"].len(), 1);
        assert_eq!(log.entries().len(), 3);
    }
}
