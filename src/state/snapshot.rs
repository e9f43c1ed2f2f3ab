//! The durable state snapshot and its tolerant decoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::record::{now_millis, ProcessingRecord, ProcessingStatus};
use crate::config::Tier;
use crate::models::DEFAULT_MODEL;
use crate::{Error, ErrorContext, Result};

/// One finished request, kept for statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub status: ProcessingStatus,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub start_time: Option<u64>,
    #[serde(default)]
    pub start_processing: Option<u64>,
    #[serde(default)]
    pub end_time: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub timestamp: u64,
}

impl HistoryEntry {
    pub fn latency_ms(&self) -> Option<u64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(end.saturating_sub(start)),
            _ => None,
        }
    }
}

impl From<&ProcessingRecord> for HistoryEntry {
    fn from(record: &ProcessingRecord) -> Self {
        Self {
            id: record.id.to_string(),
            status: record.status,
            model: record.request.model.clone(),
            start_time: Some(record.start_time),
            start_processing: record.start_processing,
            end_time: record.end_time,
            error: record.error.clone(),
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total_requests: usize,
    pub completed_requests: usize,
    pub error_requests: usize,
    /// Mean latency of completed requests, rounded to whole milliseconds.
    pub average_time_ms: u64,
}

/// Process-global state that survives across execution contexts.
///
/// Always written as a whole; fields unknown to this version are dropped and
/// fields missing from an older blob fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DurableStateSnapshot {
    pub api_key: Option<String>,
    pub api_key_set: bool,
    pub last_key_validation: Option<u64>,
    pub tier: Tier,
    pub default_model: String,
    pub experimental: bool,
    pub show_legacy: bool,
    pub history: Vec<HistoryEntry>,
}

impl Default for DurableStateSnapshot {
    fn default() -> Self {
        Self::with_default_model(DEFAULT_MODEL)
    }
}

impl DurableStateSnapshot {
    pub fn with_default_model(model: impl Into<String>) -> Self {
        Self {
            api_key: None,
            api_key_set: false,
            last_key_validation: None,
            tier: Tier::Free,
            default_model: model.into(),
            experimental: false,
            show_legacy: false,
            history: Vec::new(),
        }
    }

    /// The stored credential, if one is set and non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Append an entry, dropping the oldest ones beyond `limit`.
    pub fn push_history(&mut self, entry: HistoryEntry, limit: usize) {
        self.history.push(entry);
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
    }

    pub fn stats(&self) -> Stats {
        let completed: Vec<&HistoryEntry> = self
            .history
            .iter()
            .filter(|e| e.status == ProcessingStatus::Complete)
            .collect();
        let latencies: Vec<u64> = completed.iter().filter_map(|e| e.latency_ms()).collect();
        let average_time_ms = if latencies.is_empty() {
            0
        } else {
            let total: u128 = latencies.iter().map(|&l| l as u128).sum();
            let count = latencies.len() as u128;
            ((total + count / 2) / count) as u64
        };

        Stats {
            total_requests: self.history.len(),
            completed_requests: completed.len(),
            error_requests: self
                .history
                .iter()
                .filter(|e| e.status == ProcessingStatus::Error)
                .count(),
            average_time_ms,
        }
    }

    /// Decode a stored blob field by field over `defaults`.
    ///
    /// Unknown fields are ignored. A known field whose value does not decode
    /// keeps its default instead of failing the whole snapshot.
    pub fn merge_over(defaults: Self, raw: &str) -> Result<Self> {
        let stored: Value = serde_json::from_str(raw)?;
        let Value::Object(stored) = stored else {
            return Err(Error::store_with_context(
                "stored snapshot is not a JSON object",
                ErrorContext::new().with_source("state_snapshot"),
            ));
        };

        let mut merged = match serde_json::to_value(&defaults)? {
            Value::Object(map) => map,
            _ => return Ok(defaults),
        };

        for (field, value) in stored {
            if !merged.contains_key(&field) {
                debug!(field = %field, "ignoring unknown snapshot field");
                continue;
            }
            let previous = merged.insert(field.clone(), value);
            if serde_json::from_value::<Self>(Value::Object(merged.clone())).is_err() {
                warn!(field = %field, "snapshot field has an unexpected shape, keeping default");
                if let Some(previous) = previous {
                    merged.insert(field, previous);
                }
            }
        }

        Ok(serde_json::from_value(Value::Object(merged))?)
    }
}
