//! 遥测模块：日志订阅器初始化与失败诊断记录。
//!
//! Telemetry module.
//!
//! | Item | Description |
//! |------|-------------|
//! | [`init_tracing`] | Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG` |
//! | [`log_failure`] | Turns a caught failure into one structured `error!` event |
//! | [`FailureLog`] | Bounded, context-owned buffer of recent failure records |

use std::collections::VecDeque;
use std::sync::RwLock;

use serde::Serialize;
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::state::now_millis;

const PROMPT_PREVIEW_CHARS: usize = 50;
const DEFAULT_FAILURE_CAPACITY: usize = 50;

/// Install the global subscriber. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Diagnostic record of one caught failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub timestamp_ms: u64,
    pub message: String,
    /// Messages of the `source()` chain, outermost first.
    pub causes: Vec<String>,
    pub function: String,
    pub prompt: Option<String>,
}

/// Log a caught failure with its call-site context.
pub fn log_failure(
    err: &(dyn std::error::Error + 'static),
    function: &str,
    prompt: Option<&str>,
) -> FailureRecord {
    let mut causes = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }

    let record = FailureRecord {
        timestamp_ms: now_millis(),
        message: err.to_string(),
        causes,
        function: function.to_string(),
        prompt: prompt.map(|p| p.chars().take(PROMPT_PREVIEW_CHARS).collect()),
    };

    error!(
        function = %record.function,
        prompt = record.prompt.as_deref().unwrap_or(""),
        causes = ?record.causes,
        timestamp_ms = record.timestamp_ms,
        "{}",
        record.message
    );
    record
}

/// Recent failures of one gateway, oldest first.
#[derive(Debug)]
pub struct FailureLog {
    records: RwLock<VecDeque<FailureRecord>>,
    capacity: usize,
}

impl FailureLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: RwLock::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// [`log_failure`], keeping the record.
    pub fn record(
        &self,
        err: &(dyn std::error::Error + 'static),
        function: &str,
        prompt: Option<&str>,
    ) -> FailureRecord {
        let record = log_failure(err, function, prompt);
        let mut records = self.records.write().unwrap();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
        record
    }

    pub fn recent(&self) -> Vec<FailureRecord> {
        self.records.read().unwrap().iter().cloned().collect()
    }
}

impl Default for FailureLog {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_CAPACITY)
    }
}
