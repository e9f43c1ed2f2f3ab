//! Processing records and their status machine.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::fingerprint::Fingerprint;
use crate::upstream::GenerationRequest;

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Lifecycle of one request: `queued → processing → {complete | error}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingStatus {
    Queued,
    Processing,
    Complete,
    Error,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Processing => 1,
            Self::Complete | Self::Error => 2,
        }
    }

    /// Status only moves forward and never leaves a terminal state.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingRecord {
    pub id: Fingerprint,
    pub status: ProcessingStatus,
    #[serde(flatten)]
    pub request: GenerationRequest,
    pub start_time: u64,
    pub start_processing: Option<u64>,
    pub end_time: Option<u64>,
    /// Present iff `status == Complete`.
    pub response: Option<String>,
    /// Present iff `status == Error`.
    pub error: Option<String>,
    /// 1-based position in the pending list at enqueue time.
    pub queue_position: usize,
}

impl ProcessingRecord {
    pub fn queued(id: Fingerprint, request: GenerationRequest, queue_position: usize) -> Self {
        Self {
            id,
            status: ProcessingStatus::Queued,
            request,
            start_time: now_millis(),
            start_processing: None,
            end_time: None,
            response: None,
            error: None,
            queue_position,
        }
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.end_time.map(|end| end.saturating_sub(self.start_time))
    }
}
