//! Rate-limit tiers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Named rate-limit/timeout profile selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    #[default]
    Free,
    Paid,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "FREE",
            Tier::Paid => "PAID",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierProfile {
    /// Batch size released by one drain.
    pub requests_per_minute: usize,
    /// Per-call network timeout for the upstream request.
    #[serde(with = "super::duration_millis")]
    pub timeout: Duration,
    /// Pause between two consecutive batches of the same drain.
    #[serde(with = "super::duration_millis")]
    pub batch_interval: Duration,
}

impl TierProfile {
    pub fn free() -> Self {
        Self {
            requests_per_minute: 15,
            timeout: Duration::from_secs(30),
            batch_interval: Duration::from_secs(60),
        }
    }

    pub fn paid() -> Self {
        Self {
            requests_per_minute: 60,
            timeout: Duration::from_secs(60),
            batch_interval: Duration::from_secs(60),
        }
    }

    pub fn with_requests_per_minute(mut self, rpm: usize) -> Self {
        self.requests_per_minute = rpm;
        self
    }

    pub fn with_batch_interval(mut self, interval: Duration) -> Self {
        self.batch_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Seconds until the batch holding queue position `position` (1-based) starts.
    pub fn estimated_wait_secs(&self, position: usize) -> u64 {
        let rpm = self.requests_per_minute.max(1);
        let batches_ahead = (position.max(1) - 1) / rpm;
        (batches_ahead as u64).saturating_mul(self.batch_interval.as_secs())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierProfiles {
    pub free: TierProfile,
    pub paid: TierProfile,
}

impl Default for TierProfiles {
    fn default() -> Self {
        Self {
            free: TierProfile::free(),
            paid: TierProfile::paid(),
        }
    }
}

impl TierProfiles {
    pub fn profile(&self, tier: Tier) -> &TierProfile {
        match tier {
            Tier::Free => &self.free,
            Tier::Paid => &self.paid,
        }
    }

    pub(crate) fn profile_mut(&mut self, tier: Tier) -> &mut TierProfile {
        match tier {
            Tier::Free => &mut self.free,
            Tier::Paid => &mut self.paid,
        }
    }
}
