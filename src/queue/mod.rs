//! 限流批处理队列：按层级配额分批释放请求，并在后台排空。
//!
//! # Request Queue
//!
//! [`RequestQueue::add`] records a `queued` request and appends it to the
//! pending list. If no drain is running it spawns one on the tokio runtime and
//! returns immediately; the caller never waits for the upstream call.
//!
//! A drain repeatedly takes a prefix of the pending list sized to the active
//! tier's requests-per-minute, runs the batch sequentially (each item through
//! [`retry_with_backoff`]) and pauses for the tier's batch interval while
//! more work is pending. At most one drain is active per queue.

mod executor;
mod pending;

pub use executor::{BatchExecutor, BatchResult};
pub use pending::{PendingItem, PendingQueue};

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::ResponseCache;
use crate::config::{Tier, TierProfile, TierProfiles};
use crate::error_code::StandardErrorCode;
use crate::fingerprint::Fingerprint;
use crate::resilience::{retry_with_backoff, RetryPolicy};
use crate::state::{HistoryEntry, ProcessingRecord, StateContext};
use crate::upstream::{GenerationRequest, Upstream};
use crate::{Error, ErrorContext, Result};

const BATCH_LOG_CAPACITY: usize = 100;

/// What `add` did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Appended at this 1-based pending position.
    Queued { position: usize },
    /// A record for the fingerprint already exists; nothing was added.
    AlreadyTracked,
}

/// Summary of one finished batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub drain_id: Uuid,
    pub size: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

struct QueueInner {
    pending: PendingQueue,
    state: Arc<StateContext>,
    cache: Arc<ResponseCache>,
    upstream: Arc<dyn Upstream>,
    tiers: TierProfiles,
    retry: RetryPolicy,
    executor: BatchExecutor,
    /// `true` while a drain task owns the pending list.
    draining: watch::Sender<bool>,
    /// When the drain takes its next batch; `None` while a batch runs or when idle.
    next_batch_at: RwLock<Option<Instant>>,
    batches: RwLock<VecDeque<BatchSummary>>,
}

#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

impl RequestQueue {
    pub fn new(
        state: Arc<StateContext>,
        cache: Arc<ResponseCache>,
        upstream: Arc<dyn Upstream>,
        tiers: TierProfiles,
        retry: RetryPolicy,
    ) -> Self {
        let (draining, _) = watch::channel(false);
        Self {
            inner: Arc::new(QueueInner {
                pending: PendingQueue::new(),
                state,
                cache,
                upstream,
                tiers,
                retry,
                executor: BatchExecutor::new(),
                draining,
                next_batch_at: RwLock::new(None),
                batches: RwLock::new(VecDeque::new()),
            }),
        }
    }

    /// Create a `queued` record, append the request and make sure a drain is running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn add(&self, id: Fingerprint, request: GenerationRequest) -> Enqueued {
        let record = ProcessingRecord::queued(id.clone(), request.clone(), self.inner.pending.len() + 1);
        if !self.inner.state.processing().insert_if_absent(record) {
            return Enqueued::AlreadyTracked;
        }
        let position = self.inner.pending.push(PendingItem::new(id.clone(), request));
        self.inner.state.processing().set_queue_position(&id, position);
        info!(fingerprint = %id, position, "request queued");

        self.ensure_draining();
        Enqueued::Queued { position }
    }

    fn ensure_draining(&self) {
        let started = self.inner.draining.send_if_modified(|active| {
            if *active {
                false
            } else {
                *active = true;
                true
            }
        });
        if started {
            *self.inner.next_batch_at.write().unwrap() = Some(Instant::now());
            tokio::spawn(drain(self.inner.clone()));
        }
    }

    pub fn pending_len(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn is_draining(&self) -> bool {
        *self.inner.draining.borrow()
    }

    /// Resolve once no drain is active.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.draining.subscribe();
        // the sender lives in `inner`, so the channel cannot close here
        let _ = rx.wait_for(|active| !*active).await;
    }

    /// Most recent batches, oldest first.
    pub fn batch_history(&self) -> Vec<BatchSummary> {
        self.inner.batches.read().unwrap().iter().cloned().collect()
    }

    /// Drop every request that has not started yet.
    pub fn clear_pending(&self) {
        self.inner.pending.clear();
    }

    pub fn profile(&self, tier: Tier) -> &TierProfile {
        self.inner.tiers.profile(tier)
    }

    /// Seconds until the batch holding pending position `position` starts.
    ///
    /// Counts the rest of a pause the drain is already in. While a batch is
    /// running its remaining time is unknown, so one full interval is the lower bound.
    pub fn estimated_wait_secs(&self, tier: Tier, position: usize) -> u64 {
        let profile = self.profile(tier);
        let next_batch_at = *self.inner.next_batch_at.read().unwrap();
        let lead = match next_batch_at {
            Some(at) => at.saturating_duration_since(Instant::now()).as_secs(),
            None if self.is_draining() => profile.batch_interval.as_secs(),
            None => 0,
        };
        profile.estimated_wait_secs(position).saturating_add(lead)
    }
}

async fn drain(inner: Arc<QueueInner>) {
    let drain_id = Uuid::new_v4();
    info!(drain_id = %drain_id, pending = inner.pending.len(), "queue drain started");

    loop {
        let tier = inner.state.tier().await;
        let profile = inner.tiers.profile(tier).clone();
        let batch = inner.pending.take_batch(profile.requests_per_minute.max(1));

        if batch.is_empty() {
            // checked under the watch lock so an `add` racing with shutdown
            // either sees an active drain or starts a new one
            let stopped = inner.draining.send_if_modified(|active| {
                if inner.pending.is_empty() {
                    *active = false;
                    *inner.next_batch_at.write().unwrap() = None;
                    true
                } else {
                    false
                }
            });
            if stopped {
                break;
            }
            continue;
        }

        *inner.next_batch_at.write().unwrap() = None;
        let size = batch.len();
        info!(drain_id = %drain_id, batch_size = size, tier = %tier, "processing batch");
        let api_key = inner.state.api_key().await;
        let result = inner
            .executor
            .execute_sequential(batch, |item| {
                process_item(&inner, api_key.as_deref(), &profile, item)
            })
            .await;

        info!(
            drain_id = %drain_id,
            batch_size = size,
            succeeded = result.success_count(),
            failed = result.failure_count(),
            elapsed_ms = result.execution_time.as_millis() as u64,
            "batch finished"
        );
        {
            let mut batches = inner.batches.write().unwrap();
            if batches.len() == BATCH_LOG_CAPACITY {
                batches.pop_front();
            }
            batches.push_back(BatchSummary {
                drain_id,
                size,
                succeeded: result.success_count(),
                failed: result.failure_count(),
                elapsed: result.execution_time,
            });
        }

        if !inner.pending.is_empty() {
            *inner.next_batch_at.write().unwrap() = Some(Instant::now() + profile.batch_interval);
            tokio::time::sleep(profile.batch_interval).await;
        }
    }

    info!(drain_id = %drain_id, "queue drain finished");
}

async fn process_item(
    inner: &QueueInner,
    api_key: Option<&str>,
    profile: &TierProfile,
    item: PendingItem,
) -> Result<()> {
    let table = inner.state.processing();
    let id = item.id;
    if let Err(e) = table.mark_processing(&id) {
        // the table was reset while the request waited
        warn!(fingerprint = %id, error = %e, "skipping request without a queued record");
        return Err(e);
    }

    let outcome = match api_key {
        Some(key) => {
            retry_with_backoff(&inner.retry, "generate_content", || {
                inner.upstream.generate(key, &item.request, profile.timeout)
            })
            .await
            .and_then(|text| {
                if text.is_empty() {
                    Err(Error::upstream_code(
                        StandardErrorCode::MalformedResponse,
                        "Empty response from API",
                    ))
                } else {
                    Ok(text)
                }
            })
        }
        None => Err(Error::configuration_with_context(
            "API key not set",
            ErrorContext::new()
                .with_field_path("apiKey")
                .with_source("request_queue"),
        )),
    };

    let result = match outcome {
        Ok(text) => {
            if let Err(e) = inner.cache.put(id.as_str(), &text).await {
                warn!(fingerprint = %id, error = %e, "failed to cache response");
            }
            table.complete(&id, text)
        }
        Err(e) => {
            warn!(
                fingerprint = %id,
                http_status = ?e.status(),
                standard_code = e.standard_code().map(|c| c.code()).unwrap_or(""),
                error = %e,
                "request failed"
            );
            let message = e.user_message();
            table.fail(&id, message).and(Err(e))
        }
    };

    if let Err(ref e) = result {
        if matches!(e, Error::Internal { .. }) {
            error!(fingerprint = %id, error = %e, "processing record rejected transition");
        }
    }

    if let Some(record) = table.get(&id) {
        if record.status.is_terminal() {
            if let Err(e) = inner.state.record_history(HistoryEntry::from(&record)).await {
                warn!(fingerprint = %id, error = %e, "failed to persist history entry");
            }
        }
    }

    result
}
