//! 运行状态模块：处理表、持久快照与统计信息。
//!
//! # State Module
//!
//! Two layers of state back the runtime:
//!
//! - the [`ProcessingTable`], an in-memory map from fingerprint to
//!   [`ProcessingRecord`] that lives as long as one [`StateContext`];
//! - the [`DurableStateSnapshot`], a single serialized blob in a
//!   [`DurableStore`](crate::store::DurableStore) holding the credential,
//!   tier, model preferences and request history.
//!
//! The snapshot is loaded once per context by merging the stored blob over
//! defaults, and every change rewrites it wholesale.

mod record;
mod snapshot;
mod table;

pub use record::{ProcessingRecord, ProcessingStatus};
pub use snapshot::{DurableStateSnapshot, HistoryEntry, Stats};
pub use table::{ProcessingTable, StatusChange};

pub(crate) use record::now_millis;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::{GatewayConfig, Tier};
use crate::store::DurableStore;
use crate::Result;

/// Explicitly constructed state for one execution context.
pub struct StateContext {
    store: Arc<dyn DurableStore>,
    key: String,
    default_model: String,
    history_limit: usize,
    snapshot: Mutex<DurableStateSnapshot>,
    processing: ProcessingTable,
}

impl StateContext {
    /// Load the snapshot stored under `config.state_key`.
    ///
    /// A missing blob yields defaults. A blob that cannot be decoded at all is
    /// logged and replaced by defaults on the next save.
    pub async fn load(store: Arc<dyn DurableStore>, config: &GatewayConfig) -> Result<Self> {
        let defaults = DurableStateSnapshot::with_default_model(config.default_model.clone());
        let snapshot = match store.get(&config.state_key).await? {
            Some(raw) => match DurableStateSnapshot::merge_over(defaults.clone(), &raw) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(key = %config.state_key, error = %e, "discarding unreadable state snapshot");
                    defaults
                }
            },
            None => defaults,
        };
        debug!(
            store = store.name(),
            key = %config.state_key,
            history = snapshot.history.len(),
            "state snapshot loaded"
        );

        Ok(Self {
            store,
            key: config.state_key.clone(),
            default_model: config.default_model.clone(),
            history_limit: config.history_limit,
            snapshot: Mutex::new(snapshot),
            processing: ProcessingTable::new(),
        })
    }

    pub fn processing(&self) -> &ProcessingTable {
        &self.processing
    }

    pub async fn snapshot(&self) -> DurableStateSnapshot {
        self.snapshot.lock().await.clone()
    }

    pub async fn api_key(&self) -> Option<String> {
        self.snapshot.lock().await.api_key().map(str::to_string)
    }

    pub async fn tier(&self) -> Tier {
        self.snapshot.lock().await.tier
    }

    pub async fn default_model(&self) -> String {
        self.snapshot.lock().await.default_model.clone()
    }

    pub async fn stats(&self) -> Stats {
        self.snapshot.lock().await.stats()
    }

    /// Apply `change` and persist the result.
    ///
    /// The in-memory snapshot is only replaced once the store accepted the
    /// new blob.
    pub async fn update<F, R>(&self, change: F) -> Result<R>
    where
        F: FnOnce(&mut DurableStateSnapshot) -> R,
    {
        let mut current = self.snapshot.lock().await;
        let mut next = current.clone();
        let out = change(&mut next);
        self.write(&next).await?;
        *current = next;
        Ok(out)
    }

    /// Persist the current snapshot unchanged.
    pub async fn save(&self) -> Result<()> {
        let current = self.snapshot.lock().await;
        self.write(&current).await
    }

    pub async fn record_history(&self, entry: HistoryEntry) -> Result<()> {
        let limit = self.history_limit;
        self.update(|s| s.push_history(entry, limit)).await
    }

    /// Reset the snapshot to defaults and forget every processing record.
    pub async fn reset(&self) -> Result<()> {
        let defaults = DurableStateSnapshot::with_default_model(self.default_model.clone());
        self.update(|s| *s = defaults).await?;
        self.processing.clear();
        Ok(())
    }

    async fn write(&self, snapshot: &DurableStateSnapshot) -> Result<()> {
        let raw = serde_json::to_string(snapshot)?;
        self.store.set(&self.key, &raw).await
    }
}
