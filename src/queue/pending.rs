//! FIFO list of requests waiting for a drain.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use crate::fingerprint::Fingerprint;
use crate::upstream::GenerationRequest;

#[derive(Debug, Clone)]
pub struct PendingItem {
    pub id: Fingerprint,
    pub request: GenerationRequest,
    pub added_at: Instant,
}

impl PendingItem {
    pub fn new(id: Fingerprint, request: GenerationRequest) -> Self {
        Self {
            id,
            request,
            added_at: Instant::now(),
        }
    }
}

#[derive(Clone, Default)]
pub struct PendingQueue {
    items: Arc<RwLock<VecDeque<PendingItem>>>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item and return its 1-based position.
    pub fn push(&self, item: PendingItem) -> usize {
        let mut items = self.items.write().unwrap();
        items.push_back(item);
        items.len()
    }

    /// Remove up to `max` items from the front.
    pub fn take_batch(&self, max: usize) -> Vec<PendingItem> {
        let mut items = self.items.write().unwrap();
        let n = max.min(items.len());
        items.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.items.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.items.write().unwrap().clear();
    }
}
