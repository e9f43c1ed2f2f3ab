//! Sequential batch execution.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::Error;

/// Outcome of one batch; indexes refer to positions inside the batch.
#[derive(Debug)]
pub struct BatchResult<T> {
    pub successes: Vec<(usize, T)>,
    pub failures: Vec<(usize, Error)>,
    pub execution_time: Duration,
    pub total_processed: usize,
}

impl<T> BatchResult<T> {
    pub fn new() -> Self {
        Self {
            successes: Vec::new(),
            failures: Vec::new(),
            execution_time: Duration::ZERO,
            total_processed: 0,
        }
    }

    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the items of a batch one after another in order.
///
/// A failing item is recorded and the rest of the batch still runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchExecutor;

impl BatchExecutor {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute_sequential<I, R, F, Fut>(&self, items: Vec<I>, mut run: F) -> BatchResult<R>
    where
        F: FnMut(I) -> Fut,
        Fut: Future<Output = crate::Result<R>>,
    {
        let start = Instant::now();
        let total = items.len();
        let mut result = BatchResult::new();
        for (i, item) in items.into_iter().enumerate() {
            match run(item).await {
                Ok(r) => result.successes.push((i, r)),
                Err(e) => result.failures.push((i, e)),
            }
        }
        result.execution_time = start.elapsed();
        result.total_processed = total;
        result
    }
}
