//! Response cache manager with transparent chunking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::backend::CacheBackend;
use super::envelope::{chunk_key, split_chunks, CacheEnvelope};
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Expiry applied to the envelope and every chunk.
    #[serde(with = "crate::config::duration_secs")]
    pub ttl: Duration,
    pub enabled: bool,
    /// Values longer than this many characters are stored in chunks of this size.
    pub chunk_size: usize,
    pub key_prefix: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(6 * 60 * 60),
            enabled: true,
            chunk_size: 100_000,
            key_prefix: Some("geminiResponse_".to_string()),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = Some(prefix.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub chunked_sets: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    chunked_sets: AtomicU64,
    errors: AtomicU64,
}
impl AtomicStats {
    fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            sets: AtomicU64::new(0),
            chunked_sets: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            chunked_sets: self.chunked_sets.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Content-addressed response cache.
///
/// Reads never return partial data: a chunked entry with any chunk missing
/// is reported as a miss. Writes store every chunk before the envelope, so
/// an interrupted write leaves no readable envelope behind.
pub struct ResponseCache {
    config: CacheConfig,
    backend: Arc<dyn CacheBackend>,
    stats: Arc<AtomicStats>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            config,
            backend,
            stats: Arc::new(AtomicStats::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let full_key = self.prefix_key(key);
        let raw = match self.backend.get(&full_key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Ok(self.miss()),
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let envelope: CacheEnvelope = match serde_json::from_str(&raw) {
            Ok(env) => env,
            Err(e) => {
                warn!(key = %full_key, error = %e, "unreadable cache envelope");
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                return Ok(self.miss());
            }
        };

        match envelope {
            CacheEnvelope::Single { data } => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(data))
            }
            CacheEnvelope::Chunked { keys, length } => {
                if keys.len() != length {
                    warn!(key = %full_key, keys = keys.len(), length, "chunk list does not match length");
                    return Ok(self.miss());
                }
                let mut chunks = match self.backend.get_many(&keys).await {
                    Ok(c) => c,
                    Err(e) => {
                        self.stats.errors.fetch_add(1, Ordering::Relaxed);
                        return Err(e);
                    }
                };
                if chunks.len() != length {
                    debug!(key = %full_key, found = chunks.len(), length, "chunked entry incomplete");
                    return Ok(self.miss());
                }
                let mut value = String::new();
                for k in &keys {
                    match chunks.remove(k) {
                        Some(part) => value.push_str(&part),
                        None => return Ok(self.miss()),
                    }
                }
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(value))
            }
        }
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        let full_key = self.prefix_key(key);
        let ttl = self.config.ttl;

        let envelope = if value.chars().count() > self.config.chunk_size {
            let chunks = split_chunks(value, self.config.chunk_size);
            let keys: Vec<String> = (0..chunks.len()).map(|i| chunk_key(&full_key, i)).collect();
            for (chunk_key, chunk) in keys.iter().zip(&chunks) {
                self.tracked(self.backend.set(chunk_key, chunk, ttl).await)?;
            }
            self.stats.chunked_sets.fetch_add(1, Ordering::Relaxed);
            debug!(key = %full_key, chunks = chunks.len(), "stored chunked response");
            CacheEnvelope::Chunked {
                length: keys.len(),
                keys,
            }
        } else {
            CacheEnvelope::Single {
                data: value.to_string(),
            }
        };

        let raw = serde_json::to_string(&envelope)?;
        self.tracked(self.backend.set(&full_key, &raw, ttl).await)?;
        self.stats.sets.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Backend key under which the envelope for `key` is stored.
    pub fn prefix_key(&self, key: &str) -> String {
        match self.config.key_prefix {
            Some(ref p) => format!("{}{}", p, key),
            None => key.to_string(),
        }
    }

    fn miss(&self) -> Option<String> {
        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn tracked(&self, result: Result<()>) -> Result<()> {
        if result.is_err() {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }
}
