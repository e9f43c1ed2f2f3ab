//! 响应缓存模块：按请求指纹存储生成结果，超长结果自动分块。
//!
//! # Response Caching Module
//!
//! Completed generations are stored under their request fingerprint so that a
//! re-evaluated formula is answered without another upstream call.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`ResponseCache`] | Chunk-aware get/put with TTL and statistics |
//! | [`CacheConfig`] | TTL, chunk size and key prefix |
//! | [`CacheBackend`] | Trait for the external key/value cache service |
//! | [`MemoryCache`] | In-memory backend |
//! | [`NullCache`] | No-op backend for disabling caching |
//! | [`CacheEnvelope`] | Stored descriptor: inline (`single`) or split (`chunked`) |
//!
//! ## Example
//!
//! ```rust
//! use gemini_sheets::cache::{CacheConfig, MemoryCache, ResponseCache};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let cache = ResponseCache::new(
//!     CacheConfig::new().with_ttl(Duration::from_secs(3600)),
//!     Arc::new(MemoryCache::new(1000)),
//! );
//! assert_eq!(cache.backend_name(), "memory");
//! ```
//!
//! ## Chunking
//!
//! Values longer than `chunk_size` characters are written as numbered chunks
//! (`<key>_0`, `<key>_1`, ...) followed by a `chunked` envelope listing them.
//! Every key shares the same TTL.

mod backend;
mod envelope;
mod manager;

pub use backend::{CacheBackend, MemoryCache, NullCache};
pub use envelope::CacheEnvelope;
pub use manager::{CacheConfig, CacheStats, ResponseCache};
