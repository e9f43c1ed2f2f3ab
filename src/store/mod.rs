//! 持久化存储模块：跨执行上下文保存状态快照的键值存储。
//!
//! # Durable Store Module
//!
//! The durable store holds the single serialized state snapshot that must
//! outlive one execution context. It is a plain string key/value store with
//! last-writer-wins semantics; callers always rewrite whole values.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`DurableStore`] | Trait for persistent string storage |
//! | [`MemoryStore`] | In-process store for tests and ephemeral runs |
//! | [`FileStore`] | One file per key under a directory, atomically replaced |

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    fn name(&self) -> &'static str;
}
