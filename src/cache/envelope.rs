//! Cache envelope: how a stored response is laid out in the backend.

use serde::{Deserialize, Serialize};

/// Descriptor stored under the response key.
///
/// `Single` holds the value inline. `Chunked` lists the chunk keys in
/// reassembly order; `length` is the number of chunks that must all be
/// present for the entry to count as a hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheEnvelope {
    Single { data: String },
    Chunked { keys: Vec<String>, length: usize },
}

impl CacheEnvelope {
    pub fn is_chunked(&self) -> bool {
        matches!(self, CacheEnvelope::Chunked { .. })
    }
}

/// Split `value` into pieces of at most `chunk_size` characters.
///
/// Boundaries always fall on `char` boundaries so every chunk is valid UTF-8.
pub(crate) fn split_chunks(value: &str, chunk_size: usize) -> Vec<&str> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in value.char_indices() {
        if count == chunk_size {
            chunks.push(&value[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < value.len() {
        chunks.push(&value[start..]);
    }
    chunks
}

pub(crate) fn chunk_key(base: &str, index: usize) -> String {
    format!("{}_{}", base, index)
}
