use super::DurableStore;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value, e.g. a snapshot written by an older release.
    pub fn with_value(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.write().unwrap().insert(key.into(), value.into());
        self
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.read().unwrap().get(key).cloned())
    }
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.values.write().unwrap().remove(key).is_some())
    }
    fn name(&self) -> &'static str {
        "memory"
    }
}
