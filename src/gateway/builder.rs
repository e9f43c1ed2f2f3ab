use std::sync::Arc;

use tracing::info;

use super::SheetsGateway;
use crate::cache::{CacheBackend, MemoryCache, ResponseCache};
use crate::config::GatewayConfig;
use crate::fingerprint::FingerprintGenerator;
use crate::queue::RequestQueue;
use crate::state::StateContext;
use crate::telemetry::FailureLog;
use crate::store::{DurableStore, MemoryStore};
use crate::upstream::{GeminiUpstream, Upstream};
use crate::Result;

/// Builder for [`SheetsGateway`].
///
/// Every collaborator is optional: the defaults are an in-memory store, an
/// in-memory cache and the HTTPS upstream at `config.base_url`.
pub struct SheetsGatewayBuilder {
    config: GatewayConfig,
    store: Option<Arc<dyn DurableStore>>,
    cache_backend: Option<Arc<dyn CacheBackend>>,
    upstream: Option<Arc<dyn Upstream>>,
    fingerprints: FingerprintGenerator,
}

impl SheetsGatewayBuilder {
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            store: None,
            cache_backend: None,
            upstream: None,
            fingerprints: FingerprintGenerator::new(),
        }
    }

    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.cache_backend = Some(backend);
        self
    }

    pub fn upstream(mut self, upstream: Arc<dyn Upstream>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    pub fn fingerprint_generator(mut self, generator: FingerprintGenerator) -> Self {
        self.fingerprints = generator;
        self
    }

    pub async fn build(self) -> Result<SheetsGateway> {
        let config = self.config;
        config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let backend = self
            .cache_backend
            .unwrap_or_else(|| Arc::new(MemoryCache::default()));
        let upstream: Arc<dyn Upstream> = match self.upstream {
            Some(u) => u,
            None => Arc::new(GeminiUpstream::new(config.base_url.clone())?),
        };

        let state = Arc::new(StateContext::load(store.clone(), &config).await?);
        let cache = Arc::new(ResponseCache::new(config.cache.clone(), backend));
        let queue = RequestQueue::new(
            state.clone(),
            cache.clone(),
            upstream.clone(),
            config.tiers.clone(),
            config.retry.clone(),
        );

        info!(
            store = store.name(),
            cache = cache.backend_name(),
            upstream = upstream.name(),
            "gateway ready"
        );

        Ok(SheetsGateway {
            config,
            state,
            cache,
            upstream,
            queue,
            fingerprints: self.fingerprints,
            failures: FailureLog::default(),
        })
    }
}

impl Default for SheetsGatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
