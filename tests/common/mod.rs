//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gemini_sheets::cache::{CacheBackend, MemoryCache};
use gemini_sheets::config::{GatewayConfig, Tier, TierProfile};
use gemini_sheets::resilience::RetryPolicy;
use gemini_sheets::store::{DurableStore, MemoryStore};
use gemini_sheets::{Error, GenerationRequest, SheetsGateway, Upstream};

/// One scripted upstream reaction.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    Status(u16, String),
    Timeout,
}

impl Reply {
    fn into_result(self) -> gemini_sheets::Result<String> {
        match self {
            Reply::Text(t) => Ok(t),
            Reply::Status(code, body) => Err(Error::upstream(code, body)),
            Reply::Timeout => Err(Error::Timeout("scripted timeout".into())),
        }
    }
}

/// Upstream fake: scripted replies per prompt, otherwise `"answer: <prompt>"`.
#[derive(Default)]
pub struct ScriptedUpstream {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<GenerationRequest>>,
    valid_keys: Mutex<Vec<String>>,
}

impl ScriptedUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, prompt: &str, replies: Vec<Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(prompt.to_string(), replies.into());
    }

    pub fn accept_key(&self, key: &str) {
        self.valid_keys.lock().unwrap().push(key.to_string());
    }

    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn generate(
        &self,
        _api_key: &str,
        request: &GenerationRequest,
        _timeout: Duration,
    ) -> gemini_sheets::Result<String> {
        self.calls.lock().unwrap().push(request.clone());
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.prompt)
            .and_then(|q| q.pop_front());
        match scripted {
            Some(reply) => reply.into_result(),
            None => Ok(format!("answer: {}", request.prompt)),
        }
    }

    async fn validate_credential(
        &self,
        api_key: &str,
        _timeout: Duration,
    ) -> gemini_sheets::Result<bool> {
        Ok(self.valid_keys.lock().unwrap().iter().any(|k| k == api_key))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Config with millisecond-scale delays.
pub fn fast_config(rpm: usize) -> GatewayConfig {
    let profile = TierProfile::free()
        .with_requests_per_minute(rpm)
        .with_batch_interval(Duration::from_millis(10));
    GatewayConfig::default()
        .with_tier_profile(Tier::Free, profile.clone())
        .with_tier_profile(Tier::Paid, profile)
        .with_retry(
            RetryPolicy::new()
                .with_base_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(4)),
        )
}

pub struct Harness {
    pub gateway: SheetsGateway,
    pub upstream: Arc<ScriptedUpstream>,
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
}

pub async fn harness(config: GatewayConfig) -> Harness {
    let upstream = ScriptedUpstream::new();
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new(1_000));
    let gateway = SheetsGateway::builder()
        .config(config)
        .store(store.clone() as Arc<dyn DurableStore>)
        .cache_backend(cache.clone() as Arc<dyn CacheBackend>)
        .upstream(upstream.clone() as Arc<dyn Upstream>)
        .build()
        .await
        .unwrap();
    Harness {
        gateway,
        upstream,
        store,
        cache,
    }
}

pub async fn harness_with_key(config: GatewayConfig) -> Harness {
    let h = harness(config).await;
    assert!(h.gateway.set_credential("test-key").await);
    h
}
