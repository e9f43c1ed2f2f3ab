//! 入口模块：面向表格公式的同步可重入调用面。
//!
//! # Entry Point
//!
//! [`SheetsGateway::submit_prompt`] is called on every recalculation of a
//! formula. Each call is a pure state lookup that never waits on the
//! upstream:
//!
//! 1. reject an empty prompt, require a credential;
//! 2. fingerprint the resolved request;
//! 3. answer from the processing table if a record exists;
//! 4. otherwise answer from the response cache;
//! 5. otherwise enqueue and return a provisional loading string.
//!
//! Every failure is returned as a string, never as an error.

mod builder;

pub use builder::SheetsGatewayBuilder;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::cache::{CacheStats, ResponseCache};
use crate::config::{GatewayConfig, Tier};
use crate::error_code::StandardErrorCode;
use crate::fingerprint::{Fingerprint, FingerprintGenerator};
use crate::models::{migrate_model, visible_models, ModelOption};
use crate::queue::{BatchSummary, Enqueued, RequestQueue};
use crate::state::{
    now_millis, ProcessingRecord, ProcessingStatus, StateContext, Stats, StatusChange,
};
use crate::telemetry::{FailureLog, FailureRecord};
use crate::upstream::{GenerationRequest, Upstream};
use crate::{Error, ErrorContext, Result};

pub const DEFAULT_TEMPERATURE: f64 = 0.7;

const PROMPT_REQUIRED: &str = "⚠️ Error: Prompt is required";
const API_KEY_MISSING: &str =
    "⚠️ API key not set. Please use the Gemini menu to configure your API key.";
const NO_RESPONSE: &str = "❌ Error: No response found";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub api_key_set: bool,
    pub experimental: bool,
    pub show_legacy: bool,
    pub default_model: String,
    pub available_models: Vec<ModelOption>,
}

/// Partial settings change; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub experimental: Option<bool>,
    pub show_legacy: Option<bool>,
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct SheetsGateway {
    config: GatewayConfig,
    state: Arc<StateContext>,
    cache: Arc<ResponseCache>,
    upstream: Arc<dyn Upstream>,
    queue: RequestQueue,
    fingerprints: FingerprintGenerator,
    failures: FailureLog,
}

impl SheetsGateway {
    pub fn builder() -> SheetsGatewayBuilder {
        SheetsGatewayBuilder::new()
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Answer one formula evaluation.
    ///
    /// `model`, `system_prompt` and `temperature` fall back to the default
    /// model, `""` and `0.7`.
    pub async fn submit_prompt(
        &self,
        prompt: &str,
        model: Option<&str>,
        system_prompt: Option<&str>,
        temperature: Option<f64>,
    ) -> String {
        if prompt.trim().is_empty() {
            return PROMPT_REQUIRED.to_string();
        }
        match self
            .lookup_or_enqueue(prompt, model, system_prompt, temperature)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                self.failures.record(&e, "submit_prompt", Some(prompt));
                format!("❌ Error: {}", e.user_message())
            }
        }
    }

    async fn lookup_or_enqueue(
        &self,
        prompt: &str,
        model: Option<&str>,
        system_prompt: Option<&str>,
        temperature: Option<f64>,
    ) -> Result<String> {
        if self.state.api_key().await.is_none() {
            return Ok(API_KEY_MISSING.to_string());
        }

        let fallback = migrate_model(
            Some(&self.state.default_model().await),
            &self.config.default_model,
        );
        let request = GenerationRequest::new(prompt, migrate_model(model, &fallback))
            .with_system_prompt(system_prompt.unwrap_or_default())
            .with_temperature(temperature.unwrap_or(DEFAULT_TEMPERATURE));
        let id = self.fingerprint(&request);

        if let Some(record) = self.state.processing().get(&id) {
            return Ok(answer_from_record(record));
        }

        if let Some(hit) = self.cache.get(id.as_str()).await? {
            debug!(fingerprint = %id, "answered from cache");
            return Ok(hit);
        }

        match self.queue.add(id.clone(), request) {
            Enqueued::Queued { position } => {
                let tier = self.state.tier().await;
                let eta = self.queue.estimated_wait_secs(tier, position);
                Ok(format!("⏳ Loading... (#{} in queue, ~{}s)", position, eta))
            }
            // lost a race with an identical submission
            Enqueued::AlreadyTracked => match self.state.processing().get(&id) {
                Some(record) => Ok(answer_from_record(record)),
                None => Err(Error::internal_with_context(
                    "request vanished while being enqueued",
                    ErrorContext::new()
                        .with_details(id.to_string())
                        .with_source("gateway"),
                )),
            },
        }
    }

    pub fn fingerprint(&self, request: &GenerationRequest) -> Fingerprint {
        self.fingerprints.generate(
            &request.prompt,
            &request.model,
            &request.system_prompt,
            request.temperature,
        )
    }

    pub async fn get_stats(&self) -> Stats {
        self.state.stats().await
    }

    /// Store a credential without checking it.
    pub async fn set_credential(&self, key: &str) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        let stored = self
            .state
            .update(|s| {
                s.api_key = Some(key.to_string());
                s.api_key_set = true;
                s.last_key_validation = Some(now_millis());
            })
            .await;
        match stored {
            Ok(()) => {
                info!("API key stored");
                true
            }
            Err(e) => {
                self.failures.record(&e, "set_credential", None);
                false
            }
        }
    }

    /// Check a credential against the models listing.
    ///
    /// Acceptance currently upgrades the tier to PAID. Nothing in the
    /// listing response distinguishes tiers, so this is a placeholder rule.
    pub async fn validate_credential(&self, key: &str) -> bool {
        let key = key.trim();
        if key.is_empty() {
            return false;
        }
        match self.check_credential(key).await {
            Ok(true) => {
                let saved = self
                    .state
                    .update(|s| {
                        s.tier = Tier::Paid;
                        s.last_key_validation = Some(now_millis());
                    })
                    .await;
                if let Err(e) = saved {
                    self.failures.record(&e, "validate_credential", None);
                }
                true
            }
            Ok(false) => false,
            Err(e) => {
                self.failures.record(&e, "validate_credential", None);
                false
            }
        }
    }

    async fn check_credential(&self, key: &str) -> Result<bool> {
        let timeout = self.queue.profile(self.state.tier().await).timeout;
        self.upstream.validate_credential(key, timeout).await
    }

    /// Store a credential and keep it only if the upstream accepts it.
    pub async fn setup_credential(&self, key: &str) -> SetupOutcome {
        match self.try_setup(key.trim()).await {
            Ok(()) => SetupOutcome {
                success: true,
                error: None,
            },
            Err(e) => {
                self.failures.record(&e, "setup_credential", None);
                let cleared = self
                    .state
                    .update(|s| {
                        s.api_key = None;
                        s.api_key_set = false;
                    })
                    .await;
                if let Err(save_err) = cleared {
                    self.failures.record(&save_err, "setup_credential", None);
                }
                SetupOutcome {
                    success: false,
                    error: Some(e.user_message()),
                }
            }
        }
    }

    async fn try_setup(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(Error::validation_with_context(
                "API key is required",
                ErrorContext::new()
                    .with_field_path("apiKey")
                    .with_source("gateway"),
            ));
        }
        self.state
            .update(|s| {
                s.api_key = Some(key.to_string());
                s.api_key_set = true;
                s.last_key_validation = Some(now_millis());
            })
            .await?;
        if self.check_credential(key).await? {
            Ok(())
        } else {
            Err(Error::upstream_code(
                StandardErrorCode::Authentication,
                "Invalid API key",
            ))
        }
    }

    pub async fn get_settings(&self) -> Settings {
        let snapshot = self.state.snapshot().await;
        Settings {
            api_key_set: snapshot.api_key().is_some(),
            experimental: snapshot.experimental,
            show_legacy: snapshot.show_legacy,
            default_model: snapshot.default_model.clone(),
            available_models: visible_models(snapshot.experimental, snapshot.show_legacy),
        }
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> bool {
        let fallback = self.config.default_model.clone();
        let saved = self
            .state
            .update(|s| {
                if let Some(experimental) = update.experimental {
                    s.experimental = experimental;
                }
                if let Some(show_legacy) = update.show_legacy {
                    s.show_legacy = show_legacy;
                }
                if let Some(ref model) = update.default_model {
                    s.default_model = migrate_model(Some(model), &fallback);
                }
            })
            .await;
        match saved {
            Ok(()) => true,
            Err(e) => {
                self.failures.record(&e, "update_settings", None);
                false
            }
        }
    }

    /// Forget the credential, settings, history and every tracked request.
    ///
    /// A batch that is already running still finishes its upstream calls,
    /// but its results are discarded.
    pub async fn reset_all(&self) -> bool {
        self.queue.clear_pending();
        match self.state.reset().await {
            Ok(()) => {
                info!("state reset to defaults");
                true
            }
            Err(e) => {
                self.failures.record(&e, "reset_all", None);
                false
            }
        }
    }

    pub fn processing_snapshot(&self) -> Vec<ProcessingRecord> {
        self.state.processing().snapshot()
    }

    /// Status changes of every processing record, as they happen.
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusChange> {
        self.state.processing().subscribe()
    }

    pub fn batch_history(&self) -> Vec<BatchSummary> {
        self.queue.batch_history()
    }

    pub async fn tier(&self) -> Tier {
        self.state.tier().await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Failures caught by this gateway, oldest first.
    pub fn recent_failures(&self) -> Vec<FailureRecord> {
        self.failures.recent()
    }

    /// Resolve once the background drain, if any, has finished.
    pub async fn wait_idle(&self) {
        self.queue.wait_idle().await
    }
}

fn answer_from_record(record: ProcessingRecord) -> String {
    match record.status {
        ProcessingStatus::Queued | ProcessingStatus::Processing => {
            format!("⏳ Request in progress... (Status: {})", record.status)
        }
        ProcessingStatus::Error => {
            format!("❌ Error: {}", record.error.unwrap_or_default())
        }
        ProcessingStatus::Complete => match record.response {
            Some(response) if !response.is_empty() => response,
            _ => {
                error!(fingerprint = %record.id, "complete record has no response");
                NO_RESPONSE.to_string()
            }
        },
    }
}
