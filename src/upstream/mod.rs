//! 上游接口：生成请求的抽象边界与 Gemini HTTP 实现。
//!
//! # Upstream Module
//!
//! The queue only ever talks to an [`Upstream`]: given a credential, a
//! [`GenerationRequest`] and a per-call timeout it either returns the reply
//! text or an [`Error`](crate::Error) the retry policy can classify.
//! [`GeminiUpstream`] is the production implementation over `reqwest`;
//! tests substitute scripted fakes.

mod gemini;

pub use gemini::GeminiUpstream;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Result;

/// Network-level failure below the HTTP status layer.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

/// The semantic inputs of one generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    pub model: String,
    pub system_prompt: String,
    pub temperature: f64,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            system_prompt: String::new(),
            temperature: 0.7,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
pub trait Upstream: Send + Sync {
    /// Produce the reply text for `request`.
    ///
    /// An empty reply is an error, never `Ok("")`.
    async fn generate(
        &self,
        api_key: &str,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<String>;

    /// Whether `api_key` is accepted by the models-listing endpoint.
    async fn validate_credential(&self, api_key: &str, timeout: Duration) -> Result<bool>;

    fn name(&self) -> &'static str;
}
