use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Proxy;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{GenerationRequest, TransportError, Upstream};
use crate::error_code::StandardErrorCode;
use crate::{Error, Result};

const API_KEY_HEADER: &str = "x-goog-api-key";

/// `generateContent` over HTTPS.
pub struct GeminiUpstream {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiUpstream {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(
                env::var("GEMINI_SHEETS_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(16),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Ok(proxy_url) = env::var("GEMINI_SHEETS_PROXY_URL") {
            if let Ok(proxy) = Proxy::all(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn generate_url(&self, model: &str) -> String {
        format!("{}/{}:generateContent", self.base_url, model)
    }

    fn request_body(request: &GenerationRequest) -> Value {
        let mut body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }]
            }],
            "generationConfig": {
                "temperature": request.temperature
            }
        });
        if !request.system_prompt.is_empty() {
            body["system_instruction"] = json!({
                "parts": [{ "text": request.system_prompt }]
            });
        }
        body
    }

    fn reply_text(body: &Value) -> Result<String> {
        match body
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
        {
            Some(text) if !text.is_empty() => Ok(text.to_string()),
            _ => Err(Error::upstream_code(
                StandardErrorCode::MalformedResponse,
                "Empty response from API",
            )),
        }
    }
}

fn send_error(e: reqwest::Error, timeout: Duration) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("no response within {}ms", timeout.as_millis()))
    } else {
        Error::Transport(TransportError::Http(e))
    }
}

#[async_trait]
impl Upstream for GeminiUpstream {
    async fn generate(
        &self,
        api_key: &str,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<String> {
        let url = self.generate_url(&request.model);
        debug!(model = %request.model, "calling generateContent");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, api_key)
            .timeout(timeout)
            .json(&Self::request_body(request))
            .send()
            .await
            .map_err(|e| send_error(e, timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| send_error(e, timeout))?;

        if !status.is_success() {
            warn!(
                http_status = status.as_u16(),
                model = %request.model,
                "generateContent rejected"
            );
            return Err(Error::upstream(status.as_u16(), text));
        }

        let body: Value = serde_json::from_str(&text)?;
        Self::reply_text(&body)
    }

    async fn validate_credential(&self, api_key: &str, timeout: Duration) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header(API_KEY_HEADER, api_key)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| send_error(e, timeout))?;
        Ok(response.status().as_u16() == 200)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}
