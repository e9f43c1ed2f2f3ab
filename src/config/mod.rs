//! 运行时配置：上游地址、分级限流、重试、缓存与状态存储参数。
//!
//! # Configuration
//!
//! [`GatewayConfig`] gathers every tunable of the runtime. All fields have
//! defaults, so a YAML file only needs the keys it changes:
//!
//! ```yaml
//! default_model: models/gemini-1.5-pro
//! tiers:
//!   free:
//!     requests_per_minute: 10
//!     timeout: 30000
//!     batch_interval: 60000
//! retry:
//!   max_attempts: 5
//! ```
//!
//! Environment variables prefixed with `GEMINI_SHEETS_` override file values.

mod tier;

pub use tier::{Tier, TierProfile, TierProfiles};

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::CacheConfig;
use crate::models::DEFAULT_MODEL;
use crate::resilience::RetryPolicy;
use crate::{Error, ErrorContext, Result};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1";
pub const DEFAULT_STATE_KEY: &str = "geminiState";
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub default_model: String,
    pub tiers: TierProfiles,
    pub retry: RetryPolicy,
    pub cache: CacheConfig,
    /// Durable store key holding the serialized state snapshot.
    pub state_key: String,
    /// Maximum number of history entries kept in the snapshot.
    pub history_limit: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            tiers: TierProfiles::default(),
            retry: RetryPolicy::default(),
            cache: CacheConfig::default(),
            state_key: DEFAULT_STATE_KEY.to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: GatewayConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read config file: {}", e),
                ErrorContext::new()
                    .with_details(path.display().to_string())
                    .with_source("config_loader"),
            )
        })?;
        Self::from_yaml_str(&content)
    }

    /// Apply `GEMINI_SHEETS_*` overrides. Unparseable values are ignored.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(url) = env::var("GEMINI_SHEETS_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(model) = env::var("GEMINI_SHEETS_DEFAULT_MODEL") {
            self.default_model = model;
        }
        if let Some(n) = env_parse::<u32>("GEMINI_SHEETS_MAX_ATTEMPTS") {
            self.retry.max_attempts = n;
        }
        if let Some(ms) = env_parse::<u64>("GEMINI_SHEETS_BASE_DELAY_MS") {
            self.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(secs) = env_parse::<u64>("GEMINI_SHEETS_CACHE_TTL_SECS") {
            self.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(ms) = env_parse::<u64>("GEMINI_SHEETS_BATCH_INTERVAL_MS") {
            for tier in [Tier::Free, Tier::Paid] {
                self.tiers.profile_mut(tier).batch_interval = Duration::from_millis(ms);
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid base URL: {}", e),
                ErrorContext::new()
                    .with_field_path("base_url")
                    .with_source("config_validator"),
            )
        })?;
        for tier in [Tier::Free, Tier::Paid] {
            if self.tiers.profile(tier).requests_per_minute == 0 {
                return Err(invalid(
                    "requests_per_minute must be at least 1",
                    format!("tiers.{}.requests_per_minute", tier.as_str().to_lowercase()),
                ));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("max_attempts must be at least 1", "retry.max_attempts"));
        }
        if self.cache.chunk_size == 0 {
            return Err(invalid("chunk_size must be at least 1", "cache.chunk_size"));
        }
        if self.history_limit == 0 {
            return Err(invalid("history_limit must be at least 1", "history_limit"));
        }
        Ok(())
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_tier_profile(mut self, tier: Tier, profile: TierProfile) -> Self {
        *self.tiers.profile_mut(tier) = profile;
        self
    }
}

fn invalid(message: &str, field: impl Into<String>) -> Error {
    Error::configuration_with_context(
        message,
        ErrorContext::new()
            .with_field_path(field)
            .with_source("config_validator"),
    )
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}

/// Serialize a `Duration` as whole milliseconds.
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Serialize a `Duration` as whole seconds.
pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_free_and_paid_profiles() {
        let config = GatewayConfig::default();
        assert_eq!(config.tiers.profile(Tier::Free).requests_per_minute, 15);
        assert_eq!(config.tiers.profile(Tier::Paid).requests_per_minute, 60);
        assert_eq!(config.tiers.profile(Tier::Paid).timeout, Duration::from_secs(60));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(config.cache.ttl, Duration::from_secs(21_600));
        assert_eq!(config.cache.chunk_size, 100_000);
        assert_eq!(config.state_key, "geminiState");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
default_model: models/gemini-1.5-pro
tiers:
  free:
    requests_per_minute: 5
    timeout: 1000
    batch_interval: 250
retry:
  max_attempts: 4
"#;
        let config = GatewayConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.default_model, "models/gemini-1.5-pro");
        assert_eq!(config.tiers.free.requests_per_minute, 5);
        assert_eq!(config.tiers.free.batch_interval, Duration::from_millis(250));
        assert_eq!(config.tiers.paid, TierProfile::paid());
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_validation_rejects_zero_batch() {
        let yaml = r#"
tiers:
  paid:
    requests_per_minute: 0
    timeout: 1000
    batch_interval: 1000
"#;
        let err = GatewayConfig::from_yaml_str(yaml).unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("tiers.paid.requests_per_minute")
        );
    }

    #[test]
    fn test_validation_rejects_bad_url() {
        let config = GatewayConfig::default().with_base_url("not a url");
        assert!(matches!(config.validate(), Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let err = GatewayConfig::from_yaml_file("/nonexistent/gemini-sheets.yaml").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }
}
