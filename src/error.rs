use crate::error_code::StandardErrorCode;
use crate::upstream::TransportError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "retry.max_attempts", "request.prompt")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "state_store", "config_loader")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for the gemini-sheets runtime.
///
/// Input errors (`Validation`, `Configuration`) are reported immediately and never retried.
/// `Upstream` and `Timeout` carry enough information for the retry policy to classify them.
/// `Internal` marks a consistency bug rather than an external failure.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Upstream error{}: {message}", format_status(.status, .code))]
    Upstream {
        status: Option<u16>,
        code: StandardErrorCode,
        message: String,
    },

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Store error: {message}{}", format_context(.context))]
    Store {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Internal error: {message}{}", format_context(.context))]
    Internal {
        message: String,
        context: ErrorContext,
    },
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn format_status(status: &Option<u16>, code: &StandardErrorCode) -> String {
    match status {
        Some(s) => format!(" HTTP {} ({})", s, code.name()),
        None => format!(" ({})", code.name()),
    }
}

impl Error {
    /// Build an upstream error from an HTTP status and response body.
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Error::Upstream {
            status: Some(status),
            code: StandardErrorCode::from_http_status(status),
            message: message.into(),
        }
    }

    /// Build an upstream error that has no HTTP status (e.g., a malformed reply).
    pub fn upstream_code(code: StandardErrorCode, message: impl Into<String>) -> Self {
        Error::Upstream {
            status: None,
            code,
            message: message.into(),
        }
    }

    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn store_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Store {
            message: msg.into(),
            context,
        }
    }

    pub fn internal_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Internal {
            message: msg.into(),
            context,
        }
    }

    /// HTTP status code attached to this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Upstream { status, .. } => *status,
            Error::Transport(TransportError::Http(e)) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Standard code for upstream-facing failures, if one applies.
    pub fn standard_code(&self) -> Option<StandardErrorCode> {
        match self {
            Error::Upstream { code, .. } => Some(*code),
            Error::Timeout(_) => Some(StandardErrorCode::Timeout),
            _ => self.status().map(StandardErrorCode::from_http_status),
        }
    }

    /// Whether a retry may succeed: a retryable standard code, or anything that reads as a timeout.
    pub fn is_retryable(&self) -> bool {
        if self.standard_code().is_some_and(|code| code.retryable()) {
            return true;
        }
        match self {
            Error::Transport(TransportError::Http(e)) if e.is_timeout() => true,
            other => other.to_string().to_lowercase().contains("timeout"),
        }
    }

    /// Message intended for a spreadsheet cell: the upstream body for upstream
    /// failures, the display string otherwise.
    pub fn user_message(&self) -> String {
        match self {
            Error::Upstream { message, .. } => message.clone(),
            Error::Validation { message, .. }
            | Error::Configuration { message, .. }
            | Error::Internal { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Store { context, .. }
            | Error::Internal { context, .. } => Some(context),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for status in [408u16, 429, 500, 502, 503, 504] {
            assert!(Error::upstream(status, "boom").is_retryable(), "{status}");
        }
        for status in [400u16, 401, 403, 404, 413] {
            assert!(!Error::upstream(status, "bad").is_retryable(), "{status}");
        }
    }

    #[test]
    fn test_standard_code_drives_retry() {
        let empty = Error::upstream_code(StandardErrorCode::MalformedResponse, "Empty response from API");
        assert_eq!(empty.standard_code(), Some(StandardErrorCode::MalformedResponse));
        assert!(!empty.is_retryable());

        let overloaded = Error::upstream_code(StandardErrorCode::Overloaded, "try later");
        assert!(overloaded.is_retryable());
        assert_eq!(
            Error::Timeout("slow".into()).standard_code(),
            Some(StandardErrorCode::Timeout)
        );
        assert_eq!(Error::Io(std::io::Error::other("disk")).standard_code(), None);
    }

    #[test]
    fn test_timeout_message_is_retryable() {
        assert!(Error::Timeout("30s elapsed".into()).is_retryable());
        let err = Error::internal_with_context("socket timeout while reading", ErrorContext::new());
        assert!(err.is_retryable());
    }

    #[test]
    fn test_display_with_context() {
        let err = Error::configuration_with_context(
            "chunk size must be positive",
            ErrorContext::new()
                .with_field_path("cache.chunk_size")
                .with_source("config_validator"),
        );
        assert_eq!(
            err.to_string(),
            "Configuration error: chunk size must be positive (field: cache.chunk_size, source: config_validator)"
        );
    }

    #[test]
    fn test_upstream_display_and_user_message() {
        let err = Error::upstream(429, "Resource has been exhausted");
        assert_eq!(
            err.to_string(),
            "Upstream error HTTP 429 (rate_limited): Resource has been exhausted"
        );
        assert_eq!(err.user_message(), "Resource has been exhausted");
    }
}
