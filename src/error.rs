//! Typed error kinds (spec.md §7). Fragment-level failures are locally
//! recovered by the builders; only these propagate to the HTTP boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("upstream error (retryable): {0}")]
    UpstreamRetryable(String),

    #[error("upstream error (fatal): {0}")]
    UpstreamFatal(String),

    #[error("cached result unavailable")]
    CacheMiss,

    #[error("llm produced an invalid output: {0}")]
    LlmInvalid(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AppError {
    /// spec.md §4.4: classify an upstream failure as retryable.
    pub fn classify_upstream(status: Option<u16>, message: &str) -> Self {
        let retryable_status = matches!(status, Some(408) | Some(429)) || status.map(|s| s >= 500).unwrap_or(false);
        let lower = message.to_ascii_lowercase();
        let retryable_message = lower.contains("timeout")
            || lower.contains("socket hang up")
            || lower.contains("temporarily unavailable")
            || lower.contains("connection reset")
            || lower.contains("host unreachable")
            || lower.contains("dns");
        if retryable_status || retryable_message {
            AppError::UpstreamRetryable(message.to_string())
        } else {
            AppError::UpstreamFatal(message.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::CacheMiss => (StatusCode::CONFLICT, "cached result unavailable".to_string()),
            AppError::LlmInvalid(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::UpstreamRetryable(msg) | AppError::UpstreamFatal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            AppError::Storage(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_5xx_as_retryable() {
        matches!(AppError::classify_upstream(Some(503), "server error"), AppError::UpstreamRetryable(_));
    }

    #[test]
    fn classifies_404_as_fatal() {
        let err = AppError::classify_upstream(Some(404), "not found");
        assert!(matches!(err, AppError::UpstreamFatal(_)));
    }

    #[test]
    fn classifies_timeout_message_as_retryable() {
        let err = AppError::classify_upstream(None, "request timeout after 10s");
        assert!(matches!(err, AppError::UpstreamRetryable(_)));
    }
}
