//! API error handling

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::gemini::UpstreamError;
use crate::rate_limit::{RateLimited, retry_after_header};

pub const QUOTA_MESSAGE: &str = "API quota exceeded. Please try again later.";

/// Every way a request can fail. The body is always `{"error": message}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{}", .0.message)]
    RateLimited(RateLimited),

    #[error("upstream quota exhausted: {0}")]
    QuotaExhausted(UpstreamError),

    #[error("{context}: {source}")]
    Upstream {
        context: &'static str,
        source: UpstreamError,
    },

    #[error("not found")]
    NotFound,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }

    /// Classify a failed upstream call; `context` is the message the client sees.
    pub fn upstream(context: &'static str, err: UpstreamError) -> Self {
        if err.is_quota_exhausted() {
            ApiError::QuotaExhausted(err)
        } else {
            ApiError::Upstream {
                context,
                source: err,
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited(_) | ApiError::QuotaExhausted(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upstream { .. } | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// What the client is told; upstream and internal detail stays in the logs.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Validation(msg) => msg.clone(),
            ApiError::RateLimited(limited) => limited.message.to_string(),
            ApiError::QuotaExhausted(_) => QUOTA_MESSAGE.to_string(),
            ApiError::Upstream { context, .. } => context.to_string(),
            ApiError::NotFound => "Not found".to_string(),
            ApiError::MethodNotAllowed => "Method not allowed".to_string(),
            ApiError::PayloadTooLarge => "Request body too large".to_string(),
            ApiError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl From<RateLimited> for ApiError {
    fn from(limited: RateLimited) -> Self {
        ApiError::RateLimited(limited)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Validation(msg) => tracing::info!("Rejected request: {}", msg),
            ApiError::PayloadTooLarge => tracing::info!("Rejected oversized request body"),
            ApiError::QuotaExhausted(err) => tracing::warn!("Upstream quota exhausted: {}", err),
            ApiError::Upstream { .. } | ApiError::Internal(_) => tracing::error!("{}", self),
            // limiter middleware logs rejections with the client key
            ApiError::RateLimited(_) => {}
            ApiError::NotFound | ApiError::MethodNotAllowed => {}
        }

        let status = self.status();
        let body = Json(json!({ "error": self.public_message() }));

        match self {
            ApiError::RateLimited(limited) => {
                (status, [retry_after_header(limited.retry_after)], body).into_response()
            }
            _ => (status, body).into_response(),
        }
    }
}
