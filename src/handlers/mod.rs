mod health;
mod metrics;
mod script;
mod tts;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use script::generate_script_handler;
pub use tts::tts_handler;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;

use crate::error::ApiError;

// Malformed or incomplete bodies are validation errors, not axum's 422
pub(crate) fn invalid_body(rejection: JsonRejection) -> ApiError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge;
    }
    ApiError::bad_request(format!("Invalid request body: {}", rejection.body_text()))
}

// Label for the upstream error counter
pub(crate) fn error_kind(err: &ApiError) -> &'static str {
    match err {
        ApiError::QuotaExhausted(_) => "quota",
        _ => "failure",
    }
}
