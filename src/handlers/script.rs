use axum::{Json, extract::State, extract::rejection::JsonRejection};
use std::sync::Arc;
use std::time::Instant;

use crate::error::ApiError;
use crate::metrics::{REQUEST_TOTAL, UPSTREAM_ERRORS, UPSTREAM_LATENCY};
use crate::models::{ScriptRequest, ScriptResponse};
use crate::prompt::script_prompt;
use crate::state::AppState;

const ENDPOINT: &str = "generate-script";

pub async fn generate_script_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScriptRequest>, JsonRejection>,
) -> Result<Json<ScriptResponse>, ApiError> {
    REQUEST_TOTAL.with_label_values(&[ENDPOINT]).inc();

    let Json(payload) = payload.map_err(super::invalid_body)?;
    let req = payload.validate()?;

    tracing::info!(
        prompt_chars = req.prompt.chars().count(),
        speakers = req.speakers.len(),
        target_minutes = req.target_minutes,
        "script request"
    );

    let start_time = Instant::now();
    let result = state.gemini.generate_script(&script_prompt(&req)).await;
    UPSTREAM_LATENCY
        .with_label_values(&[ENDPOINT])
        .observe(start_time.elapsed().as_secs_f64());

    let script = result.map_err(|e| {
        let err = ApiError::upstream("Failed to generate script", e);
        UPSTREAM_ERRORS
            .with_label_values(&[ENDPOINT, super::error_kind(&err)])
            .inc();
        err
    })?;

    Ok(Json(ScriptResponse { script }))
}
