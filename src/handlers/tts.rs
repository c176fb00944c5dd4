use axum::{Json, extract::State, extract::rejection::JsonRejection};
use std::sync::Arc;
use std::time::Instant;

use crate::error::ApiError;
use crate::metrics::{REQUEST_TOTAL, UPSTREAM_ERRORS, UPSTREAM_LATENCY};
use crate::models::{TtsRequest, TtsResponse};
use crate::state::AppState;

const ENDPOINT: &str = "tts";

pub async fn tts_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Json<TtsResponse>, ApiError> {
    REQUEST_TOTAL.with_label_values(&[ENDPOINT]).inc();

    let Json(payload) = payload.map_err(super::invalid_body)?;
    let req = payload.validate()?;

    tracing::info!(chars = req.text.chars().count(), voice = %req.voice, "TTS request");

    let start_time = Instant::now();
    let result = state.gemini.synthesize(&req.text, &req.voice).await;
    UPSTREAM_LATENCY
        .with_label_values(&[ENDPOINT])
        .observe(start_time.elapsed().as_secs_f64());

    let audio = result.map_err(|e| {
        let err = ApiError::upstream("Failed to generate audio", e);
        UPSTREAM_ERRORS
            .with_label_values(&[ENDPOINT, super::error_kind(&err)])
            .inc();
        err
    })?;

    Ok(Json(TtsResponse {
        audio: audio.data,
        mime_type: audio.mime_type,
    }))
}
