//! Thin client over the Gemini `generateContent` REST endpoint.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("upstream response contained no {0}")]
    Empty(&'static str),
}

impl UpstreamError {
    /// Quota exhaustion is recognised by status 429 or by the error text.
    pub fn is_quota_exhausted(&self) -> bool {
        if let UpstreamError::Status { status: 429, .. } = self {
            return true;
        }
        let text = self.to_string().to_lowercase();
        text.contains("quota") || text.contains("resource_exhausted") || text.contains("rate limit")
    }
}

// generateContent request body
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    response_modalities: [&'static str; 1],
    speech_config: SpeechConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig<'a> {
    voice_config: VoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig<'a> {
    prebuilt_voice_config: PrebuiltVoiceConfig<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig<'a> {
    voice_name: &'a str,
}

// generateContent response body, only the fields we read
#[derive(Deserialize, Default)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Synthesized speech exactly as the API returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audio {
    /// Base64 encoded samples.
    pub data: String,
    pub mime_type: String,
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    script_model: String,
    tts_model: String,
}

impl GeminiClient {
    pub fn new(
        base_url: String,
        api_key: String,
        script_model: String,
        tts_model: String,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            script_model,
            tts_model,
        })
    }

    pub async fn generate_script(&self, prompt: &str) -> Result<String, UpstreamError> {
        let body = GenerateContentRequest {
            contents: [Content {
                parts: [TextPart { text: prompt }],
            }],
            generation_config: None,
        };
        let response = self.generate_content(&self.script_model, &body).await?;

        let text: String = first_parts(response)
            .into_iter()
            .filter_map(|part| part.text)
            .collect();
        let text = text.trim();
        if text.is_empty() {
            return Err(UpstreamError::Empty("text"));
        }
        Ok(text.to_string())
    }

    pub async fn synthesize(&self, text: &str, voice: &str) -> Result<Audio, UpstreamError> {
        let body = GenerateContentRequest {
            contents: [Content {
                parts: [TextPart { text }],
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: ["AUDIO"],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig { voice_name: voice },
                    },
                },
            }),
        };
        let response = self.generate_content(&self.tts_model, &body).await?;

        first_parts(response)
            .into_iter()
            .find_map(|part| part.inline_data)
            .filter(|inline| !inline.data.is_empty())
            .map(|inline| Audio {
                data: inline.data,
                mime_type: inline.mime_type,
            })
            .ok_or(UpstreamError::Empty("audio"))
    }

    async fn generate_content(
        &self,
        model: &str,
        body: &GenerateContentRequest<'_>,
    ) -> Result<GenerateContentResponse, UpstreamError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        tracing::debug!(%model, "calling upstream");

        let res = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let raw = res.text().await.unwrap_or_else(|e| e.to_string());
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                message: error_message(&raw),
            });
        }

        Ok(res.json::<GenerateContentResponse>().await?)
    }
}

fn first_parts(response: GenerateContentResponse) -> Vec<ResponsePart> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default()
}

// Prefer the structured upstream message, keep the raw body otherwise
fn error_message(raw: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(raw) {
        Ok(envelope) => match envelope.error.status {
            Some(status) => format!("{} ({})", envelope.error.message, status),
            None => envelope.error.message,
        },
        Err(_) => raw.to_string(),
    }
}
