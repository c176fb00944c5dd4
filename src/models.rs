use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub const PROMPT_MIN_CHARS: usize = 5;
pub const PROMPT_MAX_CHARS: usize = 1000;
pub const TTS_MAX_CHARS: usize = 2000;
pub const MAX_SPEAKERS: usize = 4;
pub const NAME_MAX_CHARS: usize = 50;
pub const LANGUAGE_MAX_CHARS: usize = 50;
pub const MAX_TARGET_MINUTES: u32 = 30;

/// Prebuilt voices accepted by the speech model.
pub const VOICES: [&str; 30] = [
    "Zephyr",
    "Puck",
    "Charon",
    "Kore",
    "Fenrir",
    "Leda",
    "Orus",
    "Aoede",
    "Callirrhoe",
    "Autonoe",
    "Enceladus",
    "Iapetus",
    "Umbriel",
    "Algieba",
    "Despina",
    "Erinome",
    "Algenib",
    "Rasalgethi",
    "Laomedeia",
    "Achernar",
    "Alnilam",
    "Schedar",
    "Gacrux",
    "Pulcherrima",
    "Achird",
    "Zubenelgenubi",
    "Vindemiatrix",
    "Sadachbia",
    "Sadaltager",
    "Sulafat",
];

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct Speaker {
    pub name: String,
}

// POST /api/generate-script
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ScriptRequest {
    pub prompt: String,
    pub language: String,
    pub speakers: Vec<Speaker>,
    pub target_minutes: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct ScriptResponse {
    pub script: String,
}

// POST /api/tts
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct TtsRequest {
    pub text: String,
    pub voice: String,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TtsResponse {
    /// Base64 encoded audio, untouched from upstream.
    pub audio: String,
    pub mime_type: String,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl ScriptRequest {
    /// Trims the free-text fields in place and checks every bound.
    pub fn validate(mut self) -> Result<Self, ApiError> {
        self.prompt = self.prompt.trim().to_string();
        let len = char_len(&self.prompt);
        if !(PROMPT_MIN_CHARS..=PROMPT_MAX_CHARS).contains(&len) {
            return Err(ApiError::bad_request(format!(
                "Prompt must be between {PROMPT_MIN_CHARS} and {PROMPT_MAX_CHARS} characters"
            )));
        }

        self.language = self.language.trim().to_string();
        if self.language.is_empty() || char_len(&self.language) > LANGUAGE_MAX_CHARS {
            return Err(ApiError::bad_request(format!(
                "Language must be between 1 and {LANGUAGE_MAX_CHARS} characters"
            )));
        }

        if self.speakers.is_empty() || self.speakers.len() > MAX_SPEAKERS {
            return Err(ApiError::bad_request(format!(
                "Between 1 and {MAX_SPEAKERS} speakers are required"
            )));
        }
        for speaker in &mut self.speakers {
            speaker.name = speaker.name.trim().to_string();
            if speaker.name.is_empty() || char_len(&speaker.name) > NAME_MAX_CHARS {
                return Err(ApiError::bad_request(format!(
                    "Speaker names must be between 1 and {NAME_MAX_CHARS} characters"
                )));
            }
        }
        for (i, speaker) in self.speakers.iter().enumerate() {
            let duplicate = self.speakers[..i]
                .iter()
                .any(|other| other.name.to_lowercase() == speaker.name.to_lowercase());
            if duplicate {
                return Err(ApiError::bad_request("Speaker names must be unique"));
            }
        }

        if !(1..=MAX_TARGET_MINUTES).contains(&self.target_minutes) {
            return Err(ApiError::bad_request(format!(
                "Target minutes must be between 1 and {MAX_TARGET_MINUTES}"
            )));
        }

        Ok(self)
    }
}

impl TtsRequest {
    pub fn validate(self) -> Result<Self, ApiError> {
        if self.text.trim().is_empty() {
            return Err(ApiError::bad_request("Text is required"));
        }
        if char_len(&self.text) > TTS_MAX_CHARS {
            return Err(ApiError::bad_request(format!(
                "Text must be at most {TTS_MAX_CHARS} characters"
            )));
        }
        if !VOICES.contains(&self.voice.as_str()) {
            return Err(ApiError::bad_request(format!("Invalid voice: {}", self.voice)));
        }
        Ok(self)
    }
}
