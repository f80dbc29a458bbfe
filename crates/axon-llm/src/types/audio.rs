use serde::{Deserialize, Serialize};

/// Text-to-speech request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeechRequest {
    /// Model identifier
    #[serde(default)]
    pub model: String,
    /// Text to synthesize
    pub input: String,
    /// Voice preset
    #[serde(default)]
    pub voice: String,
    /// Audio container (e.g. "mp3", "wav")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    /// Playback speed multiplier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
}

/// Synthesized audio
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeechResponse {
    /// Raw audio bytes
    pub audio: Vec<u8>,
    /// MIME type of `audio`
    pub content_type: String,
}

/// Speech-to-text request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptionRequest {
    pub model: String,
    pub file_name: String,
    pub audio: Vec<u8>,
    pub language: Option<String>,
    pub prompt: Option<String>,
}

/// Speech-to-text result
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub text: String,
}
