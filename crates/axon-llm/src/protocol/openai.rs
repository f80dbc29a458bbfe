//! `OpenAI` and OpenAI-compatible wire format types

use serde::{Deserialize, Serialize};

use crate::types::{Delta, Message, Usage};

// -- Chat responses --

/// Chat completion response or streamed chunk
///
/// Compatible vendors omit fields freely, so everything defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<OpenAiChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub system_fingerprint: Option<String>,
}

/// Choice within a response (`message`) or chunk (`delta`)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OpenAiChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub delta: Option<Delta>,
    /// Raw finish reason; vendors invent their own values
    #[serde(default)]
    pub finish_reason: Option<String>,
}

// -- Images --

/// Compatible-vendor text-to-image request
#[derive(Debug, Clone, Serialize)]
pub struct CompatibleImageRequest<'a> {
    pub prompt: &'a str,
    pub width: u32,
    pub height: u32,
    /// Hyperbolic selects the model in the body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<&'a str>,
}

/// Compatible-vendor text-to-image response
#[derive(Debug, Clone, Deserialize)]
pub struct CompatibleImageResponse {
    #[serde(default)]
    pub images: Vec<CompatibleImage>,
}

/// One generated image, inline or by reference
#[derive(Debug, Clone, Deserialize)]
pub struct CompatibleImage {
    /// Base64 image data
    #[serde(default)]
    pub image: Option<String>,
    /// Hosted image URL
    #[serde(default)]
    pub url: Option<String>,
}

// -- Speech --

/// Compatible-vendor text-to-speech request
#[derive(Debug, Clone, Serialize)]
pub struct CompatibleSpeechRequest<'a> {
    pub text: &'a str,
    pub speed: f32,
}

/// Compatible-vendor text-to-speech response
#[derive(Debug, Clone, Deserialize)]
pub struct CompatibleSpeechResponse {
    /// Base64 audio data
    pub audio: String,
}

// -- Error response --

/// `OpenAI` error response body
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiErrorResponse {
    /// Error details
    pub error: OpenAiErrorDetail,
}

/// `OpenAI` error detail
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiErrorDetail {
    /// Error message
    #[serde(default)]
    pub message: String,
    /// Error type
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    /// Parameter that caused the error
    #[serde(default)]
    pub param: Option<String>,
    /// Error code, a string for `OpenAI` and sometimes a number elsewhere
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}
