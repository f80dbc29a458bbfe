//! iFlytek Spark WebSocket frame types

use serde::{Deserialize, Serialize};

use crate::types::{FunctionCall, FunctionDefinition, Usage};

// -- Request frame --

/// The single frame sent after the socket opens
#[derive(Debug, Clone, Serialize)]
pub struct SparkRequest<'a> {
    pub header: SparkRequestHeader<'a>,
    pub parameter: SparkParameter<'a>,
    pub payload: SparkPayload<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SparkRequestHeader<'a> {
    pub app_id: &'a str,
    /// Random end-user id
    pub uid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SparkParameter<'a> {
    pub chat: SparkChat<'a>,
}

/// Generation parameters
#[derive(Debug, Clone, Default, Serialize)]
pub struct SparkChat<'a> {
    /// Model domain inferred from the endpoint version
    pub domain: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    /// Conversation id used for vendor-side auditing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<&'a str>,
    /// Image width (image generation only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Image height (image generation only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SparkPayload<'a> {
    pub message: SparkMessages,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<SparkFunctions<'a>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SparkMessages {
    pub text: Vec<SparkMessage>,
}

/// Conversation turn; Spark only accepts plain text content
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SparkMessage {
    pub role: &'static str,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SparkFunctions<'a> {
    pub text: &'a [FunctionDefinition],
}

// -- Response frames --

/// One frame read from the socket (or the body of an image response)
#[derive(Debug, Clone, Deserialize)]
pub struct SparkResponse {
    pub header: SparkResponseHeader,
    #[serde(default)]
    pub payload: Option<SparkResponsePayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SparkResponseHeader {
    /// Zero on success, otherwise a vendor error code
    pub code: i64,
    #[serde(default)]
    pub message: String,
    /// Session id, reused as the response id
    #[serde(default)]
    pub sid: String,
    /// 0 first frame, 1 intermediate, 2 final
    #[serde(default)]
    pub status: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SparkResponsePayload {
    pub choices: SparkChoices,
    #[serde(default)]
    pub usage: Option<SparkUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SparkChoices {
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub seq: u32,
    #[serde(default)]
    pub text: Vec<SparkText>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SparkText {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub function_call: Option<FunctionCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SparkUsage {
    pub text: Usage,
}

/// Final frame marker in [`SparkResponseHeader::status`]
pub const STATUS_FINAL: i64 = 2;
