use serde::{Deserialize, Serialize};

/// Image generation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRequest {
    /// Model identifier
    #[serde(default)]
    pub model: String,
    /// Text description of the desired image
    pub prompt: String,
    /// Number of images to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,
    /// Image dimensions (e.g. "1024x1024")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    /// Quality level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<String>,
    /// Style preset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// "url" or "`b64_json`"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_format: Option<String>,
    /// End-user identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl ImageRequest {
    /// Requested image count, at least one
    pub fn count(&self) -> u32 {
        self.n.unwrap_or(1).max(1)
    }
}

/// Image generation response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageResponse {
    /// Unix timestamp of creation
    pub created: i64,
    /// Generated images
    pub data: Vec<ImageData>,
    /// Milliseconds spent generating
    #[serde(default)]
    pub total_time: u64,
}

/// A single generated image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    /// URL of the generated image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Base64-encoded image data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    /// Revised prompt used for generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}
