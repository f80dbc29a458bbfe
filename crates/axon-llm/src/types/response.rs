use serde::{Deserialize, Serialize};

use super::message::{FunctionCall, Message, Role, ToolCall};

/// Object kind of a complete response
pub const OBJECT_COMPLETION: &str = "chat.completion";

/// Object kind of a streamed chunk
pub const OBJECT_CHUNK: &str = "chat.completion.chunk";

/// Prefix applied to response ids synthesized by non-OpenAI adapters
pub const COMPLETION_ID_PREFIX: &str = "chatcmpl-";

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Hit the `max_tokens` limit
    Length,
    /// Model called a legacy function
    FunctionCall,
    /// Model decided to call a tool
    ToolCalls,
    /// Content was filtered by safety systems
    ContentFilter,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    #[serde(default)]
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion)
    #[serde(default)]
    pub total_tokens: u32,
}

/// Incremental message content within a streamed choice
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// Role (first chunk only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Incremental text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Partial legacy function call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    /// Partial tool calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

/// A single completion choice
///
/// Complete responses carry `message`; streamed chunks carry `delta`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    /// Index of this choice
    pub index: u32,
    /// Generated message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    /// Incremental update
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<Delta>,
    /// Why generation stopped
    pub finish_reason: Option<FinishReason>,
}

impl Choice {
    /// Empty delta that closes a stream
    pub fn stop_delta(index: u32) -> Self {
        Self {
            index,
            message: None,
            delta: Some(Delta::default()),
            finish_reason: Some(FinishReason::Stop),
        }
    }
}

/// Elapsed milliseconds since the call began
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    /// Time until the upstream connection produced its first byte
    #[serde(default)]
    pub conn_time: u64,
    /// Time from first byte to this event
    #[serde(default)]
    pub duration: u64,
    /// Time from call start to this event
    #[serde(default)]
    pub total_time: u64,
}

/// Canonical chat completion response or streamed chunk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    /// Unique response identifier
    pub id: String,
    /// Object type ([`OBJECT_COMPLETION`] or [`OBJECT_CHUNK`])
    pub object: String,
    /// Unix timestamp of creation
    pub created: i64,
    /// Model used for generation
    pub model: String,
    /// Generated choices
    pub choices: Vec<Choice>,
    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Backend configuration fingerprint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_fingerprint: Option<String>,
    /// Latency measurements
    #[serde(flatten)]
    pub timing: Timing,
}

impl ChatCompletionResponse {
    /// Text of the first choice, from either its message or its delta
    pub fn text(&self) -> Option<String> {
        let choice = self.choices.first()?;
        match (&choice.message, &choice.delta) {
            (Some(message), _) => Some(message.content.as_text()),
            (None, Some(delta)) => delta.content.clone(),
            (None, None) => None,
        }
    }
}
